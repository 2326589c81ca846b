//! `pricewatch check`: one item through the full tier ladder.

use pricewatch_core::{AppConfig, ExtractionRequest, ExtractionStatus};
use rust_decimal::Decimal;

use crate::wiring;

pub(crate) fn build_request(
    url: &str,
    name: &str,
    item_id: Option<&str>,
    previous_price: Option<Decimal>,
    currency: Option<&str>,
    category: Option<&str>,
    debug: bool,
) -> ExtractionRequest {
    let mut request = ExtractionRequest::new(item_id.unwrap_or(url), url, name).with_debug(debug);
    if let Some(price) = previous_price {
        request = request.with_previous_price(price, currency);
    }
    if let Some(category) = category {
        request = request.with_category(category);
    }
    request
}

/// Prints the result as JSON. A `Failed` result is still printed, then
/// reported as an error so the exit status is non-zero.
pub(crate) async fn run_check(
    config: &AppConfig,
    request: ExtractionRequest,
    no_db: bool,
) -> anyhow::Result<()> {
    let store = wiring::open_store(config, no_db).await?;
    let extractor = wiring::build_extractor(config, store.store).await?;

    let result = extractor.extract(&request).await;
    extractor.shutdown().await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.status == ExtractionStatus::Failed {
        let kind = result.error.map_or("UNKNOWN", |e| e.as_str());
        anyhow::bail!("no price for {}: {kind}", request.item_id);
    }
    Ok(())
}
