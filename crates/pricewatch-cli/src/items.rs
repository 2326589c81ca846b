//! The YAML items file consumed by `pricewatch batch`.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use pricewatch_core::ExtractionRequest;
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ItemsFile {
    items: Vec<ItemEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ItemEntry {
    id: String,
    url: String,
    name: String,
    #[serde(default)]
    previous_price: Option<Decimal>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    debug: bool,
}

impl ItemEntry {
    fn into_request(self) -> ExtractionRequest {
        let mut request = ExtractionRequest::new(self.id, self.url, self.name).with_debug(self.debug);
        if let Some(price) = self.previous_price {
            request = request.with_previous_price(price, self.currency.as_deref());
        }
        if let Some(category) = self.category {
            request = request.with_category(category);
        }
        request
    }
}

/// Parses an items document. Ids must be unique; everything else about an
/// entry is validated per request by the extractor.
pub(crate) fn parse_items(yaml: &str) -> anyhow::Result<Vec<ExtractionRequest>> {
    let file: ItemsFile = serde_yaml::from_str(yaml).context("invalid items file")?;

    let mut seen = HashSet::new();
    for entry in &file.items {
        if !seen.insert(entry.id.as_str()) {
            anyhow::bail!("duplicate item id '{}' in items file", entry.id);
        }
    }

    Ok(file.items.into_iter().map(ItemEntry::into_request).collect())
}

pub(crate) fn load_items(path: &Path) -> anyhow::Result<Vec<ExtractionRequest>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read items file {}", path.display()))?;
    parse_items(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITEMS: &str = r#"
items:
  - id: grinder-60w
    url: https://brewgear.example/p/grinder
    name: Model X 60W
    previous_price: "184.00"
    currency: USD
    category: grinders
  - id: kettle
    url: https://brewgear.example/p/kettle
    name: Gooseneck Kettle
"#;

    #[test]
    fn parses_items_into_requests() {
        let requests = parse_items(ITEMS).expect("valid items");

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].item_id, "grinder-60w");
        assert_eq!(requests[0].previous_price, Some(Decimal::new(18_400, 2)));
        assert_eq!(requests[0].previous_currency.as_deref(), Some("USD"));
        assert_eq!(requests[0].category.as_deref(), Some("grinders"));
        assert!(requests[1].previous_price.is_none());
        assert!(!requests[1].debug);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let yaml = "items:\n  - {id: a, url: 'https://x.example', name: A}\n  - {id: a, url: 'https://y.example', name: B}\n";
        let err = parse_items(yaml).expect_err("duplicate id");
        assert!(err.to_string().contains("duplicate item id 'a'"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let yaml = "items:\n  - {id: a, url: 'https://x.example', name: A, colour: red}\n";
        assert!(parse_items(yaml).is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_items(Path::new("/nonexistent/items.yaml")).expect_err("missing file");
        assert!(err.to_string().contains("/nonexistent/items.yaml"));
    }
}
