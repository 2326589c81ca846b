//! Builds the extractor and its collaborators from the loaded config.

use std::sync::Arc;

use anyhow::Context;
use pricewatch_core::{AppConfig, SiteRuleSet};
use pricewatch_extractor::llm::ModelPricing;
use pricewatch_extractor::{
    BudgetLimits, ChatCompletionsConfig, ChatCompletionsModel, Extractor, ExtractorConfig,
    ExtractorServices, FetchConfig, HttpRenderService, LanguageModel, MemoryStore, PriceStore,
    RenderServiceEndpoint,
};
use sqlx::PgPool;

use crate::pg_store::PgStore;

/// The store plus, when it is Postgres, the pool behind it.
pub(crate) struct StoreChoice {
    pub store: Arc<dyn PriceStore>,
    pub pool: Option<PgPool>,
}

/// Postgres when `DATABASE_URL` is set and `no_db` is off; in-memory
/// otherwise.
pub(crate) async fn open_store(config: &AppConfig, no_db: bool) -> anyhow::Result<StoreChoice> {
    if no_db || config.database_url.is_none() {
        if !no_db {
            tracing::warn!("DATABASE_URL not set; learned selectors and spend will not persist");
        }
        return Ok(StoreChoice {
            store: Arc::new(MemoryStore::new()),
            pool: None,
        });
    }

    let pool = pricewatch_db::connect_pool_from_config(config)
        .await
        .context("failed to connect to Postgres")?;
    Ok(StoreChoice {
        store: Arc::new(PgStore::new(pool.clone())),
        pool: Some(pool),
    })
}

/// Loads the site rules file, or runs with no site rules when it is missing.
pub(crate) fn load_rules(config: &AppConfig) -> anyhow::Result<SiteRuleSet> {
    let path = &config.site_rules_path;
    if !path.exists() {
        tracing::warn!(path = %path.display(), "site rules file not found; using generic rules only");
        return Ok(SiteRuleSet::default());
    }
    let rules = pricewatch_core::load_site_rules(path)?;
    tracing::info!(path = %path.display(), sites = rules.len(), "site rules loaded");
    Ok(rules)
}

fn model(config: &AppConfig, api_key: &str, model: &str) -> anyhow::Result<Arc<dyn LanguageModel>> {
    let client = ChatCompletionsModel::new(ChatCompletionsConfig {
        base_url: config.llm_base_url.clone(),
        api_key: api_key.to_string(),
        model: model.to_string(),
        pricing: ModelPricing::for_model(model),
        timeout_secs: config.request_timeout_secs,
        max_retries: config.max_retries,
        backoff_base_ms: config.retry_backoff_base_ms,
    })
    .map_err(|e| anyhow::anyhow!("failed to build model client for {model}: {e}"))?;
    Ok(Arc::new(client))
}

/// Wires every service the orchestrator needs around `store`.
pub(crate) async fn build_extractor(
    config: &AppConfig,
    store: Arc<dyn PriceStore>,
) -> anyhow::Result<Extractor> {
    let rules = Arc::new(load_rules(config)?);

    let endpoint = match (&config.render_service_url, &config.render_service_key) {
        (Some(base_url), Some(api_key)) => Some(RenderServiceEndpoint {
            base_url: base_url.clone(),
            api_key: api_key.clone(),
        }),
        _ => None,
    };
    let fetcher = HttpRenderService::new(&FetchConfig::from_app_config(config), endpoint)
        .map_err(|e| anyhow::anyhow!("failed to build page fetcher: {e}"))?;

    let mut services = ExtractorServices::new(
        rules,
        store,
        Arc::new(fetcher),
        BudgetLimits::from_app_config(config),
    );

    if let Some(api_key) = config.openai_api_key.as_deref() {
        services = services.with_models(
            Some(model(config, api_key, &config.llm_partial_model)?),
            Some(model(config, api_key, &config.llm_full_model)?),
        );
    } else {
        tracing::info!("OPENAI_API_KEY not set; model tiers disabled");
    }

    services = with_render_pool(services, config).await?;

    Ok(Extractor::new(services, ExtractorConfig::from_app_config(config)))
}

#[cfg(feature = "chromium")]
async fn with_render_pool(
    services: ExtractorServices,
    config: &AppConfig,
) -> anyhow::Result<ExtractorServices> {
    use std::time::Duration;

    use pricewatch_extractor::{RenderPool, RenderPoolConfig};

    let pool = RenderPool::new(
        Arc::new(crate::chromium::ChromiumLauncher::from_env()),
        RenderPoolConfig {
            size: config.render_pool_size,
            lease_timeout: Duration::from_secs(config.render_lease_timeout_secs),
        },
    )
    .await
    .map_err(|e| anyhow::anyhow!("failed to start render pool: {e}"))?;
    Ok(services.with_render_pool(Arc::new(pool)))
}

#[cfg(not(feature = "chromium"))]
#[allow(clippy::unused_async)]
async fn with_render_pool(
    services: ExtractorServices,
    _config: &AppConfig,
) -> anyhow::Result<ExtractorServices> {
    tracing::info!("built without the chromium feature; dynamic render tier disabled");
    Ok(services)
}
