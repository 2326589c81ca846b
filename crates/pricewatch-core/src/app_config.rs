use std::path::PathBuf;

use rust_decimal::Decimal;

use crate::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    /// Optional: without it the pipeline runs against the in-memory store.
    pub database_url: Option<String>,
    pub env: Environment,
    pub log_level: String,
    pub site_rules_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,

    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,

    pub render_service_url: Option<String>,
    pub render_service_key: Option<String>,
    pub render_max_cost_usd: Decimal,
    pub render_pool_size: usize,
    pub render_lease_timeout_secs: u64,
    pub navigation_timeout_secs: u64,
    pub settle_timeout_ms: u64,

    pub tier_timeout_secs: u64,
    pub workers: usize,
    pub batch_deadline_secs: u64,
    pub block_on_variant_alert: bool,

    pub openai_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_partial_model: String,
    pub llm_full_model: String,

    pub budget_daily_usd: Decimal,
    pub budget_ai_partial_usd: Decimal,
    pub budget_ai_full_usd: Decimal,
    pub budget_render_premium_usd: Decimal,
}

impl AppConfig {
    /// Requires `DATABASE_URL`; used by commands that only make sense with a
    /// database (`migrate`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] if no database URL is configured.
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[redacted]");
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("site_rules_path", &self.site_rules_path)
            .field("database_url", &redact(&self.database_url))
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_base_ms", &self.retry_backoff_base_ms)
            .field("render_service_url", &self.render_service_url)
            .field("render_service_key", &redact(&self.render_service_key))
            .field("render_max_cost_usd", &self.render_max_cost_usd)
            .field("render_pool_size", &self.render_pool_size)
            .field("render_lease_timeout_secs", &self.render_lease_timeout_secs)
            .field("navigation_timeout_secs", &self.navigation_timeout_secs)
            .field("settle_timeout_ms", &self.settle_timeout_ms)
            .field("tier_timeout_secs", &self.tier_timeout_secs)
            .field("workers", &self.workers)
            .field("batch_deadline_secs", &self.batch_deadline_secs)
            .field("block_on_variant_alert", &self.block_on_variant_alert)
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("llm_base_url", &self.llm_base_url)
            .field("llm_partial_model", &self.llm_partial_model)
            .field("llm_full_model", &self.llm_full_model)
            .field("budget_daily_usd", &self.budget_daily_usd)
            .field("budget_ai_partial_usd", &self.budget_ai_partial_usd)
            .field("budget_ai_full_usd", &self.budget_ai_full_usd)
            .field("budget_render_premium_usd", &self.budget_render_premium_usd)
            .finish()
    }
}
