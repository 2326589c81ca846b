pub mod app_config;
pub mod config;
pub mod extraction;
pub mod site_rules;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use extraction::{
    is_denylisted_locator, Alert, AlertKind, ContainerKind, CostCategory, CostEntry, ErrorKind,
    ExtractionRequest, ExtractionResult, ExtractionStatus, LearnedSelector, PriceCandidate,
    PriceMarker, Severity, Tier, TierAttempt, TierOutcome, VariantResolution, DEFAULT_CURRENCY,
    LOCATOR_DENYLIST,
};
pub use site_rules::{
    load_site_rules, normalize_domain, ControlKind, EffectiveRules, ItemOverride, PriceRange,
    ResolutionHint, SiteRule, SiteRuleSet, SiteRulesFile, DEFAULT_CONTROL_PRIORITY,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read site rules file {path}: {source}")]
    SiteRulesIo {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse site rules file: {0}")]
    SiteRulesParse(#[from] serde_yaml::Error),

    #[error("site rules validation failed: {0}")]
    Validation(String),
}
