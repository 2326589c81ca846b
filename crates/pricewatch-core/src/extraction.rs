//! Data model shared by the extraction pipeline, its persistence layer, and
//! its callers.
//!
//! Amounts are [`Decimal`] end to end; nothing in the pipeline converts a
//! price to `f64`. Confidence scores are plain `f64` in `[0, 1]`.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Currency assumed when neither the page nor the request names one.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Substrings that mark a locator as pointing into bundle/kit pricing.
/// Locators containing any of these are never cached.
pub const LOCATOR_DENYLIST: &[&str] = &["bundle", "kit", "package", "combo", "addon", "add-on"];

/// Returns `true` if `locator` contains a bundle/kit/package marker.
#[must_use]
pub fn is_denylisted_locator(locator: &str) -> bool {
    let lower = locator.to_lowercase();
    LOCATOR_DENYLIST.iter().any(|marker| lower.contains(marker))
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One price check for one catalog item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRequest {
    /// Caller-side identifier for the catalog item.
    pub item_id: String,
    pub url: String,
    /// Display name; encodes the variant signature (e.g. `"Model X 60W"`).
    pub item_name: String,
    #[serde(default)]
    pub previous_price: Option<Decimal>,
    #[serde(default)]
    pub previous_currency: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub debug: bool,
}

impl ExtractionRequest {
    #[must_use]
    pub fn new(item_id: impl Into<String>, url: impl Into<String>, item_name: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            url: url.into(),
            item_name: item_name.into(),
            previous_price: None,
            previous_currency: None,
            category: None,
            debug: false,
        }
    }

    #[must_use]
    pub fn with_previous_price(mut self, price: Decimal, currency: Option<&str>) -> Self {
        self.previous_price = Some(price);
        self.previous_currency = currency.map(str::to_owned);
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// A previous price of zero or below carries no magnitude information.
    #[must_use]
    pub fn usable_previous_price(&self) -> Option<Decimal> {
        self.previous_price.filter(|p| *p > Decimal::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Tiers
// ---------------------------------------------------------------------------

/// Extraction methods in escalation order, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    LearnedSelector,
    StructuredData,
    CssSelectors,
    Regex,
    DynamicRender,
    AiPartial,
    AiFull,
}

impl Tier {
    /// Escalation order used by the orchestrator.
    pub const ESCALATION: [Tier; 7] = [
        Tier::LearnedSelector,
        Tier::StructuredData,
        Tier::CssSelectors,
        Tier::Regex,
        Tier::DynamicRender,
        Tier::AiPartial,
        Tier::AiFull,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::LearnedSelector => "learned_selector",
            Tier::StructuredData => "static_structured_data",
            Tier::CssSelectors => "static_css_selectors",
            Tier::Regex => "static_regex",
            Tier::DynamicRender => "dynamic_render",
            Tier::AiPartial => "ai_partial_content",
            Tier::AiFull => "ai_full_content",
        }
    }

    /// Tiers that cost money and must pass the budget guard first.
    #[must_use]
    pub fn is_costed(self) -> bool {
        matches!(self, Tier::AiPartial | Tier::AiFull)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::ESCALATION
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown tier '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// What kind of page region a candidate price was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    Main,
    Bundle,
    Related,
    Accessory,
    Unknown,
}

impl ContainerKind {
    /// Containers whose prices never describe the base item.
    #[must_use]
    pub fn is_excluded(self) -> bool {
        matches!(
            self,
            ContainerKind::Bundle | ContainerKind::Related | ContainerKind::Accessory
        )
    }
}

/// Price-role marker found on the element or its close ancestors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceMarker {
    /// "sale", "now", "current", "final" price.
    Sale,
    /// "regular", "was", "compare-at", struck-through price.
    Regular,
    /// "you save" amounts; never a price.
    Savings,
    Unmarked,
}

/// A price-like fragment produced by one tier attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceCandidate {
    pub amount: Decimal,
    pub currency: Option<String>,
    pub tier: Tier,
    /// Serialized locator (see the extractor's `Locator` type).
    pub locator: String,
    /// Surrounding text, trimmed, for audit and marker heuristics.
    pub snippet: String,
    pub container: ContainerKind,
    pub marker: PriceMarker,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Verified,
    AutoCorrected,
    NeedsReview,
    Failed,
}

impl ExtractionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionStatus::Verified => "verified",
            ExtractionStatus::AutoCorrected => "auto_corrected",
            ExtractionStatus::NeedsReview => "needs_review",
            ExtractionStatus::Failed => "failed",
        }
    }
}

/// Why a request ended without a usable price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NoPriceFound,
    PoolExhaustedTimeout,
    Cancelled,
    InvalidRequest,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NoPriceFound => "NO_PRICE_FOUND",
            ErrorKind::PoolExhaustedTimeout => "POOL_EXHAUSTED_TIMEOUT",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::InvalidRequest => "INVALID_REQUEST",
        }
    }
}

/// Classified outcome of one tier attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierOutcome {
    Success,
    NoCandidate,
    Transport,
    Timeout,
    Rejected,
    BudgetDenied,
    Skipped,
    PoolExhausted,
    Cancelled,
}

/// One entry of the attempted-tiers audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierAttempt {
    pub tier: Tier,
    pub outcome: TierOutcome,
    pub elapsed_ms: u64,
    /// Free-form detail (error text, snippet, model rationale).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// How variant resolution went for the dynamic tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantResolution {
    NotNeeded,
    Resolved,
    Unresolved,
}

/// Final answer for one [`ExtractionRequest`]. Also the audit record shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub item_id: String,
    pub url: String,
    pub price: Option<Decimal>,
    /// The value as read from the page before correction or rejection.
    pub raw_price: Option<Decimal>,
    pub currency: Option<String>,
    pub tier: Option<Tier>,
    /// `"<tier>:<locator>"`, e.g. `"static_css_selectors:css:.price"`.
    pub method: Option<String>,
    pub locator: Option<String>,
    pub confidence: f64,
    pub status: ExtractionStatus,
    pub review_reason: Option<String>,
    pub attempts: Vec<TierAttempt>,
    pub error: Option<ErrorKind>,
    pub variant_resolution: Option<VariantResolution>,
    /// Money spent on costed tiers for this request.
    pub cost: Decimal,
    pub checked_at: DateTime<Utc>,
}

impl ExtractionResult {
    /// A result with no price and the given error kind.
    #[must_use]
    pub fn failed(request: &ExtractionRequest, error: ErrorKind, attempts: Vec<TierAttempt>) -> Self {
        Self {
            item_id: request.item_id.clone(),
            url: request.url.clone(),
            price: None,
            raw_price: None,
            currency: None,
            tier: None,
            method: None,
            locator: None,
            confidence: 0.0,
            status: ExtractionStatus::Failed,
            review_reason: None,
            attempts,
            error: Some(error),
            variant_resolution: None,
            cost: Decimal::ZERO,
            checked_at: Utc::now(),
        }
    }

    /// `true` when the result carries a price the caller can use.
    #[must_use]
    pub fn has_price(&self) -> bool {
        self.price.is_some()
    }

    /// Total time spent across all tier attempts.
    #[must_use]
    pub fn total_elapsed_ms(&self) -> u64 {
        self.attempts.iter().map(|a| a.elapsed_ms).sum()
    }
}

// ---------------------------------------------------------------------------
// Learned selectors
// ---------------------------------------------------------------------------

/// A page location that produced a validated price on an earlier visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedSelector {
    pub domain: String,
    /// `None` for the domain-level entry.
    pub item_key: Option<String>,
    pub locator: String,
    pub source_tier: Tier,
    pub confidence: f64,
    pub last_success_at: DateTime<Utc>,
    pub last_price: Decimal,
}

// ---------------------------------------------------------------------------
// Budget
// ---------------------------------------------------------------------------

/// Spend categories tracked by the budget guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostCategory {
    RenderPremium,
    AiPartial,
    AiFull,
}

impl CostCategory {
    pub const ALL: [CostCategory; 3] = [
        CostCategory::RenderPremium,
        CostCategory::AiPartial,
        CostCategory::AiFull,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CostCategory::RenderPremium => "render_premium",
            CostCategory::AiPartial => "ai_partial",
            CostCategory::AiFull => "ai_full",
        }
    }
}

impl std::fmt::Display for CostCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CostCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CostCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown cost category '{s}'"))
    }
}

/// One append-only line of the cost ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    pub category: CostCategory,
    pub amount: Decimal,
    pub day: NaiveDate,
    pub item_id: Option<String>,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    BudgetExceeded,
    VariantPriceCollapse,
}

impl AlertKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::BudgetExceeded => "budget_exceeded",
            AlertKind::VariantPriceCollapse => "variant_price_collapse",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    High,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    /// What the alert is about: a cost category or a base item name.
    pub subject: String,
    pub message: String,
    pub details: serde_json::Value,
    pub batch_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denylist_matches_case_insensitively() {
        assert!(is_denylisted_locator("css:.Bundle-Price"));
        assert!(is_denylisted_locator("css:#starter-KIT .price"));
        assert!(is_denylisted_locator("css:.package-option .amount"));
        assert!(is_denylisted_locator("css:.combo .price"));
        assert!(!is_denylisted_locator("css:.product-price"));
    }

    #[test]
    fn usable_previous_price_ignores_zero() {
        let req = ExtractionRequest::new("1", "https://a.test/p", "Laser 60W")
            .with_previous_price(Decimal::ZERO, Some("USD"));
        assert!(req.usable_previous_price().is_none());
    }

    #[test]
    fn escalation_order_puts_costed_tiers_last() {
        let first_costed = Tier::ESCALATION
            .iter()
            .position(|t| t.is_costed())
            .unwrap();
        assert!(Tier::ESCALATION[first_costed..].iter().all(|t| t.is_costed()));
        assert_eq!(Tier::ESCALATION[0], Tier::LearnedSelector);
    }

    #[test]
    fn cost_category_round_trips_through_str() {
        for c in CostCategory::ALL {
            assert_eq!(c.as_str().parse::<CostCategory>().unwrap(), c);
        }
        assert!("gpu".parse::<CostCategory>().is_err());
    }

    #[test]
    fn failed_result_has_no_price() {
        let req = ExtractionRequest::new("1", "https://a.test/p", "Laser 60W");
        let result = ExtractionResult::failed(&req, ErrorKind::NoPriceFound, Vec::new());
        assert!(!result.has_price());
        assert_eq!(result.status, ExtractionStatus::Failed);
        assert_eq!(result.error, Some(ErrorKind::NoPriceFound));
        assert_eq!(result.error.unwrap().as_str(), "NO_PRICE_FOUND");
    }
}
