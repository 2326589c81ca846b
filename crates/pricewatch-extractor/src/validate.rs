//! Range and change-magnitude checks with digit-error auto-correction.

use pricewatch_core::{ExtractionStatus, PriceRange};
use rust_decimal::Decimal;

/// Thresholds, bands and confidences used by [`PriceValidator`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationConfig {
    /// Changes up to this fraction are `Verified`.
    pub verified_max_change: Decimal,
    /// Changes up to this fraction are accepted but flagged.
    pub review_max_change: Decimal,
    /// Changes above this fraction are critical.
    pub critical_change: Decimal,
    /// A major-change correction must land within this fraction of the old price.
    pub major_band: Decimal,
    /// A critical-change correction must land within this fraction of the old price.
    pub critical_band: Decimal,
    /// Maximum ×10 / ÷10 steps tried.
    pub max_correction_steps: u32,
    pub verified_confidence: f64,
    pub corrected_confidence: f64,
    pub review_confidence: f64,
    pub major_failure_confidence: f64,
    pub critical_failure_confidence: f64,
    pub no_previous_confidence: f64,
    pub range_failure_confidence: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            verified_max_change: Decimal::new(25, 2),
            review_max_change: Decimal::new(50, 2),
            critical_change: Decimal::new(90, 2),
            major_band: Decimal::new(25, 2),
            critical_band: Decimal::new(20, 2),
            max_correction_steps: 3,
            verified_confidence: 0.9,
            corrected_confidence: 0.6,
            review_confidence: 0.7,
            major_failure_confidence: 0.3,
            critical_failure_confidence: 0.2,
            no_previous_confidence: 0.5,
            range_failure_confidence: 0.1,
        }
    }
}

/// A value the pipeline may return.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedPrice {
    pub price: Decimal,
    pub status: ExtractionStatus,
    pub confidence: f64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Accepted(AcceptedPrice),
    /// Escalate; the raw value is kept only as a flagged fallback.
    Rejected { reason: String, confidence: f64 },
}

impl Validation {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Validation::Accepted(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct PriceValidator {
    config: ValidationConfig,
}

impl PriceValidator {
    #[must_use]
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Checks `raw` against the previous price and the hard range.
    ///
    /// The range check applies to the final, possibly corrected, value.
    #[must_use]
    pub fn validate(
        &self,
        raw: Decimal,
        previous: Option<Decimal>,
        range: Option<PriceRange>,
    ) -> Validation {
        let cfg = &self.config;
        if raw <= Decimal::ZERO {
            return Validation::Rejected {
                reason: format!("non-positive amount {raw}"),
                confidence: cfg.range_failure_confidence,
            };
        }

        let accepted = match previous.filter(|p| *p > Decimal::ZERO) {
            None => AcceptedPrice {
                price: raw,
                status: ExtractionStatus::Verified,
                confidence: cfg.no_previous_confidence,
                reason: None,
            },
            Some(old) => match self.check_change(raw, old) {
                Ok(accepted) => accepted,
                Err(rejected) => return rejected,
            },
        };

        if let Some(range) = range {
            if !range.contains(accepted.price) {
                return Validation::Rejected {
                    reason: format!(
                        "{} outside expected range {}-{}",
                        accepted.price, range.min, range.max
                    ),
                    confidence: cfg.range_failure_confidence,
                };
            }
        }
        Validation::Accepted(accepted)
    }

    fn check_change(&self, raw: Decimal, old: Decimal) -> Result<AcceptedPrice, Validation> {
        let cfg = &self.config;
        let change = relative_change(raw, old);
        let pct = percent(change);

        if change <= cfg.verified_max_change {
            return Ok(AcceptedPrice {
                price: raw,
                status: ExtractionStatus::Verified,
                confidence: cfg.verified_confidence,
                reason: None,
            });
        }
        if change <= cfg.review_max_change {
            return Ok(AcceptedPrice {
                price: raw,
                status: ExtractionStatus::NeedsReview,
                confidence: cfg.review_confidence,
                reason: Some(format!("price changed {pct}% from {old}")),
            });
        }

        let critical = change > cfg.critical_change;
        let band = if critical {
            cfg.critical_band
        } else {
            cfg.major_band
        };
        if let Some(corrected) = self.correct(raw, old, band) {
            return Ok(AcceptedPrice {
                price: corrected,
                status: ExtractionStatus::AutoCorrected,
                confidence: cfg.corrected_confidence,
                reason: Some(format!(
                    "digit error corrected {raw} -> {corrected} ({pct}% change from {old})"
                )),
            });
        }

        if critical {
            Err(Validation::Rejected {
                reason: format!("critical change {pct}% from {old}, no correction converged"),
                confidence: cfg.critical_failure_confidence,
            })
        } else {
            Ok(AcceptedPrice {
                price: raw,
                status: ExtractionStatus::NeedsReview,
                confidence: cfg.major_failure_confidence,
                reason: Some(format!("major change {pct}% from {old}, no correction converged")),
            })
        }
    }

    /// Shifts `raw` by powers of ten toward `old` until it lands within `band`.
    fn correct(&self, raw: Decimal, old: Decimal, band: Decimal) -> Option<Decimal> {
        let factor = Decimal::TEN;
        let mut value = raw;
        for _ in 0..self.config.max_correction_steps {
            value = if raw < old {
                value * factor
            } else {
                value / factor
            };
            if relative_change(value, old) <= band {
                return Some(value.normalize());
            }
        }
        None
    }
}

fn relative_change(new: Decimal, old: Decimal) -> Decimal {
    ((new - old) / old).abs()
}

fn percent(change: Decimal) -> Decimal {
    (change * Decimal::ONE_HUNDRED).round_dp(1)
}

#[cfg(test)]
#[path = "validate_test.rs"]
mod tests;
