//! Persistence collaborator for the pipeline.
//!
//! [`PriceStore`] is the minimal read/write contract the extractor needs.
//! [`MemoryStore`] keeps everything in process; the CLI wires a Postgres
//! implementation over `pricewatch-db`.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDate;
use pricewatch_core::{
    normalize_domain, Alert, CostCategory, CostEntry, ExtractionResult, LearnedSelector, SiteRule,
};
use rust_decimal::Decimal;

use crate::error::StoreError;

#[async_trait]
pub trait PriceStore: Send + Sync {
    /// `item_key = None` reads the domain-level entry.
    async fn get_learned_selector(
        &self,
        domain: &str,
        item_key: Option<&str>,
    ) -> Result<Option<LearnedSelector>, StoreError>;

    /// Overwrites any entry with the same domain and item key.
    async fn upsert_learned_selector(&self, selector: &LearnedSelector) -> Result<(), StoreError>;

    /// A stored per-domain rule that replaces the file rule for that domain.
    async fn get_site_rule(&self, domain: &str) -> Result<Option<SiteRule>, StoreError>;

    /// Total recorded spend for `category` on the UTC `day`.
    async fn get_budget_spend(
        &self,
        category: CostCategory,
        day: NaiveDate,
    ) -> Result<Decimal, StoreError>;

    async fn record_cost(&self, entry: &CostEntry) -> Result<(), StoreError>;

    async fn record_audit_result(&self, result: &ExtractionResult) -> Result<(), StoreError>;

    async fn record_alert(&self, alert: &Alert) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    selectors: HashMap<(String, Option<String>), LearnedSelector>,
    site_rules: HashMap<String, SiteRule>,
    costs: Vec<CostEntry>,
    audits: Vec<ExtractionResult>,
    alerts: Vec<Alert>,
}

/// In-process [`PriceStore`], used by tests and `--no-db` runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Registers a domain rule as if it had been stored by an operator.
    pub fn put_site_rule(&self, rule: SiteRule) {
        let domain = normalize_domain(&rule.domain);
        self.with_state(|s| s.site_rules.insert(domain, rule));
    }

    #[must_use]
    pub fn learned_selectors(&self) -> Vec<LearnedSelector> {
        self.with_state(|s| s.selectors.values().cloned().collect())
    }

    #[must_use]
    pub fn costs(&self) -> Vec<CostEntry> {
        self.with_state(|s| s.costs.clone())
    }

    #[must_use]
    pub fn audits(&self) -> Vec<ExtractionResult> {
        self.with_state(|s| s.audits.clone())
    }

    #[must_use]
    pub fn alerts(&self) -> Vec<Alert> {
        self.with_state(|s| s.alerts.clone())
    }
}

#[async_trait]
impl PriceStore for MemoryStore {
    async fn get_learned_selector(
        &self,
        domain: &str,
        item_key: Option<&str>,
    ) -> Result<Option<LearnedSelector>, StoreError> {
        let key = (domain.to_string(), item_key.map(str::to_string));
        Ok(self.with_state(|s| s.selectors.get(&key).cloned()))
    }

    async fn upsert_learned_selector(&self, selector: &LearnedSelector) -> Result<(), StoreError> {
        let key = (selector.domain.clone(), selector.item_key.clone());
        self.with_state(|s| s.selectors.insert(key, selector.clone()));
        Ok(())
    }

    async fn get_site_rule(&self, domain: &str) -> Result<Option<SiteRule>, StoreError> {
        Ok(self.with_state(|s| s.site_rules.get(domain).cloned()))
    }

    async fn get_budget_spend(
        &self,
        category: CostCategory,
        day: NaiveDate,
    ) -> Result<Decimal, StoreError> {
        Ok(self.with_state(|s| {
            s.costs
                .iter()
                .filter(|c| c.category == category && c.day == day)
                .map(|c| c.amount)
                .sum()
        }))
    }

    async fn record_cost(&self, entry: &CostEntry) -> Result<(), StoreError> {
        self.with_state(|s| s.costs.push(entry.clone()));
        Ok(())
    }

    async fn record_audit_result(&self, result: &ExtractionResult) -> Result<(), StoreError> {
        self.with_state(|s| s.audits.push(result.clone()));
        Ok(())
    }

    async fn record_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        self.with_state(|s| s.alerts.push(alert.clone()));
        Ok(())
    }
}
