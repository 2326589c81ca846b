//! Daily spend caps for costed operations.
//!
//! Spend is keyed by UTC day, so "resetting" is just the date rolling over.
//! The first use on a day hydrates that day's totals from the store; after
//! that the in-process counters are authoritative and only ever grow.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{NaiveDate, Utc};
use pricewatch_core::{Alert, AlertKind, AppConfig, CostCategory, CostEntry, Severity};
use rust_decimal::Decimal;
use serde_json::json;

use crate::store::PriceStore;

const GLOBAL_SUBJECT: &str = "daily_total";

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetLimits {
    pub daily_total: Decimal,
    pub per_category: HashMap<CostCategory, Decimal>,
}

impl BudgetLimits {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            daily_total: config.budget_daily_usd,
            per_category: HashMap::from([
                (CostCategory::RenderPremium, config.budget_render_premium_usd),
                (CostCategory::AiPartial, config.budget_ai_partial_usd),
                (CostCategory::AiFull, config.budget_ai_full_usd),
            ]),
        }
    }

    fn category(&self, category: CostCategory) -> Decimal {
        self.per_category
            .get(&category)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}

/// Answer to [`BudgetGuard::check`].
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetDecision {
    pub admitted: bool,
    /// Smaller of the category and global headroom; never negative.
    pub remaining: Decimal,
    pub spent: Decimal,
    pub limit: Decimal,
}

#[derive(Debug, Default)]
struct DayLedger {
    day: Option<NaiveDate>,
    spent: HashMap<CostCategory, Decimal>,
    alerted: HashSet<String>,
}

impl DayLedger {
    fn total(&self) -> Decimal {
        self.spent.values().copied().sum()
    }

    fn category(&self, category: CostCategory) -> Decimal {
        self.spent.get(&category).copied().unwrap_or(Decimal::ZERO)
    }
}

/// One day's spend snapshot, for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetSnapshot {
    pub day: NaiveDate,
    pub spent: Vec<(CostCategory, Decimal, Decimal)>,
    pub total_spent: Decimal,
    pub total_limit: Decimal,
}

pub struct BudgetGuard {
    limits: BudgetLimits,
    store: Arc<dyn PriceStore>,
    ledger: Mutex<DayLedger>,
}

impl BudgetGuard {
    #[must_use]
    pub fn new(limits: BudgetLimits, store: Arc<dyn PriceStore>) -> Self {
        Self {
            limits,
            store,
            ledger: Mutex::new(DayLedger::default()),
        }
    }

    #[must_use]
    pub fn limits(&self) -> &BudgetLimits {
        &self.limits
    }

    /// Admits a costed call in `category` today.
    pub async fn check(&self, category: CostCategory) -> BudgetDecision {
        self.check_on(Utc::now().date_naive(), category).await
    }

    /// Admits a costed call when both the category and the global spend for
    /// `day` are below their limits.
    pub async fn check_on(&self, day: NaiveDate, category: CostCategory) -> BudgetDecision {
        self.hydrate(day).await;
        let ledger = self.lock();
        let spent = ledger.category(category);
        let limit = self.limits.category(category);
        let total = ledger.total();

        let remaining = (limit - spent)
            .min(self.limits.daily_total - total)
            .max(Decimal::ZERO);
        let admitted = spent < limit && total < self.limits.daily_total;
        if !admitted {
            tracing::warn!(
                category = %category,
                %spent,
                %limit,
                total_spent = %total,
                "budget denied costed operation"
            );
        }
        BudgetDecision {
            admitted,
            remaining,
            spent,
            limit,
        }
    }

    /// Records `cost` against `category` today.
    pub async fn track(&self, category: CostCategory, cost: Decimal, item_id: Option<&str>, note: Option<&str>) {
        self.track_on(Utc::now().date_naive(), category, cost, item_id, note)
            .await;
    }

    /// Adds `cost` to the day's ledger and appends it to the store. Reaching
    /// a cap raises one alert per category (and one for the global cap) per
    /// day. Never fails; persistence problems are logged.
    pub async fn track_on(
        &self,
        day: NaiveDate,
        category: CostCategory,
        cost: Decimal,
        item_id: Option<&str>,
        note: Option<&str>,
    ) {
        if cost <= Decimal::ZERO {
            return;
        }
        self.hydrate(day).await;

        let alerts = {
            let mut ledger = self.lock();
            if ledger.day != Some(day) {
                // Tracking for a day other than the hydrated one; keep the
                // ledger on its current day and only persist.
                Vec::new()
            } else {
                *ledger.spent.entry(category).or_insert(Decimal::ZERO) += cost;
                self.crossed_caps(&mut ledger, category)
            }
        };

        let entry = CostEntry {
            category,
            amount: cost,
            day,
            item_id: item_id.map(str::to_string),
            note: note.map(str::to_string),
            recorded_at: Utc::now(),
        };
        if let Err(e) = self.store.record_cost(&entry).await {
            tracing::warn!(category = %category, %cost, error = %e, "failed to persist cost entry");
        }

        for alert in alerts {
            tracing::error!(subject = %alert.subject, message = %alert.message, "budget cap reached");
            if let Err(e) = self.store.record_alert(&alert).await {
                tracing::warn!(error = %e, "failed to persist budget alert");
            }
        }
    }

    fn crossed_caps(&self, ledger: &mut DayLedger, category: CostCategory) -> Vec<Alert> {
        let mut alerts = Vec::new();
        let spent = ledger.category(category);
        let limit = self.limits.category(category);
        if spent >= limit && ledger.alerted.insert(category.as_str().to_string()) {
            alerts.push(budget_alert(category.as_str(), spent, limit, ledger.day));
        }
        let total = ledger.total();
        if total >= self.limits.daily_total && ledger.alerted.insert(GLOBAL_SUBJECT.to_string()) {
            alerts.push(budget_alert(GLOBAL_SUBJECT, total, self.limits.daily_total, ledger.day));
        }
        alerts
    }

    /// Today's spend per category against the limits.
    pub async fn snapshot(&self) -> BudgetSnapshot {
        let day = Utc::now().date_naive();
        self.hydrate(day).await;
        let ledger = self.lock();
        BudgetSnapshot {
            day,
            spent: CostCategory::ALL
                .into_iter()
                .map(|c| (c, ledger.category(c), self.limits.category(c)))
                .collect(),
            total_spent: ledger.total(),
            total_limit: self.limits.daily_total,
        }
    }

    /// Loads `day`'s totals from the store the first time the day is seen.
    async fn hydrate(&self, day: NaiveDate) {
        if self.lock().day.is_some_and(|d| d >= day) {
            return;
        }

        let mut loaded = HashMap::new();
        for category in CostCategory::ALL {
            match self.store.get_budget_spend(category, day).await {
                Ok(spent) => {
                    loaded.insert(category, spent);
                }
                Err(e) => {
                    tracing::warn!(category = %category, %day, error = %e, "budget hydration failed; starting from zero");
                }
            }
        }

        let mut ledger = self.lock();
        if ledger.day.is_some_and(|d| d >= day) {
            return;
        }
        ledger.day = Some(day);
        ledger.spent = loaded;
        ledger.alerted.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DayLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn budget_alert(subject: &str, spent: Decimal, limit: Decimal, day: Option<NaiveDate>) -> Alert {
    Alert {
        kind: AlertKind::BudgetExceeded,
        severity: Severity::Warning,
        subject: subject.to_string(),
        message: format!("{subject} spend {spent} reached its daily limit of {limit}"),
        details: json!({
            "spent": spent.to_string(),
            "limit": limit.to_string(),
            "day": day.map(|d| d.to_string()),
        }),
        batch_id: None,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn limits() -> BudgetLimits {
        BudgetLimits {
            daily_total: Decimal::new(500, 2),
            per_category: HashMap::from([
                (CostCategory::RenderPremium, Decimal::new(100, 2)),
                (CostCategory::AiPartial, Decimal::new(100, 2)),
                (CostCategory::AiFull, Decimal::new(300, 2)),
            ]),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
    }

    #[tokio::test]
    async fn denies_once_limit_reached_and_stays_denied() {
        let store = Arc::new(MemoryStore::new());
        let guard = BudgetGuard::new(limits(), store.clone());
        let today = day(10);

        assert!(guard.check_on(today, CostCategory::AiPartial).await.admitted);
        guard
            .track_on(today, CostCategory::AiPartial, Decimal::new(60, 2), Some("sku-1"), None)
            .await;
        let decision = guard.check_on(today, CostCategory::AiPartial).await;
        assert!(decision.admitted);
        assert_eq!(decision.remaining, Decimal::new(40, 2));

        guard
            .track_on(today, CostCategory::AiPartial, Decimal::new(40, 2), Some("sku-2"), None)
            .await;
        for _ in 0..3 {
            let decision = guard.check_on(today, CostCategory::AiPartial).await;
            assert!(!decision.admitted);
            assert_eq!(decision.remaining, Decimal::ZERO);
        }
        // Other categories keep their own headroom.
        assert!(guard.check_on(today, CostCategory::AiFull).await.admitted);
        assert_eq!(store.costs().len(), 2);
    }

    #[tokio::test]
    async fn cap_alert_is_raised_once_per_category_per_day() {
        let store = Arc::new(MemoryStore::new());
        let guard = BudgetGuard::new(limits(), store.clone());
        for _ in 0..3 {
            guard
                .track_on(day(10), CostCategory::RenderPremium, Decimal::new(60, 2), None, None)
                .await;
        }
        let alerts = store.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::BudgetExceeded);
        assert_eq!(alerts[0].subject, "render_premium");
    }

    #[tokio::test]
    async fn global_cap_denies_every_category() {
        let store = Arc::new(MemoryStore::new());
        let guard = BudgetGuard::new(limits(), store.clone());
        let today = day(11);
        guard.track_on(today, CostCategory::AiFull, Decimal::new(290, 2), None, None).await;
        guard.track_on(today, CostCategory::AiPartial, Decimal::new(90, 2), None, None).await;
        guard.track_on(today, CostCategory::RenderPremium, Decimal::new(90, 2), None, None).await;
        assert!(guard.check_on(today, CostCategory::AiFull).await.admitted, "4.70 < 5.00");
        guard.track_on(today, CostCategory::AiFull, Decimal::new(30, 2), None, None).await;
        assert!(!guard.check_on(today, CostCategory::AiPartial).await.admitted);
        assert!(store.alerts().iter().any(|a| a.subject == GLOBAL_SUBJECT));
    }

    #[tokio::test]
    async fn new_day_starts_fresh_and_hydrates_from_store() {
        let store = Arc::new(MemoryStore::new());
        let earlier = BudgetGuard::new(limits(), store.clone());
        earlier
            .track_on(day(12), CostCategory::AiPartial, Decimal::new(100, 2), None, None)
            .await;

        // A second process on the same day sees the stored spend.
        let restarted = BudgetGuard::new(limits(), store.clone());
        assert!(!restarted.check_on(day(12), CostCategory::AiPartial).await.admitted);
        // The next UTC day is a clean slate.
        assert!(restarted.check_on(day(13), CostCategory::AiPartial).await.admitted);
    }
}
