//! [`PriceStore`] over the Postgres tables in `pricewatch-db`.

use async_trait::async_trait;
use chrono::NaiveDate;
use pricewatch_core::{Alert, CostCategory, CostEntry, ExtractionResult, LearnedSelector, SiteRule};
use pricewatch_db::DbError;
use pricewatch_extractor::error::StoreError;
use pricewatch_extractor::PriceStore;
use rust_decimal::Decimal;
use sqlx::PgPool;

pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_error(err: DbError) -> StoreError {
    match err {
        DbError::Decode { field, reason } => StoreError::Corrupt {
            field: field.to_string(),
            reason,
        },
        other => StoreError::backend(other),
    }
}

#[async_trait]
impl PriceStore for PgStore {
    async fn get_learned_selector(
        &self,
        domain: &str,
        item_key: Option<&str>,
    ) -> Result<Option<LearnedSelector>, StoreError> {
        let row = pricewatch_db::get_learned_selector(&self.pool, domain, item_key)
            .await
            .map_err(store_error)?;
        row.map(|r| r.into_learned().map_err(store_error))
            .transpose()
    }

    async fn upsert_learned_selector(&self, selector: &LearnedSelector) -> Result<(), StoreError> {
        pricewatch_db::upsert_learned_selector(&self.pool, selector)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn get_site_rule(&self, domain: &str) -> Result<Option<SiteRule>, StoreError> {
        pricewatch_db::get_site_rule_override(&self.pool, domain)
            .await
            .map_err(store_error)
    }

    async fn get_budget_spend(
        &self,
        category: CostCategory,
        day: NaiveDate,
    ) -> Result<Decimal, StoreError> {
        pricewatch_db::sum_cost_for_day(&self.pool, category, day)
            .await
            .map_err(store_error)
    }

    async fn record_cost(&self, entry: &CostEntry) -> Result<(), StoreError> {
        pricewatch_db::insert_cost_entry(&self.pool, entry)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn record_audit_result(&self, result: &ExtractionResult) -> Result<(), StoreError> {
        pricewatch_db::insert_audit_result(&self.pool, result)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn record_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        pricewatch_db::insert_alert(&self.pool, alert)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}
