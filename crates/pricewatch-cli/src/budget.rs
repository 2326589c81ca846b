//! `pricewatch budget`: today's spend per category against the limits.

use pricewatch_core::AppConfig;
use pricewatch_extractor::budget::BudgetSnapshot;
use pricewatch_extractor::{BudgetGuard, BudgetLimits};
use serde_json::{json, Value};

use crate::wiring;

pub(crate) fn snapshot_json(snapshot: &BudgetSnapshot) -> Value {
    let categories: Vec<Value> = snapshot
        .spent
        .iter()
        .map(|(category, spent, limit)| {
            json!({
                "category": category.as_str(),
                "spent": spent,
                "limit": limit,
                "remaining": (*limit - *spent).max(rust_decimal::Decimal::ZERO),
            })
        })
        .collect();

    json!({
        "day": snapshot.day,
        "categories": categories,
        "total_spent": snapshot.total_spent,
        "total_limit": snapshot.total_limit,
    })
}

pub(crate) async fn run_budget(config: &AppConfig) -> anyhow::Result<()> {
    let store = wiring::open_store(config, false).await?;
    if store.pool.is_none() {
        anyhow::bail!("budget needs DATABASE_URL; in-memory spend is always zero");
    }

    let guard = BudgetGuard::new(BudgetLimits::from_app_config(config), store.store);
    let snapshot = guard.snapshot().await;
    println!("{}", serde_json::to_string_pretty(&snapshot_json(&snapshot))?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pricewatch_core::CostCategory;
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn remaining_never_goes_negative() {
        let snapshot = BudgetSnapshot {
            day: NaiveDate::from_ymd_opt(2026, 5, 1).expect("valid date"),
            spent: vec![
                (CostCategory::AiPartial, Decimal::new(120, 2), Decimal::ONE),
                (CostCategory::AiFull, Decimal::new(50, 2), Decimal::new(3, 0)),
            ],
            total_spent: Decimal::new(170, 2),
            total_limit: Decimal::new(5, 0),
        };

        let value = snapshot_json(&snapshot);
        let categories = value["categories"].as_array().expect("array");
        assert_eq!(categories[0]["category"], "ai_partial");
        assert_eq!(categories[0]["remaining"], "0");
        assert_eq!(categories[1]["remaining"], "2.50");
        assert_eq!(value["day"], "2026-05-01");
    }
}
