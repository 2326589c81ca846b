//! Cross-checks a batch for variants of one base item collapsing to the same
//! price, which usually means variant resolution read the default price for
//! every variant.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use pricewatch_core::{Alert, AlertKind, Severity};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use crate::variant::VariantSignature;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantObservation {
    pub base_name: String,
    pub variant_key: String,
    pub price: Decimal,
    pub batch_id: Uuid,
}

impl VariantObservation {
    /// Derives base name and variant key from an item display name.
    #[must_use]
    pub fn from_item(item_name: &str, price: Decimal, batch_id: Uuid) -> Self {
        let signature = VariantSignature::parse(item_name);
        Self {
            base_name: signature.base_name.clone(),
            variant_key: signature.variant_key(),
            price,
            batch_id,
        }
    }
}

#[derive(Debug)]
pub struct VariantPriceVerifier {
    batch_id: Uuid,
    /// Lowercased base name → (display base name, variant key → price).
    observations: HashMap<String, (String, BTreeMap<String, Decimal>)>,
    alerted: HashSet<String>,
}

impl VariantPriceVerifier {
    #[must_use]
    pub fn new(batch_id: Uuid) -> Self {
        Self {
            batch_id,
            observations: HashMap::new(),
            alerted: HashSet::new(),
        }
    }

    #[must_use]
    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    /// Records one observation. Returns a high-severity alert the first time
    /// a base item has two or more variant keys that all share one price.
    pub fn observe(&mut self, observation: VariantObservation) -> Option<Alert> {
        if observation.batch_id != self.batch_id {
            tracing::debug!(
                batch_id = %observation.batch_id,
                expected = %self.batch_id,
                "ignoring observation from another batch"
            );
            return None;
        }
        let key = observation.base_name.to_lowercase();
        let (display, variants) = self
            .observations
            .entry(key.clone())
            .or_insert_with(|| (observation.base_name.clone(), BTreeMap::new()));
        variants.insert(observation.variant_key, observation.price);

        if variants.len() < 2 || self.alerted.contains(&key) {
            return None;
        }
        let distinct: HashSet<Decimal> = variants.values().map(|p| p.normalize()).collect();
        if distinct.len() != 1 {
            return None;
        }

        let price = observation.price;
        let names: Vec<String> = variants.keys().cloned().collect();
        let alert = Alert {
            kind: AlertKind::VariantPriceCollapse,
            severity: Severity::High,
            subject: display.clone(),
            message: format!(
                "{} variants of '{}' share the price {}: {}",
                names.len(),
                display,
                price,
                names.join(", ")
            ),
            details: json!({
                "base_name": display,
                "variants": names,
                "price": price.to_string(),
            }),
            batch_id: Some(self.batch_id),
            created_at: Utc::now(),
        };
        self.alerted.insert(key);
        tracing::error!(base_name = %alert.subject, batch_id = %self.batch_id, "variant prices collapsed");
        Some(alert)
    }
}
