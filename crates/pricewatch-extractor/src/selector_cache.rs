//! Learned page locations per domain and item, write-through to the store.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use pricewatch_core::{is_denylisted_locator, LearnedSelector, Tier};
use rust_decimal::Decimal;

use crate::locator::Locator;
use crate::store::PriceStore;

type CacheKey = (String, Option<String>);

pub struct SelectorCache {
    store: Arc<dyn PriceStore>,
    entries: RwLock<HashMap<CacheKey, LearnedSelector>>,
}

impl SelectorCache {
    #[must_use]
    pub fn new(store: Arc<dyn PriceStore>) -> Self {
        Self {
            store,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Item-level entry first, then the domain-level one.
    ///
    /// A store read failure is logged and treated as a miss.
    pub async fn lookup(&self, domain: &str, item_key: &str) -> Option<LearnedSelector> {
        if let Some(hit) = self.get_entry(domain, Some(item_key)).await {
            return Some(hit);
        }
        self.get_entry(domain, None).await
    }

    async fn get_entry(&self, domain: &str, item_key: Option<&str>) -> Option<LearnedSelector> {
        let key = (domain.to_string(), item_key.map(str::to_string));
        if let Some(hit) = self.read_map(|m| m.get(&key).cloned()) {
            return Some(hit);
        }
        match self.store.get_learned_selector(domain, item_key).await {
            Ok(Some(entry)) => {
                self.write_map(|m| {
                    m.entry(key).or_insert_with(|| entry.clone());
                });
                Some(entry)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(domain, item_key, error = %e, "learned selector lookup failed; treating as miss");
                None
            }
        }
    }

    /// Records a fresh success for the item-level entry and, unless the
    /// locator is tied to one variant, the domain-level entry. Both
    /// overwrite whatever was there.
    ///
    /// Returns `false` without writing anything when the locator is not
    /// replayable or points into bundle/kit pricing.
    pub async fn record_success(
        &self,
        domain: &str,
        item_key: &str,
        locator: &Locator,
        source_tier: Tier,
        confidence: f64,
        price: Decimal,
    ) -> bool {
        let serialized = locator.to_string();
        if !locator.is_cacheable() || is_denylisted_locator(&serialized) {
            tracing::debug!(domain, locator = %serialized, "locator not cacheable; discarded");
            return false;
        }

        let now = Utc::now();
        let mut keys = vec![Some(item_key)];
        if !locator.is_item_specific() {
            keys.push(None);
        }
        for key in keys {
            let entry = LearnedSelector {
                domain: domain.to_string(),
                item_key: key.map(str::to_string),
                locator: serialized.clone(),
                source_tier,
                confidence,
                last_success_at: now,
                last_price: price,
            };
            self.write_map(|m| {
                m.insert((domain.to_string(), key.map(str::to_string)), entry.clone());
            });
            if let Err(e) = self.store.upsert_learned_selector(&entry).await {
                tracing::warn!(domain, item_key = key, error = %e, "failed to persist learned selector");
            }
        }
        true
    }

    /// Number of entries held in process.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_map(HashMap::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_map<R>(&self, f: impl FnOnce(&HashMap<CacheKey, LearnedSelector>) -> R) -> R {
        let guard = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write_map<R>(&self, f: impl FnOnce(&mut HashMap<CacheKey, LearnedSelector>) -> R) -> R {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}
