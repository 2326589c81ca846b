//! Narrows a tier's candidates to the one most likely to be the item's price.

use pricewatch_core::{PriceCandidate, PriceMarker, PriceRange};
use rust_decimal::Decimal;

/// Picks one candidate, or `None` when nothing survives.
///
/// In order:
/// 1. drop candidates in bundle/related/accessory containers and savings amounts;
/// 2. drop candidates outside `range`, unless that would drop all of them;
/// 3. with two or more left, keep sale/current prices over regular/struck ones;
/// 4. with two or more left and an `anchor`, take the closest to it;
/// 5. otherwise the first one encountered.
#[must_use]
pub fn select_candidate(
    candidates: Vec<PriceCandidate>,
    range: Option<PriceRange>,
    anchor: Option<Decimal>,
) -> Option<PriceCandidate> {
    let mut pool: Vec<PriceCandidate> = candidates
        .into_iter()
        .filter(|c| !c.container.is_excluded() && c.marker != PriceMarker::Savings)
        .collect();
    if pool.is_empty() {
        return None;
    }

    if let Some(range) = range {
        let in_range: Vec<PriceCandidate> = pool
            .iter()
            .filter(|c| range.contains(c.amount))
            .cloned()
            .collect();
        if !in_range.is_empty() {
            pool = in_range;
        }
    }

    if pool.len() >= 2 {
        if pool.iter().any(|c| c.marker == PriceMarker::Sale) {
            pool.retain(|c| c.marker == PriceMarker::Sale);
        } else if pool.iter().any(|c| c.marker != PriceMarker::Regular) {
            pool.retain(|c| c.marker != PriceMarker::Regular);
        }
    }

    if pool.len() >= 2 {
        if let Some(anchor) = anchor {
            // min_by_key keeps the first of equal distances.
            let best = pool
                .iter()
                .enumerate()
                .min_by_key(|(_, c)| (c.amount - anchor).abs())
                .map(|(i, _)| i)?;
            return Some(pool.swap_remove(best));
        }
    }

    pool.into_iter().next()
}
