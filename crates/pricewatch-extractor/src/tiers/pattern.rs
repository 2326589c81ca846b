//! Free-text tier: currency-anchored amounts in the page's visible text.

use pricewatch_core::{PriceCandidate, Tier};

use super::{avoided_roots, is_avoided, truncate_chars, TierContext};
use crate::dom::{classify_container, classify_marker, PageDocument};
use crate::locator::Locator;

const CONTEXT_CHARS: usize = 60;

#[must_use]
pub fn extract(html: &str, ctx: &TierContext<'_>) -> Vec<PriceCandidate> {
    let doc = PageDocument::parse(html);
    let roots = avoided_roots(&doc, ctx.rules);
    let mut out = Vec::new();

    for (el, text) in doc.visible_text_runs() {
        if is_avoided(el, &roots, ctx.rules) {
            continue;
        }
        for amount in ctx.parser.find_amounts(&text, true, ctx.rules.hard_range) {
            if amount.savings {
                continue;
            }
            let n = out.len() + 1;
            out.push(PriceCandidate {
                amount: amount.amount,
                currency: amount.currency,
                tier: Tier::Regex,
                locator: Locator::Regex(format!("text#{n}")).to_string(),
                snippet: context_window(&text, amount.start, amount.end),
                container: classify_container(el),
                marker: classify_marker(el),
            });
        }
    }
    out
}

fn context_window(text: &str, start: usize, end: usize) -> String {
    let from = text[..start]
        .char_indices()
        .rev()
        .nth(CONTEXT_CHARS)
        .map_or(0, |(i, _)| i);
    let to = text[end..]
        .char_indices()
        .nth(CONTEXT_CHARS)
        .map_or(text.len(), |(i, _)| end + i);
    truncate_chars(&text[from..to], 2 * CONTEXT_CHARS)
}
