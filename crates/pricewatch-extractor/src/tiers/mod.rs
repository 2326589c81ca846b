//! Static extraction tiers.
//!
//! Each tier reads serialized HTML and returns zero or more
//! [`PriceCandidate`]s. Parsing happens inside the call so no document is
//! held across an `.await` by the orchestrator.

pub mod css;
pub mod learned;
pub mod pattern;
pub mod structured;

use pricewatch_core::{EffectiveRules, PriceCandidate, PriceMarker, Tier};
use rust_decimal::Decimal;
use scraper::ElementRef;

use crate::dom::{
    classify_container, classify_marker, collapse_whitespace, css_locator_for, in_avoided_container,
    is_within, DomNode, PageDocument,
};
use crate::locator::Locator;
use crate::parse::{parse_number, NumericPriceParser};
use crate::variant::VariantSignature;

/// Attributes that carry a machine-readable price, tried before text.
const PRICE_ATTRS: &[&str] = &["data-price", "data-price-amount", "data-product-price", "content"];

const SNIPPET_CHARS: usize = 120;

/// Per-request inputs shared by every tier.
pub struct TierContext<'a> {
    pub rules: &'a EffectiveRules,
    pub parser: &'a NumericPriceParser,
    pub variant: &'a VariantSignature,
}

impl TierContext<'_> {
    /// Static tier candidates for `html`, in escalation order.
    #[must_use]
    pub fn run(&self, tier: Tier, html: &str) -> Vec<PriceCandidate> {
        match tier {
            Tier::StructuredData => structured::extract(html, self),
            Tier::CssSelectors => css::extract(html, self),
            Tier::Regex => pattern::extract(html, self),
            _ => Vec::new(),
        }
    }

    /// Candidates from a rendered page, relabelled as `tier`. The visible
    /// price region goes first since it reflects the selected variant;
    /// structured data and free text are fallbacks.
    #[must_use]
    pub fn run_all(&self, tier: Tier, html: &str) -> Vec<PriceCandidate> {
        let mut candidates = css::extract(html, self);
        if candidates.is_empty() {
            candidates = structured::extract(html, self);
        }
        if candidates.is_empty() {
            candidates = pattern::extract(html, self);
        }
        for c in &mut candidates {
            c.tier = tier;
        }
        candidates
    }
}

/// Elements matching the site's avoid selectors.
fn avoided_roots<'d>(doc: &'d PageDocument, rules: &EffectiveRules) -> Vec<ElementRef<'d>> {
    doc.select_all_of(&rules.avoid_selectors)
}

fn is_avoided(el: ElementRef<'_>, roots: &[ElementRef<'_>], rules: &EffectiveRules) -> bool {
    is_within(el, roots) || in_avoided_container(el, &rules.avoid_containers)
}

/// Amount and currency an element states, from its price attributes first
/// and its text otherwise.
fn element_amount(el: ElementRef<'_>, ctx: &TierContext<'_>) -> Option<(Decimal, Option<String>)> {
    let range = ctx.rules.hard_range;
    for attr in PRICE_ATTRS {
        if let Some(raw) = el.attribute(attr) {
            if let Some(parsed) = ctx.parser.parse(raw, range) {
                return Some((parsed.amount, parsed.currency));
            }
        }
    }
    let parsed = ctx.parser.parse(&el.text_content(), range)?;
    Some((parsed.amount, parsed.currency))
}

fn snippet_for(el: ElementRef<'_>) -> String {
    let context = el.parent_node().unwrap_or(el);
    truncate_chars(&context.text_content(), SNIPPET_CHARS)
}

fn truncate_chars(s: &str, max: usize) -> String {
    let collapsed = collapse_whitespace(s);
    match collapsed.char_indices().nth(max) {
        Some((idx, _)) => collapsed[..idx].to_string(),
        None => collapsed,
    }
}

fn candidate(
    el: ElementRef<'_>,
    amount: Decimal,
    currency: Option<String>,
    tier: Tier,
    locator: &Locator,
) -> PriceCandidate {
    PriceCandidate {
        amount,
        currency,
        tier,
        locator: locator.to_string(),
        snippet: snippet_for(el),
        container: classify_container(el),
        marker: classify_marker(el),
    }
}

fn decimal_from_json(value: &serde_json::Value, currency: Option<&str>) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => parse_number(&n.to_string(), None),
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            parse_number(trimmed, currency).or_else(|| NumericPriceParser::default().parse_amount(trimmed))
        }
        _ => None,
    }
    .filter(|d| *d > Decimal::ZERO)
}

/// Finds a page element stating `amount` and returns a replayable locator
/// for it. Used to turn a model answer into something the cache can keep.
#[must_use]
pub fn locate_amount(html: &str, amount: Decimal, ctx: &TierContext<'_>) -> Option<Locator> {
    let from_tiers = structured::extract(html, ctx)
        .into_iter()
        .chain(css::extract(html, ctx))
        .find(|c| c.amount == amount && c.marker != PriceMarker::Savings && !c.container.is_excluded())
        .and_then(|c| c.locator.parse::<Locator>().ok())
        .filter(Locator::is_replayable);
    if from_tiers.is_some() {
        return from_tiers;
    }

    let doc = PageDocument::parse(html);
    let roots = avoided_roots(&doc, ctx.rules);
    doc.visible_text_runs()
        .into_iter()
        .filter(|(el, _)| !is_avoided(*el, &roots, ctx.rules))
        .filter(|(el, _)| !classify_container(*el).is_excluded())
        .find(|(_, text)| {
            ctx.parser
                .find_amounts(text, true, ctx.rules.hard_range)
                .iter()
                .any(|a| !a.savings && a.amount == amount)
        })
        .and_then(|(el, _)| css_locator_for(&doc, el))
        .map(Locator::Css)
}

#[cfg(test)]
pub(crate) mod test_rules {
    use pricewatch_core::{EffectiveRules, PriceRange};
    use rust_decimal::Decimal;

    pub(crate) fn bare() -> EffectiveRules {
        EffectiveRules::bare("shop.example")
    }

    pub(crate) fn with_range(min: i64, max: i64) -> EffectiveRules {
        let mut rules = bare();
        rules.hard_range = Some(PriceRange::new(Decimal::from(min), Decimal::from(max)));
        rules
    }
}
