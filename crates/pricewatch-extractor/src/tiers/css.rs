//! CSS selector tier: site-preferred selectors, then generic price selectors,
//! plus pricing-table hints.

use pricewatch_core::{PriceCandidate, ResolutionHint, Tier};
use scraper::ElementRef;

use super::{avoided_roots, candidate, element_amount, is_avoided, TierContext};
use crate::dom::{css_locator_for, is_within, parse_selector, DomNode, PageDocument};
use crate::locator::Locator;
use crate::variant::VariantSignature;

/// Selectors common storefront themes put on the displayed price.
pub const GENERIC_PRICE_SELECTORS: &[&str] = &[
    "[data-product-price]",
    "[data-price]",
    ".product-price",
    ".product__price",
    ".price__current",
    ".current-price",
    ".sale-price",
    ".price-item",
    ".woocommerce-Price-amount",
    "span.money",
    "#price",
    ".price",
];

#[must_use]
pub fn extract(html: &str, ctx: &TierContext<'_>) -> Vec<PriceCandidate> {
    let doc = PageDocument::parse(html);
    let mut out = table_candidates(&doc, ctx);

    let roots = avoided_roots(&doc, ctx.rules);
    let selectors = ctx
        .rules
        .price_selectors
        .iter()
        .map(String::as_str)
        .chain(GENERIC_PRICE_SELECTORS.iter().copied());

    let mut matched: Vec<(ElementRef<'_>, &str)> = Vec::new();
    for selector in selectors {
        let Ok(elements) = doc.select(selector) else {
            tracing::debug!(selector, domain = %ctx.rules.domain, "skipping unparsable price selector");
            continue;
        };
        for el in elements {
            if matched.iter().any(|(m, _)| m.id() == el.id()) || is_avoided(el, &roots, ctx.rules) {
                continue;
            }
            matched.push((el, selector));
        }
    }

    // Innermost matches win: a `.price` wrapper around `.sale-price` and
    // `.was-price` children would otherwise read both amounts as one.
    let all: Vec<ElementRef<'_>> = matched.iter().map(|(el, _)| *el).collect();
    for (el, selector) in &matched {
        let has_inner_match = all
            .iter()
            .any(|other| other.id() != el.id() && is_within(*other, &[*el]));
        if has_inner_match {
            continue;
        }
        let Some((amount, currency)) = element_amount(*el, ctx) else {
            continue;
        };
        let locator = Locator::Css(css_locator_for(&doc, *el).unwrap_or_else(|| (*selector).to_string()));
        out.push(candidate(*el, amount, currency, Tier::CssSelectors, &locator));
    }
    out
}

fn table_candidates(doc: &PageDocument, ctx: &TierContext<'_>) -> Vec<PriceCandidate> {
    let Some(ResolutionHint::TableColumn { column, row_match }) = &ctx.rules.resolution else {
        return Vec::new();
    };
    let Some(token) = row_match.clone().or_else(|| ctx.variant.primary.clone()) else {
        return Vec::new();
    };
    let Some(cell) = table_cell(doc, *column, &token) else {
        return Vec::new();
    };
    let Some((amount, currency)) = element_amount(cell, ctx) else {
        return Vec::new();
    };
    let locator = Locator::TableColumn {
        column: *column,
        token,
    };
    vec![candidate(cell, amount, currency, Tier::CssSelectors, &locator)]
}

/// The 1-based `column` cell of the first table row that mentions `token`.
///
/// Power and size tokens compare by value and unit (`40W` matches
/// `40 Watt` but not `140W`); anything else must appear as whole words.
#[must_use]
pub fn table_cell<'d>(doc: &'d PageDocument, column: usize, token: &str) -> Option<ElementRef<'d>> {
    let cell_selector = parse_selector("td, th").ok()?;
    let signature = VariantSignature::parse(token);
    let wanted = token.to_lowercase();
    doc.select("tr")
        .ok()?
        .into_iter()
        .filter(|row| {
            let text = row.text_content();
            if signature.primary.is_some() {
                signature.primary_matches(&text)
            } else {
                contains_bounded(&text.to_lowercase(), &wanted)
            }
        })
        .find_map(|row| row.select(&cell_selector).nth(column.checked_sub(1)?))
}

fn contains_bounded(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

#[cfg(test)]
mod tests {
    use pricewatch_core::{ContainerKind, PriceMarker};
    use rust_decimal::Decimal;

    use super::*;
    use crate::candidate::select_candidate;
    use crate::parse::NumericPriceParser;
    use crate::tiers::test_rules;

    fn run(html: &str, rules: &pricewatch_core::EffectiveRules, item: &str) -> Vec<PriceCandidate> {
        let parser = NumericPriceParser::default();
        let variant = VariantSignature::parse(item);
        let ctx = TierContext {
            rules,
            parser: &parser,
            variant: &variant,
        };
        extract(html, &ctx)
    }

    #[test]
    fn sale_child_beats_struck_regular_price() {
        let html = r#"
            <div class="product-info">
              <div class="price">
                <s class="price-item price-item--regular">$8,888.00</s>
                <span class="price-item price-item--sale">$6,666.00</span>
                <span class="savings">Save $2,222.00</span>
              </div>
            </div>"#;
        let found = run(html, &test_rules::bare(), "Laser");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].marker, PriceMarker::Regular);
        assert_eq!(found[1].marker, PriceMarker::Sale);

        let chosen = select_candidate(found, None, None).unwrap();
        assert_eq!(chosen.amount, Decimal::new(6666, 0));
    }

    #[test]
    fn site_selectors_come_first_and_avoided_regions_are_skipped() {
        let html = r#"
            <div class="upsell-row"><span class="price">$49.00</span></div>
            <div id="buy"><span class="amount-now">$1,849.00</span></div>
            <aside class="frequently-bought"><span class="price">$1,999.00</span></aside>"#;
        let mut rules = test_rules::bare();
        rules.price_selectors = vec!["#buy .amount-now".to_string()];
        rules.avoid_containers = vec!["upsell".to_string()];
        rules.avoid_selectors = vec!["aside".to_string()];

        let found = run(html, &rules, "Model X");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].amount, Decimal::new(1849, 0));
        assert_eq!(found[0].locator, "css:#buy span.amount-now");
    }

    #[test]
    fn data_price_attribute_in_cents() {
        let html = r#"<span class="product-price" data-product-price="184900">$1,849</span>"#;
        let found = run(html, &test_rules::with_range(1, 10_000), "Model X");
        assert_eq!(found[0].amount, Decimal::new(1849, 0));
    }

    #[test]
    fn bundle_container_is_classified() {
        let html = r#"<div class="bundle-offer"><span class="price">$2,299</span></div>"#;
        let found = run(html, &test_rules::bare(), "Model X");
        assert_eq!(found[0].container, ContainerKind::Bundle);
    }

    #[test]
    fn table_column_hint_reads_the_variant_row() {
        let html = r#"
            <table id="pricing">
              <tr><th>Model</th><th>Power</th><th>Price</th></tr>
              <tr><td>Cutter Pro</td><td>30W</td><td>$2,100</td></tr>
              <tr><td>Cutter Pro</td><td>40W</td><td>$2,650</td></tr>
            </table>"#;
        let mut rules = test_rules::bare();
        rules.resolution = Some(ResolutionHint::TableColumn {
            column: 3,
            row_match: None,
        });
        let found = run(html, &rules, "Cutter Pro 40W");
        assert_eq!(found[0].amount, Decimal::new(2650, 0));
        assert_eq!(found[0].locator, "table:3:40W");
    }

    #[test]
    fn table_rows_match_the_power_value_not_a_substring() {
        let html = r#"
            <table>
              <tr><td>Cutter Pro</td><td>140W</td><td>$4,900</td></tr>
              <tr><td>Cutter Pro</td><td>40 Watt</td><td>$2,650</td></tr>
            </table>"#;
        let doc = PageDocument::parse(html);
        let cell = table_cell(&doc, 3, "40W").unwrap();
        assert_eq!(cell.text_content().trim(), "$2,650");
        assert!(table_cell(&doc, 3, "60W").is_none());
    }

    #[test]
    fn plain_row_tokens_need_whole_words() {
        let html = r#"
            <table>
              <tr><td>Prostyle</td><td>$900</td></tr>
              <tr><td>Pro</td><td>$1,200</td></tr>
            </table>"#;
        let doc = PageDocument::parse(html);
        assert_eq!(table_cell(&doc, 2, "Pro").unwrap().text_content().trim(), "$1,200");
    }
}
