//! Replays a cached locator against a freshly fetched page.

use pricewatch_core::{ContainerKind, PriceCandidate, PriceMarker, Tier};

use super::css::table_cell;
use super::structured::{meta_price, offer_entries};
use super::{avoided_roots, candidate, element_amount, is_avoided, TierContext};
use crate::dom::PageDocument;
use crate::locator::Locator;
use crate::variant::VariantSignature;

/// The candidate `locator` points at on this page, if it still resolves.
///
/// Free-text and model locators never replay.
#[must_use]
pub fn replay(html: &str, locator: &Locator, ctx: &TierContext<'_>) -> Option<PriceCandidate> {
    match locator {
        Locator::Css(css) => {
            let doc = PageDocument::parse(html);
            let roots = avoided_roots(&doc, ctx.rules);
            let el = doc
                .select(css)
                .ok()?
                .into_iter()
                .find(|el| !is_avoided(*el, &roots, ctx.rules))?;
            let (amount, currency) = element_amount(el, ctx)?;
            Some(candidate(el, amount, currency, Tier::LearnedSelector, locator))
        }
        Locator::JsonLd { field, token } => {
            let token_sig = token.as_deref().map(VariantSignature::parse);
            let entry = offer_entries(html).into_iter().find(|e| {
                e.field == field.as_str()
                    && match (&token_sig, token) {
                        (Some(sig), _) if sig.primary.is_some() => sig.primary_matches(&e.label),
                        (_, Some(t)) => e.label.to_lowercase().contains(&t.to_lowercase()),
                        _ => true,
                    }
            })?;
            Some(PriceCandidate {
                amount: entry.amount,
                currency: entry.currency,
                tier: Tier::LearnedSelector,
                locator: locator.to_string(),
                snippet: entry.label,
                container: ContainerKind::Main,
                marker: PriceMarker::Unmarked,
            })
        }
        Locator::Meta(property) => {
            let doc = PageDocument::parse(html);
            let (amount, currency) = meta_price(&doc, property)?;
            Some(PriceCandidate {
                amount,
                currency,
                tier: Tier::LearnedSelector,
                locator: locator.to_string(),
                snippet: format!("{property}={amount}"),
                container: ContainerKind::Main,
                marker: PriceMarker::Unmarked,
            })
        }
        Locator::TableColumn { column, token } => {
            let doc = PageDocument::parse(html);
            let cell = table_cell(&doc, *column, token)?;
            let (amount, currency) = element_amount(cell, ctx)?;
            Some(candidate(cell, amount, currency, Tier::LearnedSelector, locator))
        }
        Locator::Regex(_) | Locator::Ai(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::parse::NumericPriceParser;
    use crate::tiers::test_rules;

    const PAGE: &str = r#"
        <html><head>
          <meta property="og:price:amount" content="1849.00">
          <script type="application/ld+json">
            {"@type":"Product","name":"Model X","offers":[
              {"@type":"Offer","name":"60W","price":"1849.00","priceCurrency":"USD"},
              {"@type":"Offer","name":"100W","price":"2499.00","priceCurrency":"USD"}]}
          </script>
        </head><body>
          <div class="upsell"><span class="price">$99</span></div>
          <div id="main"><span class="price">$1,849.00</span></div>
          <table><tr><td>60W</td><td>$1,849</td></tr><tr><td>100W</td><td>$2,499</td></tr></table>
        </body></html>"#;

    fn replay_str(locator: &str) -> Option<PriceCandidate> {
        let mut rules = test_rules::bare();
        rules.avoid_containers = vec!["upsell".to_string()];
        let parser = NumericPriceParser::default();
        let variant = VariantSignature::parse("Model X 100W");
        let ctx = TierContext {
            rules: &rules,
            parser: &parser,
            variant: &variant,
        };
        replay(PAGE, &locator.parse().unwrap(), &ctx)
    }

    #[test]
    fn css_skips_avoided_matches() {
        let c = replay_str("css:.price").unwrap();
        assert_eq!(c.amount, Decimal::new(1849, 0));
        assert_eq!(c.tier, Tier::LearnedSelector);
        assert_eq!(c.locator, "css:.price");
    }

    #[test]
    fn jsonld_honours_the_token() {
        let c = replay_str("jsonld:offers.price[100W]").unwrap();
        assert_eq!(c.amount, Decimal::new(2499, 0));
    }

    #[test]
    fn meta_and_table_replay() {
        assert_eq!(
            replay_str("meta:og:price:amount").unwrap().amount,
            Decimal::new(1849, 0)
        );
        assert_eq!(
            replay_str("table:2:100W").unwrap().amount,
            Decimal::new(2499, 0)
        );
    }

    #[test]
    fn stale_and_free_text_locators_miss() {
        assert!(replay_str("css:#gone").is_none());
        assert!(replay_str("regex:text#1").is_none());
    }
}
