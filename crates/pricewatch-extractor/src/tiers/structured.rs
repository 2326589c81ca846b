//! Structured data: JSON-LD offers, microdata and price meta tags.

use std::sync::LazyLock;

use pricewatch_core::{ContainerKind, PriceCandidate, PriceMarker, Tier};
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value;

use super::{avoided_roots, candidate, decimal_from_json, element_amount, is_avoided, TierContext};
use crate::dom::{css_locator_for, DomNode, PageDocument};
use crate::locator::Locator;

static JSONLD_SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script[^>]+type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .expect("valid regex")
});

const PRODUCT_TYPES: &[&str] = &["Product", "ProductGroup", "IndividualProduct", "ProductModel"];

const META_PRICE_PROPERTIES: &[&str] = &["product:price:amount", "og:price:amount"];
const META_CURRENCY_PROPERTIES: &[&str] = &["product:price:currency", "og:price:currency"];

/// One price-bearing JSON-LD offer.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferEntry {
    /// `offers.price`, `offers.lowPrice` or `offers.priceSpecification.price`.
    pub field: &'static str,
    pub amount: Decimal,
    pub currency: Option<String>,
    /// Product name, offer name and sku joined; matched against variant tokens.
    pub label: String,
}

/// Candidates from JSON-LD, microdata and meta tags, in that order.
#[must_use]
pub fn extract(html: &str, ctx: &TierContext<'_>) -> Vec<PriceCandidate> {
    let mut out = jsonld_candidates(html, ctx);
    out.extend(markup_candidates(html, ctx));
    out
}

fn jsonld_candidates(html: &str, ctx: &TierContext<'_>) -> Vec<PriceCandidate> {
    let entries = offer_entries(html);
    let token = ctx.variant.primary.clone();
    let matching: Vec<&OfferEntry> = match &token {
        Some(_) => entries
            .iter()
            .filter(|e| ctx.variant.primary_matches(&e.label))
            .collect(),
        None => Vec::new(),
    };
    let (chosen, token) = if matching.is_empty() {
        (entries.iter().collect::<Vec<_>>(), None)
    } else {
        (matching, token)
    };

    chosen
        .into_iter()
        .map(|e| PriceCandidate {
            amount: e.amount,
            currency: e.currency.clone(),
            tier: Tier::StructuredData,
            locator: Locator::JsonLd {
                field: e.field.to_string(),
                token: token.clone(),
            }
            .to_string(),
            snippet: super::truncate_chars(&e.label, 120),
            container: ContainerKind::Main,
            marker: PriceMarker::Unmarked,
        })
        .collect()
}

/// Every offer price found in the page's JSON-LD blocks, in document order.
#[must_use]
pub fn offer_entries(html: &str) -> Vec<OfferEntry> {
    let mut entries = Vec::new();
    for cap in JSONLD_SCRIPT_RE.captures_iter(html) {
        let Some(json_text) = cap.get(1).map(|m| m.as_str().trim()) else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<Value>(json_text) else {
            continue;
        };

        let mut nodes: Vec<Value> = match value {
            Value::Array(items) => items,
            other => vec![other],
        };
        let graph: Vec<Value> = nodes
            .iter()
            .filter_map(|n| n.get("@graph").and_then(Value::as_array))
            .flatten()
            .cloned()
            .collect();
        nodes.extend(graph);

        for node in &nodes {
            collect_product(node, "", &mut entries);
        }
    }
    entries
}

fn is_product(node: &Value) -> bool {
    match node.get("@type") {
        Some(Value::String(t)) => PRODUCT_TYPES.iter().any(|p| t.eq_ignore_ascii_case(p)),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| PRODUCT_TYPES.iter().any(|p| t.eq_ignore_ascii_case(p))),
        _ => false,
    }
}

fn collect_product(node: &Value, parent_name: &str, out: &mut Vec<OfferEntry>) {
    if !is_product(node) {
        return;
    }
    let name = node.get("name").and_then(Value::as_str).unwrap_or(parent_name);
    let sku = node.get("sku").and_then(Value::as_str).unwrap_or_default();

    match node.get("offers") {
        Some(Value::Array(offers)) => {
            for offer in offers {
                collect_offer(offer, name, sku, out);
            }
        }
        Some(offer @ Value::Object(_)) => collect_offer(offer, name, sku, out),
        _ => {}
    }

    if let Some(Value::Array(variants)) = node.get("hasVariant") {
        for variant in variants {
            collect_product(variant, name, out);
        }
    }
}

fn collect_offer(offer: &Value, product_name: &str, sku: &str, out: &mut Vec<OfferEntry>) {
    let currency = offer
        .get("priceCurrency")
        .and_then(Value::as_str)
        .map(str::to_uppercase);
    let offer_name = offer.get("name").and_then(Value::as_str).unwrap_or_default();
    let offer_sku = offer.get("sku").and_then(Value::as_str).unwrap_or(sku);
    let label = [product_name, offer_name, offer_sku]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");

    // AggregateOffer may nest its individual offers.
    if let Some(Value::Array(nested)) = offer.get("offers") {
        for inner in nested {
            collect_offer(inner, product_name, offer_sku, out);
        }
    }

    let amount_and_field = offer
        .get("price")
        .and_then(|v| decimal_from_json(v, currency.as_deref()))
        .map(|d| (d, "offers.price"))
        .or_else(|| {
            offer
                .get("lowPrice")
                .and_then(|v| decimal_from_json(v, currency.as_deref()))
                .map(|d| (d, "offers.lowPrice"))
        })
        .or_else(|| {
            let spec = match offer.get("priceSpecification") {
                Some(Value::Array(specs)) => specs.first(),
                other => other,
            }?;
            spec.get("price")
                .and_then(|v| decimal_from_json(v, currency.as_deref()))
                .map(|d| (d, "offers.priceSpecification.price"))
        });

    if let Some((amount, field)) = amount_and_field {
        out.push(OfferEntry {
            field,
            amount,
            currency,
            label,
        });
    }
}

fn markup_candidates(html: &str, ctx: &TierContext<'_>) -> Vec<PriceCandidate> {
    let doc = PageDocument::parse(html);
    let roots = avoided_roots(&doc, ctx.rules);
    let mut out = Vec::new();

    if let Ok(elements) = doc.select("[itemprop=price]") {
        for el in elements {
            if is_avoided(el, &roots, ctx.rules) {
                continue;
            }
            let Some((amount, currency)) = element_amount(el, ctx) else {
                continue;
            };
            let currency = currency.or_else(|| itemprop_currency(&doc));
            let locator = Locator::Css(
                css_locator_for(&doc, el).unwrap_or_else(|| "[itemprop=price]".to_string()),
            );
            out.push(candidate(el, amount, currency, Tier::StructuredData, &locator));
        }
    }

    for property in META_PRICE_PROPERTIES {
        let Some((amount, currency)) = meta_price(&doc, property) else {
            continue;
        };
        out.push(PriceCandidate {
            amount,
            currency,
            tier: Tier::StructuredData,
            locator: Locator::Meta((*property).to_string()).to_string(),
            snippet: format!("{property}={amount}"),
            container: ContainerKind::Main,
            marker: PriceMarker::Unmarked,
        });
    }

    out
}

fn itemprop_currency(doc: &PageDocument) -> Option<String> {
    doc.select("[itemprop=priceCurrency]")
        .ok()?
        .into_iter()
        .find_map(|el| {
            el.attribute("content")
                .map(str::to_string)
                .or_else(|| Some(el.text_content()))
        })
        .map(|c| c.trim().to_uppercase())
        .filter(|c| c.len() == 3)
}

/// Price and currency from `<meta property=…>` tags.
#[must_use]
pub fn meta_price(doc: &PageDocument, property: &str) -> Option<(Decimal, Option<String>)> {
    let content = meta_content(doc, property)?;
    let currency = META_CURRENCY_PROPERTIES
        .iter()
        .find_map(|p| meta_content(doc, p))
        .map(|c| c.trim().to_uppercase());
    let amount = decimal_from_json(&Value::String(content), currency.as_deref())?;
    Some((amount, currency))
}

fn meta_content(doc: &PageDocument, property: &str) -> Option<String> {
    let css = format!("meta[property=\"{property}\"], meta[name=\"{property}\"]");
    doc.select(&css)
        .ok()?
        .into_iter()
        .find_map(|el| el.attribute("content").map(str::to_string))
}
