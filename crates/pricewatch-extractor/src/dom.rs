//! Page tree access behind a small capability interface.
//!
//! The tier extractors, the variant resolver and locator replay only need to
//! query by selector, read text and attributes, and walk to the parent. That
//! is [`DomNode`]; [`PageDocument`] implements it over the `scraper` engine.
//!
//! `scraper::Html` is not `Send`, so a `PageDocument` must never be held
//! across an `.await`.

use pricewatch_core::{ContainerKind, PriceMarker};
use scraper::{ElementRef, Html, Selector};

use crate::error::ExtractError;

/// How far up the tree container classification looks.
const CONTAINER_DEPTH: usize = 8;
/// How far up the tree price-marker classification looks.
const MARKER_DEPTH: usize = 3;

const BUNDLE_MARKERS: &[&str] = &["bundle", "kit", "package", "combo", "addon", "add-on"];
const RELATED_MARKERS: &[&str] = &[
    "related",
    "recommend",
    "upsell",
    "cross-sell",
    "crosssell",
    "similar",
    "also-bought",
    "frequently",
    "recently-viewed",
];
const ACCESSORY_MARKERS: &[&str] = &["accessor"];
const MAIN_MARKERS: &[&str] = &[
    "product-main",
    "main-product",
    "product-info",
    "product__info",
    "product-detail",
    "product-single",
    "buy-box",
    "buybox",
    "pdp",
];

const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template", "head"];

pub trait DomNode: Copy {
    fn tag_name(&self) -> &str;
    fn text_content(&self) -> String;
    fn attribute(&self, name: &str) -> Option<&str>;
    fn parent_node(&self) -> Option<Self>;

    /// `class` and `id` joined and lowercased.
    fn class_and_id(&self) -> String {
        let mut out = String::new();
        if let Some(class) = self.attribute("class") {
            out.push_str(class);
        }
        if let Some(id) = self.attribute("id") {
            out.push(' ');
            out.push_str(id);
        }
        out.to_lowercase()
    }
}

impl<'a> DomNode for ElementRef<'a> {
    fn tag_name(&self) -> &str {
        self.value().name()
    }

    fn text_content(&self) -> String {
        collapse_whitespace(&self.text().collect::<Vec<_>>().join(" "))
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.value().attr(name)
    }

    fn parent_node(&self) -> Option<Self> {
        self.parent().and_then(ElementRef::wrap)
    }
}

/// A parsed page.
pub struct PageDocument {
    html: Html,
}

impl PageDocument {
    #[must_use]
    pub fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
        }
    }

    #[must_use]
    pub fn html(&self) -> &Html {
        &self.html
    }

    /// Elements matching a CSS selector, in document order.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::InvalidLocator`] if `css` does not parse.
    pub fn select(&self, css: &str) -> Result<Vec<ElementRef<'_>>, ExtractError> {
        let selector = parse_selector(css)?;
        Ok(self.html.select(&selector).collect())
    }

    #[must_use]
    pub fn title(&self) -> Option<String> {
        let selector = Selector::parse("title").ok()?;
        self.html
            .select(&selector)
            .next()
            .map(|t| t.text_content())
            .filter(|t| !t.is_empty())
    }

    /// Non-empty visible text runs with the element that holds each.
    #[must_use]
    pub fn visible_text_runs(&self) -> Vec<(ElementRef<'_>, String)> {
        let mut runs = Vec::new();
        for node in self.html.root_element().descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            let trimmed = collapse_whitespace(text);
            if trimmed.is_empty() {
                continue;
            }
            let hidden = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|e| HIDDEN_TAGS.contains(&e.name()))
            });
            if hidden {
                continue;
            }
            if let Some(parent) = node.parent().and_then(ElementRef::wrap) {
                runs.push((parent, trimmed));
            }
        }
        runs
    }

    /// All visible text of the page, runs separated by a single space.
    #[must_use]
    pub fn visible_text(&self) -> String {
        self.visible_text_runs()
            .into_iter()
            .map(|(_, t)| t)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Elements matched by any of `selectors`; invalid selectors are skipped.
    #[must_use]
    pub fn select_all_of(&self, selectors: &[String]) -> Vec<ElementRef<'_>> {
        selectors
            .iter()
            .filter_map(|s| self.select(s).ok())
            .flatten()
            .collect()
    }
}

/// # Errors
///
/// Returns [`ExtractError::InvalidLocator`] if `css` does not parse.
pub fn parse_selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::InvalidLocator(format!("{css}: {e:?}")))
}

/// `true` if `el` is one of `roots` or sits inside one of them.
#[must_use]
pub fn is_within(el: ElementRef<'_>, roots: &[ElementRef<'_>]) -> bool {
    if roots.is_empty() {
        return false;
    }
    let mut current = Some(el);
    while let Some(node) = current {
        if roots.iter().any(|r| r.id() == node.id()) {
            return true;
        }
        current = node.parent_node();
    }
    false
}

/// `true` if `el` or an ancestor carries one of the site's avoided container
/// markers in its class or id.
#[must_use]
pub fn in_avoided_container<N: DomNode>(node: N, markers: &[String]) -> bool {
    if markers.is_empty() {
        return false;
    }
    let lowered: Vec<String> = markers.iter().map(|m| m.to_lowercase()).collect();
    ancestors_inclusive(node, CONTAINER_DEPTH)
        .any(|n| {
            let attrs = n.class_and_id();
            lowered.iter().any(|m| attrs.contains(m.as_str()))
        })
}

/// Classifies the page region a price element lives in. The nearest
/// recognised ancestor decides.
#[must_use]
pub fn classify_container<N: DomNode>(node: N) -> ContainerKind {
    for n in ancestors_inclusive(node, CONTAINER_DEPTH) {
        let attrs = n.class_and_id();
        if attrs.is_empty() {
            if n.tag_name() == "main"
                || n.attribute("itemtype").is_some_and(|t| t.contains("Product"))
            {
                return ContainerKind::Main;
            }
            continue;
        }
        if BUNDLE_MARKERS.iter().any(|m| attrs.contains(m)) {
            return ContainerKind::Bundle;
        }
        if RELATED_MARKERS.iter().any(|m| attrs.contains(m)) {
            return ContainerKind::Related;
        }
        if ACCESSORY_MARKERS.iter().any(|m| attrs.contains(m)) {
            return ContainerKind::Accessory;
        }
        if MAIN_MARKERS.iter().any(|m| attrs.contains(m))
            || n.tag_name() == "main"
            || n.attribute("itemtype").is_some_and(|t| t.contains("Product"))
        {
            return ContainerKind::Main;
        }
    }
    ContainerKind::Unknown
}

/// Reads sale/regular/savings markers from the element and its closest
/// ancestors.
#[must_use]
pub fn classify_marker<N: DomNode>(node: N) -> PriceMarker {
    for n in ancestors_inclusive(node, MARKER_DEPTH) {
        match n.tag_name() {
            "del" | "s" | "strike" => return PriceMarker::Regular,
            "ins" => return PriceMarker::Sale,
            _ => {}
        }
        let attrs = n.class_and_id();
        let tokens: Vec<&str> = attrs
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        let has = |short: &[&str], long: &[&str]| {
            tokens
                .iter()
                .any(|t| short.contains(t) || long.iter().any(|l| t.contains(l)))
        };
        if has(&[], &["save", "saving", "discount"]) {
            return PriceMarker::Savings;
        }
        if has(
            &["was", "old", "list", "msrp", "rrp"],
            &["regular", "compare", "original", "strike", "before"],
        ) {
            return PriceMarker::Regular;
        }
        if has(&["now", "final", "offer"], &["sale", "special", "current", "promo"]) {
            return PriceMarker::Sale;
        }
    }
    PriceMarker::Unmarked
}

/// A CSS selector that picks `el` as the first match in its document.
///
/// Prefers an id; otherwise uses tag and stable-looking classes, anchored
/// under the nearest ancestor with an id. Returns `None` when no such
/// selector is unique enough.
#[must_use]
pub fn css_locator_for(doc: &PageDocument, el: ElementRef<'_>) -> Option<String> {
    let own = selector_piece(el)?;
    let mut candidates = vec![own.clone()];

    let mut parent = el.parent_node();
    let mut depth = 0;
    while let Some(p) = parent {
        if depth >= CONTAINER_DEPTH {
            break;
        }
        if let Some(id) = p.attribute("id").filter(|id| is_css_ident(id)) {
            candidates.push(format!("#{id} {own}"));
            break;
        }
        parent = p.parent_node();
        depth += 1;
    }

    candidates.into_iter().rev().find(|css| {
        doc.select(css)
            .ok()
            .and_then(|m| m.first().map(|first| first.id() == el.id()))
            .unwrap_or(false)
    })
}

fn selector_piece(el: ElementRef<'_>) -> Option<String> {
    if let Some(id) = el.attribute("id").filter(|id| is_css_ident(id)) {
        return Some(format!("#{id}"));
    }
    let classes: Vec<&str> = el
        .value()
        .classes()
        .filter(|c| is_css_ident(c) && !c.chars().any(|ch| ch.is_ascii_digit()))
        .take(3)
        .collect();
    if classes.is_empty() {
        return None;
    }
    Some(format!("{}.{}", el.tag_name(), classes.join(".")))
}

fn is_css_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '-')
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn ancestors_inclusive<N: DomNode>(node: N, depth: usize) -> impl Iterator<Item = N> {
    std::iter::successors(Some(node), N::parent_node).take(depth + 1)
}

/// Collapses runs of whitespace to single spaces and trims.
#[must_use]
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
