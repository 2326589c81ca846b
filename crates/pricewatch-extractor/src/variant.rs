//! Variant resolution for multi-option product pages.
//!
//! An item name such as `"Model X 60W Kit"` carries a primary token (`60W`)
//! and optionally a package token (`kit`). [`plan`] turns that signature
//! plus the controls found on a rendered page into an ordered list of
//! interactions; [`VariantResolver::execute`] runs them against a browser
//! session, waiting for the price region to settle after each one.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use pricewatch_core::{ControlKind, ResolutionHint, VariantResolution};
use regex::Regex;
use rust_decimal::Decimal;
use scraper::ElementRef;

use crate::dom::{css_locator_for, DomNode, PageDocument};
use crate::parse::NumericPriceParser;
use crate::render_pool::BrowserSession;

static POWER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^\d.])(\d+(?:\.\d+)?)\s*(kw|w|watts?)\b").expect("valid regex")
});

static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?:^|[^\d.])(\d+(?:\.\d+)?)\s*("|in\b|inch(?:es)?\b|mm\b|cm\b|l\b|lit(?:er|re)s?\b|oz\b|qt\b|gal(?:lons?)?\b|lbs?\b|kg\b)"#,
    )
    .expect("valid regex")
});

const PACKAGE_WORDS: &[&str] = &["kit", "bundle", "combo", "package", "set"];
const BASE_OPTION_WORDS: &[&str] = &[
    "base",
    "standard",
    "none",
    "machine only",
    "unit only",
    "no kit",
    "no bundle",
];

/// The variant a catalog item name asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSignature {
    pub base_name: String,
    /// Normalized power or size token, e.g. `"60W"`, `"12IN"`.
    pub primary: Option<String>,
    /// Package word the name explicitly requests (`"kit"`, `"bundle"`…).
    pub package: Option<String>,
}

impl VariantSignature {
    #[must_use]
    pub fn parse(item_name: &str) -> Self {
        let primary = power_tokens(item_name)
            .into_iter()
            .next()
            .or_else(|| size_tokens(item_name).into_iter().next());

        let lower = item_name.to_lowercase();
        let package = PACKAGE_WORDS
            .iter()
            .find(|w| contains_word(&lower, w))
            .map(|w| (*w).to_string());

        let mut base = item_name.to_string();
        if let Some(m) = POWER_RE.find(item_name).or_else(|| SIZE_RE.find(item_name)) {
            if primary.is_some() {
                base.replace_range(m.range(), " ");
            }
        }
        let base_name = base
            .split_whitespace()
            .filter(|w| {
                let lw = w.to_lowercase();
                !PACKAGE_WORDS.contains(&lw.as_str())
            })
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            base_name,
            primary,
            package,
        }
    }

    /// Key distinguishing this variant from its siblings.
    #[must_use]
    pub fn variant_key(&self) -> String {
        match (&self.primary, &self.package) {
            (Some(p), Some(k)) => format!("{p}+{k}"),
            (Some(p), None) => p.clone(),
            (None, Some(k)) => k.clone(),
            (None, None) => "default".to_string(),
        }
    }

    /// `true` if `text` mentions the primary token (`"60 Watt"` matches `60W`).
    #[must_use]
    pub fn primary_matches(&self, text: &str) -> bool {
        let Some(primary) = &self.primary else {
            return false;
        };
        power_tokens(text)
            .into_iter()
            .chain(size_tokens(text))
            .any(|t| &t == primary)
    }
}

fn power_tokens(text: &str) -> Vec<String> {
    POWER_RE
        .captures_iter(text)
        .filter_map(|c| {
            let num = normalize_num(c.get(1)?.as_str());
            let unit = c.get(2)?.as_str().to_lowercase();
            let unit = if unit == "kw" { "KW" } else { "W" };
            Some(format!("{num}{unit}"))
        })
        .collect()
}

fn size_tokens(text: &str) -> Vec<String> {
    SIZE_RE
        .captures_iter(text)
        .filter_map(|c| {
            let num = normalize_num(c.get(1)?.as_str());
            let unit = c.get(2)?.as_str().to_lowercase();
            let unit = match unit.as_str() {
                "\"" | "in" | "inch" | "inches" => "IN",
                u if u.starts_with("lit") || u == "l" => "L",
                u if u.starts_with("gal") => "GAL",
                u if u.starts_with("lb") => "LB",
                u => return Some(format!("{num}{}", u.to_uppercase())),
            };
            Some(format!("{num}{unit}"))
        })
        .collect()
}

fn normalize_num(raw: &str) -> String {
    if raw.contains('.') {
        raw.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        raw.to_string()
    }
}

fn contains_word(haystack_lower: &str, word: &str) -> bool {
    haystack_lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| w == word)
}

fn has_package_word(label: &str) -> bool {
    let lower = label.to_lowercase();
    PACKAGE_WORDS.iter().any(|w| contains_word(&lower, w))
        || lower.contains("add-on")
        || lower.contains("addon")
}

fn has_base_word(label: &str) -> bool {
    let lower = label.to_lowercase();
    BASE_OPTION_WORDS.iter().any(|w| lower.contains(w))
}

// ---------------------------------------------------------------------------
// Controls
// ---------------------------------------------------------------------------

/// One choosable option on a rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantControl {
    pub kind: ControlKind,
    /// Options sharing a group are alternatives (one `<select>`, one radio
    /// name, one swatch row).
    pub group: String,
    /// Selector of the element to act on: the `<select>` for dropdowns, the
    /// input or button otherwise.
    pub css: String,
    /// Option value for dropdowns; empty for click targets.
    pub value: String,
    pub label: String,
}

/// Finds dropdown options, radio inputs and option buttons.
#[must_use]
pub fn discover_controls(doc: &PageDocument) -> Vec<VariantControl> {
    let mut controls = Vec::new();

    if let Ok(selects) = doc.select("select") {
        for select in selects {
            let Some(css) = stable_selector(doc, select, &["name"]) else {
                continue;
            };
            let Ok(option_sel) = crate::dom::parse_selector("option") else {
                continue;
            };
            for option in select.select(&option_sel) {
                if option.attribute("disabled").is_some() {
                    continue;
                }
                let label = option.text_content();
                let value = option
                    .attribute("value")
                    .map_or_else(|| label.clone(), str::to_string);
                if value.trim().is_empty() || label.is_empty() {
                    continue;
                }
                controls.push(VariantControl {
                    kind: ControlKind::Dropdown,
                    group: css.clone(),
                    css: css.clone(),
                    value,
                    label,
                });
            }
        }
    }

    if let Ok(radios) = doc.select("input[type=radio]") {
        for radio in radios {
            if radio.attribute("disabled").is_some() {
                continue;
            }
            let label = radio_label(doc, radio);
            if label.is_empty() {
                continue;
            }
            let group = radio.attribute("name").unwrap_or("radio").to_string();
            let css = match (radio.attribute("id"), radio.attribute("value")) {
                (Some(id), _) => format!("[id=\"{}\"]", escape_attr(id)),
                (None, Some(value)) => format!(
                    "input[type=radio][name=\"{}\"][value=\"{}\"]",
                    escape_attr(&group),
                    escape_attr(value)
                ),
                (None, None) => continue,
            };
            controls.push(VariantControl {
                kind: ControlKind::Radio,
                group,
                css,
                value: String::new(),
                label,
            });
        }
    }

    let buttons = doc.select_all_of(&[
        "button[data-value]".to_string(),
        "[data-option-value]".to_string(),
        "[role=radio][data-value]".to_string(),
        ".swatch[data-value]".to_string(),
    ]);
    let mut seen = Vec::new();
    for button in buttons {
        if seen.contains(&button.id()) {
            continue;
        }
        seen.push(button.id());
        let value = button
            .attribute("data-value")
            .or_else(|| button.attribute("data-option-value"))
            .unwrap_or_default();
        let text = button.text_content();
        let label = if text.is_empty() { value.to_string() } else { text };
        if label.is_empty() {
            continue;
        }
        let css = if let Some(id) = button.attribute("id") {
            format!("[id=\"{}\"]", escape_attr(id))
        } else if let Some(v) = button.attribute("data-value") {
            format!("[data-value=\"{}\"]", escape_attr(v))
        } else {
            format!("[data-option-value=\"{}\"]", escape_attr(value))
        };
        let group = button
            .parent_node()
            .and_then(|p| css_locator_for(doc, p))
            .unwrap_or_else(|| "buttons".to_string());
        controls.push(VariantControl {
            kind: ControlKind::Button,
            group,
            css,
            value: String::new(),
            label,
        });
    }

    controls
}

fn stable_selector(doc: &PageDocument, el: ElementRef<'_>, attrs: &[&str]) -> Option<String> {
    if let Some(id) = el.attribute("id") {
        return Some(format!("[id=\"{}\"]", escape_attr(id)));
    }
    for attr in attrs {
        if let Some(value) = el.attribute(attr) {
            return Some(format!("{}[{attr}=\"{}\"]", el.tag_name(), escape_attr(value)));
        }
    }
    css_locator_for(doc, el)
}

fn radio_label(doc: &PageDocument, radio: ElementRef<'_>) -> String {
    if let Some(id) = radio.attribute("id") {
        if let Ok(labels) = doc.select(&format!("label[for=\"{}\"]", escape_attr(id))) {
            if let Some(label) = labels.first() {
                return label.text_content();
            }
        }
    }
    let mut parent = radio.parent_node();
    while let Some(p) = parent {
        if p.tag_name() == "label" {
            return p.text_content();
        }
        parent = p.parent_node();
    }
    radio.attribute("value").unwrap_or_default().to_string()
}

fn escape_attr(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantAction {
    Select {
        css: String,
        value: String,
        label: String,
    },
    Click {
        css: String,
        label: String,
    },
    /// Wait for the price region to update.
    Settle,
}

impl VariantAction {
    fn for_control(control: &VariantControl) -> Self {
        match control.kind {
            ControlKind::Dropdown => VariantAction::Select {
                css: control.css.clone(),
                value: control.value.clone(),
                label: control.label.clone(),
            },
            ControlKind::Radio | ControlKind::Button => VariantAction::Click {
                css: control.css.clone(),
                label: control.label.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantPlan {
    pub actions: Vec<VariantAction>,
    /// `None` when the item names no variant; `Some(false)` when it does but
    /// no control matched.
    pub primary_matched: Option<bool>,
}

impl VariantPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Orders the interactions that surface the requested variant's price.
///
/// 1. The control matching the hint, or the primary token, searched by
///    control kind in `priority` order.
/// 2. A settle wait.
/// 3. If a package control group exists, its base option (never a named
///    kit/bundle/combo unless the name asks for one), then a settle wait.
#[must_use]
pub fn plan(
    signature: &VariantSignature,
    controls: &[VariantControl],
    priority: &[ControlKind],
    hint: Option<&ResolutionHint>,
) -> VariantPlan {
    let hint = hint.filter(|h| h.control_kind().is_some());
    let mut actions = Vec::new();
    let mut primary_group = None;

    let hinted = hint.and_then(|h| {
        let kind = h.control_kind()?;
        let wanted = h.option_match()?.to_lowercase();
        controls
            .iter()
            .find(|c| c.kind == kind && c.label.to_lowercase().contains(&wanted))
    });

    let primary_control = hinted.or_else(|| {
        signature.primary.as_ref()?;
        priority.iter().find_map(|kind| {
            controls
                .iter()
                .find(|c| c.kind == *kind && signature.primary_matches(&c.label))
        })
    });

    let primary_matched = if signature.primary.is_some() || hint.is_some() {
        Some(primary_control.is_some())
    } else {
        None
    };

    if let Some(control) = primary_control {
        actions.push(VariantAction::for_control(control));
        actions.push(VariantAction::Settle);
        primary_group = Some(control.group.clone());
    }

    if let Some(control) = package_choice(signature, controls, primary_group.as_deref()) {
        actions.push(VariantAction::for_control(control));
        actions.push(VariantAction::Settle);
    }

    VariantPlan {
        actions,
        primary_matched,
    }
}

fn package_choice<'c>(
    signature: &VariantSignature,
    controls: &'c [VariantControl],
    skip_group: Option<&str>,
) -> Option<&'c VariantControl> {
    let mut groups: Vec<&str> = controls.iter().map(|c| c.group.as_str()).collect();
    groups.dedup();
    let package_group = groups.into_iter().find(|g| {
        Some(*g) != skip_group
            && controls
                .iter()
                .any(|c| c.group == *g && has_package_word(&c.label))
    })?;
    let options: Vec<&VariantControl> = controls
        .iter()
        .filter(|c| c.group == package_group)
        .collect();

    if let Some(requested) = &signature.package {
        return options
            .into_iter()
            .find(|c| contains_word(&c.label.to_lowercase(), requested));
    }

    if let Some(base) = options.iter().find(|c| has_base_word(&c.label)) {
        return Some(*base);
    }

    let parser = NumericPriceParser::default();
    let plain: Vec<&VariantControl> = options
        .into_iter()
        .filter(|c| !has_package_word(&c.label))
        .collect();
    plain
        .iter()
        .min_by_key(|c| parser.parse_amount(&c.label).unwrap_or(Decimal::ZERO))
        .copied()
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct VariantResolver {
    pub settle_timeout: Duration,
    pub settle_poll: Duration,
    pub action_attempts: u32,
}

impl Default for VariantResolver {
    fn default() -> Self {
        Self {
            settle_timeout: Duration::from_millis(3000),
            settle_poll: Duration::from_millis(150),
            action_attempts: 2,
        }
    }
}

impl VariantResolver {
    /// Runs `plan` against `session`.
    ///
    /// `probe` reads the currently displayed price from serialized HTML; a
    /// settle wait ends as soon as it changes, or after the settle timeout.
    pub async fn execute<P>(
        &self,
        session: &mut dyn BrowserSession,
        plan: &VariantPlan,
        probe: P,
    ) -> VariantResolution
    where
        P: Fn(&str) -> Option<Decimal> + Send + Sync,
    {
        if plan.is_empty() {
            return match plan.primary_matched {
                Some(false) => VariantResolution::Unresolved,
                _ => VariantResolution::NotNeeded,
            };
        }

        let mut before = match session.content().await {
            Ok(html) => probe(&html),
            Err(_) => None,
        };
        let mut all_ok = true;

        for action in &plan.actions {
            match action {
                VariantAction::Settle => {
                    before = self.settle(session, before, &probe).await;
                }
                VariantAction::Select { css, value, label } => {
                    if !self.act(session, css, Some(value), label).await {
                        all_ok = false;
                    }
                }
                VariantAction::Click { css, label } => {
                    if !self.act(session, css, None, label).await {
                        all_ok = false;
                    }
                }
            }
        }

        if all_ok && plan.primary_matched != Some(false) {
            VariantResolution::Resolved
        } else {
            VariantResolution::Unresolved
        }
    }

    async fn act(
        &self,
        session: &mut dyn BrowserSession,
        css: &str,
        value: Option<&str>,
        label: &str,
    ) -> bool {
        for attempt in 1..=self.action_attempts.max(1) {
            let result = match value {
                Some(v) => session.select_option(css, v).await,
                None => session.click(css).await,
            };
            match result {
                Ok(()) => {
                    tracing::debug!(css, label, attempt, "variant control applied");
                    return true;
                }
                Err(e) => {
                    tracing::warn!(css, label, attempt, error = %e, "variant interaction failed");
                    tokio::time::sleep(self.settle_poll).await;
                }
            }
        }
        false
    }

    async fn settle<P>(
        &self,
        session: &mut dyn BrowserSession,
        before: Option<Decimal>,
        probe: &P,
    ) -> Option<Decimal>
    where
        P: Fn(&str) -> Option<Decimal> + Send + Sync,
    {
        let started = Instant::now();
        let mut latest = before;
        while started.elapsed() < self.settle_timeout {
            tokio::time::sleep(self.settle_poll).await;
            if let Ok(html) = session.content().await {
                latest = probe(&html);
                if latest.is_some() && latest != before {
                    break;
                }
            }
        }
        latest
    }
}

#[cfg(test)]
#[path = "variant_test.rs"]
mod tests;
