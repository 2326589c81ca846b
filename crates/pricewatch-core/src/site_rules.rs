//! Typed per-domain and per-item extraction rules.
//!
//! Rules live in `config/site_rules.yaml` and are validated once at load time
//! so the pipeline never has to read them defensively. A rule stored in the
//! database for a domain replaces the file rule for that domain (see
//! [`SiteRuleSet::effective`]).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Inclusive price bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PriceRange {
    pub min: Decimal,
    pub max: Decimal,
}

impl PriceRange {
    #[must_use]
    pub fn new(min: Decimal, max: Decimal) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn contains(&self, amount: Decimal) -> bool {
        amount >= self.min && amount <= self.max
    }

    fn validate(&self, context: &str) -> Result<(), ConfigError> {
        if self.min < Decimal::ZERO {
            return Err(ConfigError::Validation(format!(
                "{context}: price range min {} is negative",
                self.min
            )));
        }
        if self.min >= self.max {
            return Err(ConfigError::Validation(format!(
                "{context}: price range min {} must be below max {}",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Page control families the variant resolver knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Dropdown,
    Radio,
    Button,
}

/// Default control priority: dropdown option, then radio input, then button.
pub const DEFAULT_CONTROL_PRIORITY: [ControlKind; 3] =
    [ControlKind::Dropdown, ControlKind::Radio, ControlKind::Button];

/// How to surface an item's variant price on its page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionHint {
    /// Pick the `<select>` option whose text contains `option_match`.
    Dropdown { option_match: String },
    /// Check the radio input whose label contains `option_match`.
    Radio { option_match: String },
    /// Click the button/swatch whose text contains `option_match`.
    Button { option_match: String },
    /// Read the price from a pricing table: the row containing `row_match`
    /// (or the variant token), 1-based `column`.
    TableColumn {
        column: usize,
        #[serde(default)]
        row_match: Option<String>,
    },
}

impl ResolutionHint {
    /// The control family this hint drives, if it drives one at all.
    #[must_use]
    pub fn control_kind(&self) -> Option<ControlKind> {
        match self {
            ResolutionHint::Dropdown { .. } => Some(ControlKind::Dropdown),
            ResolutionHint::Radio { .. } => Some(ControlKind::Radio),
            ResolutionHint::Button { .. } => Some(ControlKind::Button),
            ResolutionHint::TableColumn { .. } => None,
        }
    }

    #[must_use]
    pub fn option_match(&self) -> Option<&str> {
        match self {
            ResolutionHint::Dropdown { option_match }
            | ResolutionHint::Radio { option_match }
            | ResolutionHint::Button { option_match } => Some(option_match),
            ResolutionHint::TableColumn { .. } => None,
        }
    }
}

/// Per-item override inside a [`SiteRule`]. Always wins over the domain rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ItemOverride {
    /// Item id, or (case-insensitive) item display name or name fragment.
    pub item: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub expected_price: Option<Decimal>,
    #[serde(default)]
    pub price_range: Option<PriceRange>,
    #[serde(default)]
    pub resolution: Option<ResolutionHint>,
    #[serde(default)]
    pub price_selectors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteRule {
    pub domain: String,
    /// Selectors tried before the generic price selectors.
    #[serde(default)]
    pub price_selectors: Vec<String>,
    /// Candidates inside elements matching these selectors are dropped.
    #[serde(default)]
    pub avoid_selectors: Vec<String>,
    /// Class/id substrings marking containers to drop (e.g. `"upsell"`).
    #[serde(default)]
    pub avoid_containers: Vec<String>,
    #[serde(default)]
    pub price_range: Option<PriceRange>,
    #[serde(default)]
    pub control_priority: Option<Vec<ControlKind>>,
    /// The static page never carries the price; go straight to rendering.
    #[serde(default)]
    pub requires_render: bool,
    #[serde(default)]
    pub items: Vec<ItemOverride>,
}

impl SiteRule {
    /// Validates one rule in isolation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let domain = normalize_domain(&self.domain);
        if domain.is_empty() {
            return Err(ConfigError::Validation(
                "site rule domain must be non-empty".to_string(),
            ));
        }

        for selector in self
            .price_selectors
            .iter()
            .chain(&self.avoid_selectors)
            .chain(&self.avoid_containers)
        {
            if selector.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "site '{domain}' has an empty selector or container marker"
                )));
            }
        }

        if let Some(range) = &self.price_range {
            range.validate(&format!("site '{domain}'"))?;
        }

        if let Some(priority) = &self.control_priority {
            let unique: HashSet<_> = priority.iter().collect();
            if priority.is_empty() || unique.len() != priority.len() {
                return Err(ConfigError::Validation(format!(
                    "site '{domain}' control_priority must be non-empty without duplicates"
                )));
            }
        }

        let mut seen_items = HashSet::new();
        for item in &self.items {
            let key = item.item.trim().to_lowercase();
            if key.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "site '{domain}' has an item override with an empty item key"
                )));
            }
            if !seen_items.insert(key) {
                return Err(ConfigError::Validation(format!(
                    "site '{domain}' has duplicate item override '{}'",
                    item.item
                )));
            }
            let context = format!("site '{domain}' item '{}'", item.item);
            if let Some(range) = &item.price_range {
                range.validate(&context)?;
                if let Some(expected) = item.expected_price {
                    if !range.contains(expected) {
                        return Err(ConfigError::Validation(format!(
                            "{context}: expected price {expected} lies outside its price range"
                        )));
                    }
                }
            }
            if let Some(ResolutionHint::TableColumn { column, .. }) = &item.resolution {
                if *column == 0 {
                    return Err(ConfigError::Validation(format!(
                        "{context}: table column is 1-based"
                    )));
                }
            }
            if let Some(option) = item.resolution.as_ref().and_then(ResolutionHint::option_match) {
                if option.trim().is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "{context}: resolution option_match must be non-empty"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Finds the override for an item. An id match wins, then an exact name
    /// match, then the longest name fragment contained in the display name.
    #[must_use]
    pub fn item_override(&self, item_id: &str, item_name: &str) -> Option<&ItemOverride> {
        let name = item_name.trim().to_lowercase();
        if let Some(by_id) = self.items.iter().find(|o| o.item == item_id) {
            return Some(by_id);
        }
        if let Some(exact) = self
            .items
            .iter()
            .find(|o| o.item.trim().to_lowercase() == name)
        {
            return Some(exact);
        }
        self.items
            .iter()
            .filter(|o| name.contains(&o.item.trim().to_lowercase()))
            .max_by_key(|o| o.item.trim().len())
    }
}

/// On-disk shape of `site_rules.yaml`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteRulesFile {
    #[serde(default)]
    pub default_range: Option<PriceRange>,
    #[serde(default)]
    pub categories: BTreeMap<String, PriceRange>,
    #[serde(default)]
    pub sites: Vec<SiteRule>,
}

/// Rules merged for one request: item override, then domain rule, then
/// category, then file default.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveRules {
    pub domain: String,
    pub price_selectors: Vec<String>,
    pub avoid_selectors: Vec<String>,
    pub avoid_containers: Vec<String>,
    /// Site, category, or default bounds. The validator rejects outside them.
    pub hard_range: Option<PriceRange>,
    /// Item-level expected range. Only a soft guard for candidate selection.
    pub expected_range: Option<PriceRange>,
    pub expected_price: Option<Decimal>,
    pub variant_keywords: Vec<String>,
    pub resolution: Option<ResolutionHint>,
    pub control_priority: Vec<ControlKind>,
    pub requires_render: bool,
}

impl EffectiveRules {
    /// Rules for a domain nobody configured.
    #[must_use]
    pub fn bare(domain: &str) -> Self {
        Self {
            domain: normalize_domain(domain),
            price_selectors: Vec::new(),
            avoid_selectors: Vec::new(),
            avoid_containers: Vec::new(),
            hard_range: None,
            expected_range: None,
            expected_price: None,
            variant_keywords: Vec::new(),
            resolution: None,
            control_priority: DEFAULT_CONTROL_PRIORITY.to_vec(),
            requires_render: false,
        }
    }

    /// Range used to filter candidates: the item's own range when present.
    #[must_use]
    pub fn candidate_range(&self) -> Option<PriceRange> {
        self.expected_range.or(self.hard_range)
    }
}

/// All configured rules, keyed by normalized domain.
#[derive(Debug, Clone, Default)]
pub struct SiteRuleSet {
    default_range: Option<PriceRange>,
    categories: BTreeMap<String, PriceRange>,
    sites: HashMap<String, SiteRule>,
}

impl SiteRuleSet {
    /// Builds and validates a rule set from its file shape.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any rule is invalid or two rules
    /// normalize to the same domain.
    pub fn from_file(file: SiteRulesFile) -> Result<Self, ConfigError> {
        if let Some(range) = &file.default_range {
            range.validate("default_range")?;
        }
        for (name, range) in &file.categories {
            range.validate(&format!("category '{name}'"))?;
        }

        let mut sites = HashMap::new();
        for rule in file.sites {
            rule.validate()?;
            let domain = normalize_domain(&rule.domain);
            if sites.insert(domain.clone(), rule).is_some() {
                return Err(ConfigError::Validation(format!(
                    "duplicate site rule for domain '{domain}'"
                )));
            }
        }

        let categories = file
            .categories
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();

        Ok(Self {
            default_range: file.default_range,
            categories,
            sites,
        })
    }

    /// Parses and validates YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::SiteRulesParse`] or [`ConfigError::Validation`].
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let file: SiteRulesFile = serde_yaml::from_str(yaml).map_err(ConfigError::SiteRulesParse)?;
        Self::from_file(file)
    }

    #[must_use]
    pub fn site(&self, domain: &str) -> Option<&SiteRule> {
        self.sites.get(&normalize_domain(domain))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Merges the rules that apply to one request.
    ///
    /// `stored` is a rule loaded from the database for this domain; when
    /// present it replaces the file rule wholesale.
    #[must_use]
    pub fn effective(
        &self,
        domain: &str,
        item_id: &str,
        item_name: &str,
        category: Option<&str>,
        stored: Option<&SiteRule>,
    ) -> EffectiveRules {
        let mut rules = EffectiveRules::bare(domain);
        let category_range = category.and_then(|c| self.categories.get(&c.to_lowercase()).copied());
        rules.hard_range = category_range.or(self.default_range);

        let Some(site) = stored.or_else(|| self.site(domain)) else {
            return rules;
        };

        rules.price_selectors.clone_from(&site.price_selectors);
        rules.avoid_selectors.clone_from(&site.avoid_selectors);
        rules.avoid_containers.clone_from(&site.avoid_containers);
        rules.requires_render = site.requires_render;
        if let Some(range) = site.price_range {
            rules.hard_range = Some(range);
        }
        if let Some(priority) = &site.control_priority {
            rules.control_priority.clone_from(priority);
        }

        if let Some(item) = site.item_override(item_id, item_name) {
            let mut selectors = item.price_selectors.clone();
            selectors.extend(rules.price_selectors.drain(..));
            rules.price_selectors = selectors;
            rules.expected_range = item.price_range;
            rules.expected_price = item.expected_price;
            rules.variant_keywords.clone_from(&item.keywords);
            rules.resolution.clone_from(&item.resolution);
        }

        rules
    }
}

/// Load and validate site rules from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_site_rules(path: &Path) -> Result<SiteRuleSet, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::SiteRulesIo {
        path: path.display().to_string(),
        source: e,
    })?;
    SiteRuleSet::from_yaml_str(&content)
}

/// Lowercases, strips scheme, `www.`, port and path.
///
/// `"https://www.Example.com:8443/p/1"` → `"example.com"`.
#[must_use]
pub fn normalize_domain(input: &str) -> String {
    let trimmed = input.trim().to_lowercase();
    let without_scheme = trimmed
        .split_once("://")
        .map_or(trimmed.as_str(), |(_, rest)| rest);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or("");
    let host = host.rsplit_once('@').map_or(host, |(_, h)| h);
    let host = host.split(':').next().unwrap_or("");
    host.strip_prefix("www.").unwrap_or(host).to_string()
}

#[cfg(test)]
#[path = "site_rules_test.rs"]
mod tests;
