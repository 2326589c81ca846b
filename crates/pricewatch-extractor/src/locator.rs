//! String-serialisable page locations.
//!
//! A locator is what the selector cache stores and what an extraction result
//! reports. Serialised forms:
//!
//! | Form | Meaning |
//! |---|---|
//! | `css:<selector>` | first non-avoided element matching the selector |
//! | `jsonld:<field>` / `jsonld:<field>[<token>]` | JSON-LD offer field, optionally the offer matching a variant token |
//! | `meta:<property>` | `<meta property=… content=…>` |
//! | `table:<column>:<token>` | pricing-table cell in the row containing the token |
//! | `regex:<hint>` | free-text match; not replayable |
//! | `ai:<tier>` | model answer with no page location; not replayable |

use std::fmt;
use std::str::FromStr;

use pricewatch_core::is_denylisted_locator;

use crate::error::ExtractError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    JsonLd {
        field: String,
        token: Option<String>,
    },
    Meta(String),
    TableColumn {
        column: usize,
        token: String,
    },
    Regex(String),
    Ai(String),
}

impl Locator {
    /// Whether replaying this locator on a later visit means anything.
    #[must_use]
    pub fn is_replayable(&self) -> bool {
        !matches!(self, Locator::Regex(_) | Locator::Ai(_))
    }

    /// Replayable and free of bundle/kit markers.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.is_replayable() && !is_denylisted_locator(&self.to_string())
    }

    /// Bound to one variant's row or offer, so it only makes sense for the
    /// item it was learned on.
    #[must_use]
    pub fn is_item_specific(&self) -> bool {
        matches!(
            self,
            Locator::TableColumn { .. } | Locator::JsonLd { token: Some(_), .. }
        )
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(css) => write!(f, "css:{css}"),
            Locator::JsonLd { field, token: None } => write!(f, "jsonld:{field}"),
            Locator::JsonLd {
                field,
                token: Some(token),
            } => write!(f, "jsonld:{field}[{token}]"),
            Locator::Meta(property) => write!(f, "meta:{property}"),
            Locator::TableColumn { column, token } => write!(f, "table:{column}:{token}"),
            Locator::Regex(hint) => write!(f, "regex:{hint}"),
            Locator::Ai(tier) => write!(f, "ai:{tier}"),
        }
    }
}

impl FromStr for Locator {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ExtractError::InvalidLocator(s.to_string());
        let (kind, rest) = s.split_once(':').ok_or_else(invalid)?;
        if rest.trim().is_empty() {
            return Err(invalid());
        }
        match kind {
            "css" => Ok(Locator::Css(rest.to_string())),
            "jsonld" => match rest.split_once('[') {
                Some((field, token)) => {
                    let token = token.strip_suffix(']').ok_or_else(invalid)?;
                    Ok(Locator::JsonLd {
                        field: field.to_string(),
                        token: Some(token.to_string()),
                    })
                }
                None => Ok(Locator::JsonLd {
                    field: rest.to_string(),
                    token: None,
                }),
            },
            "meta" => Ok(Locator::Meta(rest.to_string())),
            "table" => {
                let (column, token) = rest.split_once(':').ok_or_else(invalid)?;
                let column: usize = column.parse().map_err(|_| invalid())?;
                if column == 0 || token.is_empty() {
                    return Err(invalid());
                }
                Ok(Locator::TableColumn {
                    column,
                    token: token.to_string(),
                })
            }
            "regex" => Ok(Locator::Regex(rest.to_string())),
            "ai" => Ok(Locator::Ai(rest.to_string())),
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_agree() {
        for raw in [
            "css:.product-main .price",
            "jsonld:offers.price",
            "jsonld:offers.price[60W]",
            "meta:product:price:amount",
            "table:3:40W",
            "regex:text#4",
            "ai:ai_partial_content",
        ] {
            let parsed: Locator = raw.parse().unwrap();
            assert_eq!(parsed.to_string(), raw);
        }
    }

    #[test]
    fn meta_property_keeps_its_colons() {
        let parsed: Locator = "meta:og:price:amount".parse().unwrap();
        assert_eq!(parsed, Locator::Meta("og:price:amount".to_string()));
    }

    #[test]
    fn rejects_malformed_locators() {
        assert!("price".parse::<Locator>().is_err());
        assert!("css:".parse::<Locator>().is_err());
        assert!("table:0:60W".parse::<Locator>().is_err());
        assert!("table:x:60W".parse::<Locator>().is_err());
        assert!("xpath://span".parse::<Locator>().is_err());
    }

    #[test]
    fn free_text_and_model_locators_are_not_replayable() {
        assert!(!Locator::Regex("text#1".into()).is_replayable());
        assert!(!Locator::Ai("ai_full_content".into()).is_cacheable());
        assert!(Locator::Css(".price".into()).is_cacheable());
    }

    #[test]
    fn denylisted_locators_are_not_cacheable() {
        assert!(!Locator::Css(".bundle-price".into()).is_cacheable());
        assert!(!Locator::Css("#Kit-Offer .price".into()).is_cacheable());
        assert!(!Locator::TableColumn {
            column: 2,
            token: "combo".into()
        }
        .is_cacheable());
    }
}
