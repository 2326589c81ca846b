//! Turns heterogeneous price text into a decimal amount and a currency guess.
//!
//! Handles `"$1,849.00"`, `"1.849,00 €"`, `"US$ 2599"`, cents-encoded digit
//! runs such as `"259900"`, and text carrying several amounts
//! (`"$8,888 $6,666 Save:$2,222"`).

use std::str::FromStr;
use std::sync::LazyLock;

use pricewatch_core::PriceRange;
use regex::Regex;
use rust_decimal::Decimal;

static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        (?P<pre>US\$|CA\$|C\$|AU\$|A\$|\$|€|£|¥|\b(?:USD|EUR|GBP|CAD|AUD|JPY)\b)?
        [\s\x{a0}]?
        (?P<num>\d{1,3}(?:[,.\x{a0}\x{202f}]\d{3})+(?:[.,]\d{1,2})?|\d+(?:[.,]\d{1,2})?)
        (?:[\s\x{a0}]?(?P<post>€|£|\b(?:USD|EUR|GBP|CAD|AUD)\b))?
        ",
    )
    .expect("valid regex")
});

static RANGE_OR_SAVINGS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:save|savings?|you save|off|was|now|from|starting at|as low as|between)\b|\d\s*[-–]\s*\D?\d")
        .expect("valid regex")
});

static SAVINGS_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:save|savings|you save|discount|rebate)\W{0,3}$").expect("valid regex")
});

static SAVINGS_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:%\s*)?off\b").expect("valid regex"));

/// Above this a bare digit run is assumed to be cents-encoded.
const DEFAULT_SANE_MAX: i64 = 100_000;

/// With a known range, a digit run must exceed `max` by this factor before
/// it is read as cents.
const DEFAULT_CENTS_MARGIN: i64 = 10;

/// One amount found in a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAmount {
    pub amount: Decimal,
    pub currency: Option<String>,
    /// `true` when an explicit currency symbol or code was attached.
    pub has_currency: bool,
    /// A "you save" / "N off" amount; never a price.
    pub savings: bool,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct NumericPriceParser {
    sane_max: Decimal,
    cents_margin: Decimal,
}

impl Default for NumericPriceParser {
    fn default() -> Self {
        Self {
            sane_max: Decimal::from(DEFAULT_SANE_MAX),
            cents_margin: Decimal::from(DEFAULT_CENTS_MARGIN),
        }
    }
}

impl NumericPriceParser {
    #[must_use]
    pub fn with_sane_max(sane_max: Decimal) -> Self {
        Self {
            sane_max,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_cents_margin(mut self, margin: Decimal) -> Self {
        self.cents_margin = margin;
        self
    }

    /// Whether a bare digit run reads as cents: far above the range with
    /// the decoded value inside it, or past the sane maximum when no range
    /// is known.
    fn is_cents_encoded(&self, amount: Decimal, range: Option<PriceRange>) -> bool {
        match range {
            Some(r) => amount > r.max * self.cents_margin && r.contains(amount / Decimal::ONE_HUNDRED),
            None => amount > self.sane_max,
        }
    }

    /// Every amount in `text`, in order of appearance.
    ///
    /// With `require_currency`, bare numbers (quantities, model numbers) are
    /// skipped.
    #[must_use]
    pub fn find_amounts(
        &self,
        text: &str,
        require_currency: bool,
        range: Option<PriceRange>,
    ) -> Vec<ParsedAmount> {
        let mut found = Vec::new();
        for caps in AMOUNT_RE.captures_iter(text) {
            let Some(num) = caps.name("num") else {
                continue;
            };
            let whole = caps.get(0).map_or(num.range(), |m| m.range());

            // A trailing digit means the pattern split a longer malformed run.
            if text[num.end()..].starts_with(|c: char| c.is_ascii_digit()) {
                continue;
            }
            // So does a leading one (e.g. "A1849" model codes are fine, "x12.345" is not).
            if text[..num.start()].ends_with(|c: char| c.is_ascii_digit()) {
                continue;
            }

            let symbol = caps.name("pre").or_else(|| caps.name("post")).map(|m| m.as_str());
            let currency = symbol.and_then(currency_for_symbol);
            if require_currency && currency.is_none() {
                continue;
            }

            let Some(mut amount) = parse_number(num.as_str(), currency.as_deref()) else {
                continue;
            };
            if is_bare_digit_run(num.as_str())
                && num.as_str().len() > 4
                && self.is_cents_encoded(amount, range)
            {
                amount /= Decimal::ONE_HUNDRED;
            }

            let before = &text[..whole.start];
            let before = tail_chars(before, 24);
            let after = &text[whole.end..];
            let savings = SAVINGS_PREFIX_RE.is_match(before) || SAVINGS_SUFFIX_RE.is_match(after);

            found.push(ParsedAmount {
                amount,
                has_currency: currency.is_some(),
                currency,
                savings,
                start: whole.start,
                end: whole.end,
            });
        }
        found
    }

    /// The single price `text` most likely states.
    ///
    /// Savings amounts are dropped. When currency-marked amounts exist, bare
    /// numbers are ignored. With several amounts the first wins, unless the
    /// text carries a range or savings keyword, in which case the lowest wins.
    #[must_use]
    pub fn parse(&self, text: &str, range: Option<PriceRange>) -> Option<ParsedAmount> {
        let all = self.find_amounts(text, false, range);
        let mut amounts: Vec<ParsedAmount> = all.into_iter().filter(|a| !a.savings).collect();
        if amounts.iter().any(|a| a.has_currency) {
            amounts.retain(|a| a.has_currency);
        }
        amounts.retain(|a| a.amount > Decimal::ZERO);
        if amounts.len() > 1 && RANGE_OR_SAVINGS_RE.is_match(text) {
            return amounts.into_iter().min_by(|a, b| a.amount.cmp(&b.amount));
        }
        amounts.into_iter().next()
    }

    /// Convenience wrapper returning only the amount.
    #[must_use]
    pub fn parse_amount(&self, text: &str) -> Option<Decimal> {
        self.parse(text, None).map(|p| p.amount)
    }
}

/// Normalizes separators and parses the digits of one amount.
///
/// - Both `,` and `.` present: whichever appears last is the decimal mark.
/// - Only `,`: a single comma followed by one or two digits is decimal,
///   otherwise commas group thousands.
/// - Only `.`: several dots group thousands; a single dot is decimal, except
///   a euro amount with exactly three digits after it (`"€1.299"`).
#[must_use]
pub fn parse_number(raw: &str, currency: Option<&str>) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\u{202f}')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let last_comma = cleaned.rfind(',');
    let last_dot = cleaned.rfind('.');
    let normalized = match (last_comma, last_dot) {
        (Some(c), Some(d)) => {
            if c > d {
                cleaned.replace('.', "").replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
        (Some(c), None) => {
            let decimals = cleaned.len() - c - 1;
            if cleaned.matches(',').count() == 1 && (1..=2).contains(&decimals) {
                cleaned.replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
        (None, Some(d)) => {
            let decimals = cleaned.len() - d - 1;
            let euro_grouping = currency == Some("EUR") && decimals == 3;
            if cleaned.matches('.').count() > 1 || euro_grouping {
                cleaned.replace('.', "")
            } else {
                cleaned
            }
        }
        (None, None) => cleaned,
    };

    Decimal::from_str(&normalized).ok()
}

/// ISO code for a currency symbol or code.
#[must_use]
pub fn currency_for_symbol(symbol: &str) -> Option<String> {
    let code = match symbol.trim().to_uppercase().as_str() {
        "$" | "US$" | "USD" => "USD",
        "C$" | "CA$" | "CAD" => "CAD",
        "A$" | "AU$" | "AUD" => "AUD",
        "€" | "EUR" => "EUR",
        "£" | "GBP" => "GBP",
        "¥" | "JPY" => "JPY",
        _ => return None,
    };
    Some(code.to_string())
}

fn is_bare_digit_run(num: &str) -> bool {
    num.chars().all(|c| c.is_ascii_digit())
}

fn tail_chars(s: &str, n: usize) -> &str {
    match s.char_indices().rev().nth(n.saturating_sub(1)) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

#[cfg(test)]
#[path = "parse_test.rs"]
mod tests;
