use crate::types::{LocaleRules, Site};

use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::LazyLock;

static DECIMAL_GRAMMAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+(\.\d+)?$").unwrap());

#[derive(Debug, thiserror::Error)]
#[error("Could not parse price '{raw}' on {site}: {reason}")]
pub struct PriceParseError {
    pub raw: String,
    pub site: Site,
    pub reason: String,
}

fn is_space(c: char) -> bool {
    c.is_whitespace() || c == '\u{a0}' || c == '\u{202f}'
}

fn strip_currency<'a>(mut text: &'a str, rules: &LocaleRules) -> &'a str {
    loop {
        let before = text.len();
        for symbol in rules.currency_symbols {
            text = text.strip_prefix(symbol).unwrap_or(text);
            text = text.strip_suffix(symbol).unwrap_or(text);
        }
        text = text.trim_matches(is_space);
        if text.len() == before {
            return text;
        }
    }
}

/// Converts a price as printed on `site` into an exact decimal.
///
/// The currency symbol and any whitespace are dropped, thousands separators
/// removed and the decimal separator canonicalized to `.` before parsing.
pub fn normalize(raw: &str, site: Site) -> Result<Decimal, PriceParseError> {
    let rules = site.rules();
    let fail = |reason: String| PriceParseError {
        raw: raw.to_string(),
        site,
        reason,
    };

    let stripped = strip_currency(raw.trim_matches(is_space), rules);
    let canonical: String = stripped
        .chars()
        .filter(|c| *c != rules.thousands_separator && !is_space(*c))
        .map(|c| if c == rules.decimal_separator { '.' } else { c })
        .collect();

    if !DECIMAL_GRAMMAR.is_match(&canonical) {
        return Err(fail(format!("'{canonical}' is not a decimal number")));
    }

    Decimal::from_str(canonical.trim_start_matches('+')).map_err(|e| fail(e.to_string()))
}
