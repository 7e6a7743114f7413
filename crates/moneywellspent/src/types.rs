use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
#[error(
    "Invalid site '{0}'. Available sites: [amazon.]de [amazon.]com [amazon.]co.uk [amazon.]fr"
)]
pub struct SiteParseError(String);

/// The Amazon storefronts whose order history can be summed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Site {
    #[serde(rename = "de")]
    De,
    #[serde(rename = "com")]
    Com,
    #[serde(rename = "co.uk")]
    CoUk,
    #[serde(rename = "fr")]
    Fr,
}

/// Number formatting and navigation conventions of a storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocaleRules {
    pub domain: &'static str,
    pub decimal_separator: char,
    pub thousands_separator: char,
    /// Symbols and ISO codes that may surround a price.
    pub currency_symbols: &'static [&'static str],
    /// Text of the pagination link, without the trailing `»`.
    pub next_link_label: &'static str,
}

const DE_RULES: LocaleRules = LocaleRules {
    domain: "de",
    decimal_separator: ',',
    thousands_separator: '.',
    currency_symbols: &["EUR", "€"],
    next_link_label: "Weiter",
};

const COM_RULES: LocaleRules = LocaleRules {
    domain: "com",
    decimal_separator: '.',
    thousands_separator: ',',
    currency_symbols: &["USD", "$"],
    next_link_label: "Next",
};

const CO_UK_RULES: LocaleRules = LocaleRules {
    domain: "co.uk",
    decimal_separator: '.',
    thousands_separator: ',',
    currency_symbols: &["GBP", "£"],
    next_link_label: "Next",
};

const FR_RULES: LocaleRules = LocaleRules {
    domain: "fr",
    decimal_separator: ',',
    thousands_separator: '.',
    currency_symbols: &["EUR", "€"],
    next_link_label: "Suivant",
};

impl Site {
    pub const ALL: [Site; 4] = [Site::De, Site::Com, Site::CoUk, Site::Fr];

    pub fn rules(&self) -> &'static LocaleRules {
        match self {
            Site::De => &DE_RULES,
            Site::Com => &COM_RULES,
            Site::CoUk => &CO_UK_RULES,
            Site::Fr => &FR_RULES,
        }
    }

    pub fn domain(&self) -> &'static str {
        self.rules().domain
    }

    /// Full visible text of the "next page" link, e.g. `Weiter »`.
    pub fn next_link_text(&self) -> String {
        format!("{} »", self.rules().next_link_label)
    }

    pub fn origin(&self) -> String {
        format!("https://www.amazon.{}", self.domain())
    }
}

impl FromStr for Site {
    type Err = SiteParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "amazon.de" | "amazn.de" | "de" => Ok(Site::De),
            "amazon.com" | "amazn.com" | "com" | "us" => Ok(Site::Com),
            "amazon.co.uk" | "amazn.co.uk" | "co.uk" | "uk" => Ok(Site::CoUk),
            "amazon.fr" | "amazn.fr" | "fr" => Ok(Site::Fr),
            _ => Err(SiteParseError(s.to_string())),
        }
    }
}

impl Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "amazon.{}", self.domain())
    }
}
