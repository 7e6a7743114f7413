use crate::config::Config;
use crate::price::normalize;
use crate::scraper::{PageScraper, ScraperError};
use crate::session::{HttpSession, SessionError, SessionOptions};
use crate::types::Site;

use chrono::Datelike;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::fmt::Display;

pub const ORDER_HISTORY_PATH: &str = "/gp/css/order-history";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearSpend {
    pub year: i32,
    pub pages: usize,
    pub prices: usize,
    /// Prices that could not be parsed and were left out of the subtotal.
    pub skipped: usize,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpendSummary {
    pub site: Site,
    pub years: Vec<YearSpend>,
    /// Truncated to two fractional digits.
    pub total: Decimal,
}

impl Display for SpendSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Total money spent, so far: EUR {}", self.total)
    }
}

/// Cuts `total` down to exactly two fractional digits, never rounding up.
pub fn truncate_total(total: Decimal) -> Decimal {
    let mut truncated = total.round_dp_with_strategy(2, RoundingStrategy::ToZero);
    truncated.rescale(2);
    truncated
}

/// Sums the parseable prices, returning the sum and how many were skipped.
///
/// Negative amounts and amounts that would overflow the sum are skipped
/// like unparseable ones.
pub fn sum_prices(prices: &[String], site: Site) -> (Decimal, usize) {
    let mut sum = Decimal::ZERO;
    let mut skipped = 0;

    for raw in prices {
        let value = match normalize(raw, site) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Skipping price: {}", e);
                skipped += 1;
                continue;
            }
        };

        if value.is_sign_negative() && !value.is_zero() {
            log::warn!("Skipping negative price '{}' on {}", raw, site);
            skipped += 1;
            continue;
        }

        match sum.checked_add(value) {
            Some(next) => sum = next,
            None => {
                log::warn!("Skipping price '{}' on {}: sum would overflow", raw, site);
                skipped += 1;
            }
        }
    }

    (sum, skipped)
}

/// Sums up the order history of every year from the configured start year on.
///
/// A fresh session against the storefront of `config.site` is opened for
/// every run.
#[derive(Debug, Clone, Default)]
pub struct SpendAggregator {
    base_url: Option<String>,
    options: SessionOptions,
}

impl SpendAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Talks to `base_url` instead of the storefront derived from the site.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.to_string());
        self
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    fn open_session(&self, site: Site) -> Result<HttpSession, SessionError> {
        let origin = self.base_url.clone().unwrap_or_else(|| site.origin());
        HttpSession::with_options(&origin, self.options.clone())
    }

    pub fn year_path(year: i32) -> String {
        format!(
            "{}?opt=ab&digitalOrders=1&unifiedOrders=0&orderFilter=year-{}",
            ORDER_HISTORY_PATH, year
        )
    }

    pub async fn run(&self, config: &Config) -> Result<SpendSummary, ScraperError> {
        self.run_until(config, chrono::Local::now().year()).await
    }

    /// Like [`Self::run`], with `last_year` standing in for the current year.
    pub async fn run_until(
        &self,
        config: &Config,
        last_year: i32,
    ) -> Result<SpendSummary, ScraperError> {
        config.validate(last_year)?;

        let mut scraper = PageScraper::new(self.open_session(config.site)?);

        let credentials = config.credentials();
        let next_link_text = config.site.next_link_text();
        let mut total = Decimal::ZERO;
        let mut years = Vec::new();

        for year in config.start_year..=last_year {
            log::info!("Retrieving order history for {}", year);

            let scraped = scraper
                .scrape_year(&Self::year_path(year), &next_link_text, &credentials)
                .await
                .inspect_err(|e| log::error!("Failed to retrieve {}: {}", year, e))?;
            let (subtotal, skipped) = sum_prices(&scraped.prices, config.site);
            total = total
                .checked_add(subtotal)
                .ok_or(ScraperError::TotalOverflow(year))?;

            log::info!(
                "{}: {} prices on {} page(s), subtotal {}",
                year,
                scraped.prices.len(),
                scraped.pages,
                subtotal
            );

            years.push(YearSpend {
                year,
                pages: scraped.pages,
                prices: scraped.prices.len(),
                skipped,
                subtotal,
            });
        }

        Ok(SpendSummary {
            site: config.site,
            years,
            total: truncate_total(total),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn strings(prices: &[&str]) -> Vec<String> {
        prices.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_truncate_total() {
        assert_eq!(truncate_total(dec("35.5")).to_string(), "35.50");
        assert_eq!(truncate_total(dec("12.349")).to_string(), "12.34");
        assert_eq!(truncate_total(dec("12.999")).to_string(), "12.99");
        assert_eq!(truncate_total(Decimal::ZERO).to_string(), "0.00");
    }

    #[test]
    fn test_sum_prices_skips_malformed() {
        let prices = strings(&["EUR 10,00", "kostenlos", "EUR 2,50"]);
        let (sum, skipped) = sum_prices(&prices, Site::De);
        assert_eq!(sum, dec("12.50"));
        assert_eq!(skipped, 1);
    }

    #[test]
    fn test_sum_prices_skips_overflowing_price() {
        let prices = strings(&["$79228162514264337593543950335", "$1.00"]);
        let (sum, skipped) = sum_prices(&prices, Site::Com);
        assert_eq!(sum, dec("79228162514264337593543950335"));
        assert_eq!(skipped, 1);
    }

    #[test]
    fn test_sum_prices_skips_negative() {
        let prices = strings(&["EUR 10,00", "EUR -5,00", "EUR -0,00"]);
        let (sum, skipped) = sum_prices(&prices, Site::De);
        assert_eq!(sum, dec("10.00"));
        assert_eq!(skipped, 1);
    }

    #[test]
    fn test_sessions_follow_the_configured_site() {
        let aggregator = SpendAggregator::new();
        let session = aggregator.open_session(Site::De).unwrap();
        assert_eq!(session.origin().as_str(), "https://www.amazon.de/");

        let session = aggregator.open_session(Site::CoUk).unwrap();
        assert_eq!(session.origin().as_str(), "https://www.amazon.co.uk/");

        let local = SpendAggregator::new().with_base_url("http://127.0.0.1:8080");
        let session = local.open_session(Site::De).unwrap();
        assert_eq!(session.origin().as_str(), "http://127.0.0.1:8080/");
    }

    #[test]
    fn test_sum_prices_empty() {
        let (sum, skipped) = sum_prices(&[], Site::Com);
        assert_eq!(sum, Decimal::ZERO);
        assert_eq!(skipped, 0);
    }

    #[test]
    fn test_year_path() {
        assert_eq!(
            SpendAggregator::year_path(2013),
            "/gp/css/order-history?opt=ab&digitalOrders=1&unifiedOrders=0&orderFilter=year-2013"
        );
    }

    #[test]
    fn test_summary_display() {
        let summary = SpendSummary {
            site: Site::Com,
            years: Vec::new(),
            total: truncate_total(dec("35.5")),
        };
        assert_eq!(summary.to_string(), "Total money spent, so far: EUR 35.50");
    }
}
