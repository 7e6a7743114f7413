use crate::auth::{AuthError, Credentials, ensure_authenticated};
use crate::config::ConfigError;
use crate::session::{HttpSession, Page, SessionError};

use reqwest::Url;
use scraper::{Html, Selector};
use std::collections::HashSet;

/// Elements carrying a line-item price on the order history. Only an exact
/// `class="price"` counts; summary boxes add further class tokens.
pub const PRICE_SELECTOR: &str = r#"[class="price"]"#;

#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    #[error("HTTP session error: {0}")]
    SessionError(#[from] SessionError),
    #[error("Authentication failed: {0}")]
    AuthError(#[from] AuthError),
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Total overflowed while adding the orders of {0}")]
    TotalOverflow(i32),
}

/// Raw prices collected for one year, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YearPrices {
    pub prices: Vec<String>,
    pub pages: usize,
}

enum ScrapeState {
    Fetching(String),
    Extracting(Page),
    CheckingNext(Page),
    Following(Url),
    Done,
}

/// Collects the direct text of every price node, skipping empty ones.
pub fn extract_prices(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let price_selector = Selector::parse(PRICE_SELECTOR).unwrap();

    document
        .select(&price_selector)
        .map(|node| {
            node.children()
                .filter_map(|child| child.value().as_text())
                .map(|text| &**text)
                .collect::<String>()
                .trim()
                .to_string()
        })
        .filter(|price| !price.is_empty())
        .collect()
}

/// Walks the paginated order history of a year, one page after another.
#[derive(Debug)]
pub struct PageScraper {
    session: HttpSession,
}

impl PageScraper {
    pub fn new(session: HttpSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &HttpSession {
        &self.session
    }

    /// Starts at `url` and keeps following the link labelled `next_link_text`
    /// until a page without one is reached.
    pub async fn scrape_year(
        &mut self,
        url: &str,
        next_link_text: &str,
        credentials: &Credentials<'_>,
    ) -> Result<YearPrices, ScraperError> {
        let mut result = YearPrices::default();
        let mut visited: HashSet<Url> = HashSet::new();
        let mut state = ScrapeState::Fetching(url.to_string());

        loop {
            state = match state {
                ScrapeState::Fetching(url) => {
                    let page = self.session.fetch(&url).await?;
                    let page = ensure_authenticated(&mut self.session, page, credentials).await?;
                    visited.insert(page.url().clone());
                    ScrapeState::Extracting(page)
                }
                ScrapeState::Extracting(page) => {
                    let prices = extract_prices(page.html());
                    if result.pages == 0 && prices.is_empty() {
                        log::warn!(
                            "Error retrieving orders or no orders available at {}",
                            page.url()
                        );
                    }
                    log::debug!(
                        "Found {} prices on page {} ({})",
                        prices.len(),
                        result.pages + 1,
                        page.url()
                    );
                    result.pages += 1;
                    result.prices.extend(prices);
                    ScrapeState::CheckingNext(page)
                }
                ScrapeState::CheckingNext(page) => match page.link_target(next_link_text)? {
                    Some(target) if visited.contains(&target) => {
                        log::warn!("Next link points back to {}, stopping", target);
                        ScrapeState::Done
                    }
                    Some(target) => ScrapeState::Following(target),
                    None => ScrapeState::Done,
                },
                ScrapeState::Following(target) => {
                    visited.insert(target.clone());
                    let page = self.session.fetch(target.as_str()).await?;
                    let page = ensure_authenticated(&mut self.session, page, credentials).await?;
                    if !visited.insert(page.url().clone()) && page.url() != &target {
                        log::warn!("Redirected to already visited {}, stopping", page.url());
                        ScrapeState::Done
                    } else {
                        ScrapeState::Extracting(page)
                    }
                }
                ScrapeState::Done => return Ok(result),
            };
        }
    }
}
