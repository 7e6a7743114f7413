pub mod aggregator;
pub mod auth;
pub mod config;
pub mod price;
pub mod scraper;
pub mod session;
pub mod types;

pub use aggregator::{SpendAggregator, SpendSummary, YearSpend};
pub use config::Config;
pub use scraper::{PageScraper, ScraperError};
pub use types::Site;
