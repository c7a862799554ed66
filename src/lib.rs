// Listing Scraper Library
//
// Polite, resilient scraping of paginated search listings into structured
// product records: identity rotation, retry with exponential backoff,
// block detection and tolerant field extraction.

pub mod api;
pub mod backoff;
pub mod block;
pub mod config;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod identity;
pub mod listing;
pub mod models;
pub mod pagination;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export main types for convenience
pub use backoff::BackoffPolicy;
pub use block::{detect_block, is_blocked, BlockSignal};
pub use config::{ScraperConfig, USER_AGENTS};
pub use error::{ConfigError, ScrapeError};
pub use fetcher::{FailureReason, FetchOutcome, HttpFetcher, PageSource};
pub use identity::HeaderRotator;
pub use listing::{FieldExtractor, ListingExtractor, ListingParser, PageScan};
pub use models::{PageResult, ProductRecord, ScrapeRequest};
pub use pagination::{ProductScraper, ScrapeOutcome, ScrapeStats, StopReason};
