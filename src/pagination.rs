use rand::Rng;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

use crate::config::{PacingConfig, ScraperConfig};
use crate::error::{ConfigError, Result, ScrapeError};
use crate::fetcher::{FailureReason, FetchOutcome, HttpFetcher, PageSource};
use crate::listing::ListingExtractor;
use crate::models::{PageResult, ProductRecord, ScrapeRequest};

/// Why a scrape stopped fetching pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// Accumulated records reached `max_products`.
    TargetReached,
    /// A page parsed to zero item nodes.
    ListingsExhausted,
    /// `max_pages` pages were attempted.
    PagesExhausted,
}

/// Controller states. Fetching → Parsing → Extracting → Fetching | Done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    Fetching(u32),
    Parsing { page: u32, body: String },
    Extracting { page: u32, records: PageResult },
    Done(StopReason),
}

/// Where to go once a page has been handled, successfully or not.
pub fn after_page(page: u32, last_page: u32, accumulated: usize, max_products: usize) -> PageState {
    if accumulated >= max_products {
        PageState::Done(StopReason::TargetReached)
    } else if page >= last_page {
        PageState::Done(StopReason::PagesExhausted)
    } else {
        PageState::Fetching(page + 1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScrapeStats {
    pub pages_attempted: u32,
    pub pages_failed: u32,
    pub pages_blocked: u32,
    pub items_skipped: usize,
    pub duplicates_skipped: usize,
    pub stop_reason: Option<StopReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrapeOutcome {
    pub records: Vec<ProductRecord>,
    pub stats: ScrapeStats,
}

/// Drives a `PageSource` across successive listing pages, strictly one at a
/// time, until enough records are collected, listings run out, or the page
/// budget is spent.
pub struct ProductScraper<S = HttpFetcher> {
    source: S,
    listing: ListingExtractor,
    search_base: Url,
    pacing: PacingConfig,
}

impl ProductScraper<HttpFetcher> {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(config)?;
        Self::with_source(fetcher, config)
    }
}

impl<S: PageSource> ProductScraper<S> {
    pub fn with_source(source: S, config: &ScraperConfig) -> Result<Self> {
        config.validate()?;

        let search_base = Url::parse(&config.site.search_base()).map_err(|e| {
            ConfigError::Invalid(format!("search URL {}: {}", config.site.search_base(), e))
        })?;

        Ok(Self {
            source,
            listing: ListingExtractor::new(&config.site)?,
            search_base,
            pacing: config.pacing.clone(),
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// `<search-base>?k=<term>&page=<n>`, form-encoded.
    pub fn page_url(&self, search_term: &str, page: u32) -> String {
        let mut url = self.search_base.clone();
        url.query_pairs_mut()
            .append_pair("k", search_term.trim())
            .append_pair("page", &page.to_string());
        url.to_string()
    }

    pub async fn scrape(&self, request: &ScrapeRequest) -> Result<Vec<ProductRecord>> {
        self.scrape_with_stats(request).await.map(|outcome| outcome.records)
    }

    pub async fn scrape_with_stats(&self, request: &ScrapeRequest) -> Result<ScrapeOutcome> {
        request.validate().map_err(ScrapeError::InvalidRequest)?;

        let last_page = request.last_page();
        let mut records: Vec<ProductRecord> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut stats = ScrapeStats::default();
        let mut state = PageState::Fetching(request.start_page);

        log::info!(
            "Starting scrape for '{}': up to {} products across pages {}..={}",
            request.search_term,
            request.max_products,
            request.start_page,
            last_page
        );

        let stop_reason = loop {
            state = match state {
                PageState::Fetching(page) => {
                    if page != request.start_page {
                        self.pause_between_pages().await;
                    }

                    let url = self.page_url(&request.search_term, page);
                    log::info!("Fetching page {}: {}", page, url);
                    stats.pages_attempted += 1;

                    match self.source.fetch_page(&url).await {
                        FetchOutcome::Success { body, .. } => PageState::Parsing { page, body },
                        FetchOutcome::TerminalFailure(reason)
                        | FetchOutcome::RetryableFailure(reason) => {
                            self.record_failure(page, &reason, &mut stats);
                            after_page(page, last_page, records.len(), request.max_products)
                        }
                    }
                }
                PageState::Parsing { page, body } => {
                    let scan = self.listing.scan(&body);
                    if scan.item_count == 0 {
                        log::warn!("No products found on page {}", page);
                        PageState::Done(StopReason::ListingsExhausted)
                    } else {
                        stats.items_skipped += scan.skipped();
                        PageState::Extracting {
                            page,
                            records: scan.records,
                        }
                    }
                }
                PageState::Extracting { page, records: page_records } => {
                    for record in page_records {
                        if !seen.insert(record.dedup_key()) {
                            log::debug!("Skipping duplicate product: {}", record.name);
                            stats.duplicates_skipped += 1;
                            continue;
                        }
                        records.push(record);
                        if records.len() % 10 == 0 {
                            log::info!("Scraped {} products so far", records.len());
                        }
                    }
                    log::info!(
                        "Completed page {}, total products scraped: {}",
                        page,
                        records.len()
                    );
                    after_page(page, last_page, records.len(), request.max_products)
                }
                PageState::Done(reason) => break reason,
            };
        };

        stats.stop_reason = Some(stop_reason);
        if stop_reason == StopReason::TargetReached {
            log::info!("Reached target of {} products", request.max_products);
        }

        if records.is_empty() {
            log::error!(
                "No products collected for '{}' ({} pages attempted, {} blocked)",
                request.search_term,
                stats.pages_attempted,
                stats.pages_blocked
            );
            return Err(ScrapeError::NoResults {
                pages_attempted: stats.pages_attempted,
                pages_blocked: stats.pages_blocked,
            });
        }

        log::info!("Scraping completed. Total products collected: {}", records.len());
        Ok(ScrapeOutcome { records, stats })
    }

    fn record_failure(&self, page: u32, reason: &FailureReason, stats: &mut ScrapeStats) {
        stats.pages_failed += 1;
        if reason.is_block() {
            stats.pages_blocked += 1;
            log::error!("Page {} blocked, skipping: {}", page, reason);
        } else {
            log::error!("Failed to fetch page {}: {}", page, reason);
        }
    }

    async fn pause_between_pages(&self) {
        let delay = page_delay(&self.pacing, &mut rand::rng());
        if !delay.is_zero() {
            log::debug!("Pausing {:.2} seconds before next page", delay.as_secs_f64());
            sleep(delay).await;
        }
    }
}

fn page_delay<R: Rng + ?Sized>(pacing: &PacingConfig, rng: &mut R) -> Duration {
    let (min, max) = (pacing.page_delay_min_secs, pacing.page_delay_max_secs);
    let secs = if max > min { rng.random_range(min..max) } else { min };
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockSignal;
    use crate::test_support::{listing_page, test_config, ScriptedSource};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn scraper(outcomes: Vec<FetchOutcome>) -> ProductScraper<ScriptedSource> {
        ProductScraper::with_source(ScriptedSource::new(outcomes), &test_config()).unwrap()
    }

    fn ok(body: String) -> FetchOutcome {
        FetchOutcome::Success { body, status: 200 }
    }

    fn blocked() -> FetchOutcome {
        FetchOutcome::TerminalFailure(FailureReason::Blocked(BlockSignal::Captcha))
    }

    #[test]
    fn test_after_page_transitions() {
        assert_eq!(after_page(1, 3, 5, 5), PageState::Done(StopReason::TargetReached));
        assert_eq!(after_page(1, 3, 9, 5), PageState::Done(StopReason::TargetReached));
        assert_eq!(after_page(3, 3, 2, 5), PageState::Done(StopReason::PagesExhausted));
        assert_eq!(after_page(1, 3, 2, 5), PageState::Fetching(2));
    }

    #[test]
    fn test_page_url_shape() {
        let scraper = scraper(vec![]);
        assert_eq!(
            scraper.page_url("gaming laptop", 3),
            "https://www.amazon.in/s?k=gaming+laptop&page=3"
        );
        assert_eq!(
            scraper.page_url("a&b", 1),
            "https://www.amazon.in/s?k=a%26b&page=1"
        );
    }

    #[test]
    fn test_page_delay_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let pacing = PacingConfig::default();
        for _ in 0..100 {
            let secs = page_delay(&pacing, &mut rng).as_secs_f64();
            assert!((3.0..5.0).contains(&secs));
        }
        assert!(page_delay(&PacingConfig::none(), &mut rng).is_zero());
    }

    #[tokio::test]
    async fn test_target_reached_on_first_page_without_truncation() {
        let scraper = scraper(vec![ok(listing_page("p1", 8)), ok(listing_page("p2", 8))]);
        let request = ScrapeRequest::new("laptop", 5, 2);

        let outcome = scraper.scrape_with_stats(&request).await.unwrap();
        assert_eq!(outcome.records.len(), 8);
        assert_eq!(outcome.stats.stop_reason, Some(StopReason::TargetReached));
        assert_eq!(scraper.source().calls().len(), 1);
    }

    #[tokio::test]
    async fn test_accumulates_across_pages_in_order() {
        let scraper = scraper(vec![ok(listing_page("p1", 3)), ok(listing_page("p2", 3))]);
        let request = ScrapeRequest::new("laptop", 5, 4);

        let records = scraper.scrape(&request).await.unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["p1 item 1", "p1 item 2", "p1 item 3", "p2 item 1", "p2 item 2", "p2 item 3"]);

        let calls = scraper.source().calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].ends_with("page=1"));
        assert!(calls[1].ends_with("page=2"));
    }

    #[tokio::test]
    async fn test_empty_page_stops_pagination() {
        let scraper = scraper(vec![
            ok(listing_page("p1", 2)),
            ok(listing_page("p2", 0)),
            ok(listing_page("p3", 2)),
        ]);
        let request = ScrapeRequest::new("laptop", 50, 5);

        let outcome = scraper.scrape_with_stats(&request).await.unwrap();
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.stats.stop_reason, Some(StopReason::ListingsExhausted));
        assert_eq!(scraper.source().calls().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_page_is_skipped() {
        let exhausted = FetchOutcome::TerminalFailure(FailureReason::Exhausted {
            attempts: 5,
            last: Box::new(FailureReason::ServiceUnavailable),
        });
        let scraper = scraper(vec![exhausted, ok(listing_page("p2", 4))]);
        let request = ScrapeRequest::new("laptop", 10, 2);

        let outcome = scraper.scrape_with_stats(&request).await.unwrap();
        assert_eq!(outcome.records.len(), 4);
        assert_eq!(outcome.stats.pages_failed, 1);
        assert_eq!(outcome.stats.pages_blocked, 0);
        assert_eq!(outcome.stats.stop_reason, Some(StopReason::PagesExhausted));
    }

    #[tokio::test]
    async fn test_blocked_first_page_then_recovers() {
        let scraper = scraper(vec![blocked(), ok(listing_page("p2", 3))]);
        let request = ScrapeRequest::new("laptop", 10, 2);

        let outcome = scraper.scrape_with_stats(&request).await.unwrap();
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.stats.pages_blocked, 1);
    }

    #[tokio::test]
    async fn test_all_pages_blocked_is_no_results() {
        let scraper = scraper(vec![blocked(), blocked(), blocked()]);
        let request = ScrapeRequest::new("laptop", 5, 3);

        let err = scraper.scrape(&request).await.unwrap_err();
        assert!(err.is_blocked());
        match err {
            ScrapeError::NoResults { pages_attempted, pages_blocked } => {
                assert_eq!(pages_attempted, 3);
                assert_eq!(pages_blocked, 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_never_exceeds_max_pages() {
        let outcomes = (0..10).map(|i| ok(listing_page(&format!("p{i}"), 1))).collect();
        let scraper = scraper(outcomes);
        let request = ScrapeRequest::new("laptop", 100, 4).starting_at(3);

        let outcome = scraper.scrape_with_stats(&request).await.unwrap();
        assert_eq!(outcome.stats.pages_attempted, 4);
        assert_eq!(outcome.records.len(), 4);

        let calls = scraper.source().calls();
        assert!(calls[0].ends_with("page=3"));
        assert!(calls[3].ends_with("page=6"));
    }

    #[tokio::test]
    async fn test_duplicates_across_pages_dropped() {
        let scraper = scraper(vec![ok(listing_page("same", 3)), ok(listing_page("same", 3))]);
        let request = ScrapeRequest::new("laptop", 10, 2);

        let outcome = scraper.scrape_with_stats(&request).await.unwrap();
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.stats.duplicates_skipped, 3);
    }

    #[tokio::test]
    async fn test_invalid_request_rejected_before_fetching() {
        let scraper = scraper(vec![]);
        let err = scraper.scrape(&ScrapeRequest::new("  ", 5, 1)).await.unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidRequest(_)));
        assert!(scraper.source().calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_follows_failed_pages_too() {
        let mut config = test_config();
        config.pacing = PacingConfig {
            page_delay_min_secs: 2.0,
            page_delay_max_secs: 2.0,
        };
        let outcomes = vec![
            FetchOutcome::TerminalFailure(FailureReason::Status(500)),
            blocked(),
            ok(listing_page("late", 2)),
        ];
        let scraper = ProductScraper::with_source(ScriptedSource::new(outcomes), &config).unwrap();
        let start = tokio::time::Instant::now();

        let outcome = scraper
            .scrape_with_stats(&ScrapeRequest::new("laptop", 50, 3))
            .await
            .unwrap();

        // before page 2 and page 3, none after the last page
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(4), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(6), "elapsed {:?}", elapsed);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.stats.pages_attempted, 3);
        assert_eq!(outcome.stats.stop_reason, Some(StopReason::PagesExhausted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_pause_before_first_page() {
        let mut config = test_config();
        config.pacing = PacingConfig {
            page_delay_min_secs: 2.0,
            page_delay_max_secs: 2.0,
        };
        let scraper =
            ProductScraper::with_source(ScriptedSource::new(vec![ok(listing_page("only", 3))]), &config)
                .unwrap();
        let start = tokio::time::Instant::now();

        scraper.scrape(&ScrapeRequest::new("laptop", 3, 5)).await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
