use std::cell::RefCell;
use std::collections::VecDeque;

use crate::config::{PacingConfig, ScraperConfig};
use crate::fetcher::{FailureReason, FetchOutcome, PageSource};

/// Config with every delay zeroed so controller tests run instantly.
pub fn test_config() -> ScraperConfig {
    let mut config = ScraperConfig::default();
    config.retry.max_retries = 3;
    config.retry.initial_delay_secs = 0.0;
    config.retry.max_delay_secs = 0.0;
    config.retry.jitter_secs = 0.0;
    config.retry.timeout_secs = 5;
    config.pacing = PacingConfig::none();
    config
}

/// A listing page with `count` complete items named `"<prefix> item <n>"`.
pub fn listing_page(prefix: &str, count: usize) -> String {
    let items: String = (1..=count)
        .map(|n| {
            format!(
                r#"<div data-component-type="s-search-result">
                    <a class="a-link-normal s-link-style a-text-normal" href="/dp/{prefix}-{n}">
                        <h2><span>{prefix} item {n}</span></h2>
                    </a>
                    <span class="a-price-whole">{price}</span>
                </div>"#,
                price = 100 * n
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html><html><head><title>Results</title></head><body><div class="s-main-slot">{items}</div></body></html>"#
    )
}

/// Replays canned outcomes in order and records every URL asked for.
pub struct ScriptedSource {
    outcomes: RefCell<VecDeque<FetchOutcome>>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedSource {
    pub fn new(outcomes: Vec<FetchOutcome>) -> Self {
        Self {
            outcomes: RefCell::new(outcomes.into()),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl PageSource for ScriptedSource {
    async fn fetch_page(&self, url: &str) -> FetchOutcome {
        self.calls.borrow_mut().push(url.to_string());
        self.outcomes.borrow_mut().pop_front().unwrap_or_else(|| {
            FetchOutcome::TerminalFailure(FailureReason::Transport("script exhausted".to_string()))
        })
    }
}
