use reqwest::StatusCode;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use tokio::time::sleep;

use crate::backoff::BackoffPolicy;
use crate::block::{detect_block, BlockSignal};
use crate::config::ScraperConfig;
use crate::error::ScrapeError;
use crate::identity::HeaderRotator;

/// Why an attempt, or a whole page fetch, did not produce a usable body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    Blocked(BlockSignal),
    ServiceUnavailable,
    Status(u16),
    Transport(String),
    Exhausted { attempts: u32, last: Box<FailureReason> },
}

impl FailureReason {
    pub fn is_block(&self) -> bool {
        matches!(self, FailureReason::Blocked(_))
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Blocked(signal) => write!(f, "automated access detected ({})", signal),
            FailureReason::ServiceUnavailable => write!(f, "service unavailable (503)"),
            FailureReason::Status(code) => write!(f, "HTTP status {}", code),
            FailureReason::Transport(message) => write!(f, "transport error: {}", message),
            FailureReason::Exhausted { attempts, last } => {
                write!(f, "gave up after {} attempts, last failure: {}", attempts, last)
            }
        }
    }
}

/// Result of one attempt, and of a whole `fetch` once retries are spent.
/// `fetch` itself only ever returns `Success` or `TerminalFailure`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success { body: String, status: u16 },
    RetryableFailure(FailureReason),
    TerminalFailure(FailureReason),
}

/// Anything that can turn a listing URL into a fetch outcome.
pub trait PageSource {
    fn fetch_page(&self, url: &str) -> impl Future<Output = FetchOutcome>;
}

/// GET with rotated identity, client-wide timeout and exponential backoff
/// across a bounded retry budget. Attempts share nothing but the connection
/// pool: no cookie jar, so a cookie set on one response is never replayed.
pub struct HttpFetcher {
    client: reqwest::Client,
    rotator: HeaderRotator,
    backoff: BackoffPolicy,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self, ScrapeError> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.retry.timeout())
            .build()?;

        Ok(Self {
            client,
            rotator: HeaderRotator::new(&config.identity)?,
            backoff: BackoffPolicy::new(&config.retry),
            max_retries: config.retry.max_retries,
        })
    }

    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        retry_with_backoff(url, self.max_retries, &self.backoff, |attempt| {
            self.attempt(url, attempt)
        })
        .await
    }

    async fn attempt(&self, url: &str, attempt: u32) -> FetchOutcome {
        let response = self
            .client
            .get(url)
            .headers(self.rotator.headers())
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                log::error!("Request failed on attempt {}: {}", attempt + 1, e);
                return FetchOutcome::RetryableFailure(FailureReason::Transport(e.to_string()));
            }
        };

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            log::warn!("Service unavailable (503) on attempt {}", attempt + 1);
            return FetchOutcome::RetryableFailure(FailureReason::ServiceUnavailable);
        }
        if status != StatusCode::OK {
            log::error!(
                "Request failed with status code {} on attempt {}",
                status.as_u16(),
                attempt + 1
            );
            return FetchOutcome::RetryableFailure(FailureReason::Status(status.as_u16()));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                log::error!("Failed to read response body on attempt {}: {}", attempt + 1, e);
                return FetchOutcome::RetryableFailure(FailureReason::Transport(e.to_string()));
            }
        };

        // A block page will not go away by rotating identity, so the page is
        // abandoned instead of retried.
        if let Some(signal) = detect_block(&body) {
            log::error!("Automated access detected at {}: {}", url, signal);
            return FetchOutcome::TerminalFailure(FailureReason::Blocked(signal));
        }

        FetchOutcome::Success {
            body,
            status: status.as_u16(),
        }
    }
}

/// Runs `attempt` until it yields anything other than a retryable failure
/// or `max_retries` attempts are spent. Sleeps between attempts only.
pub(crate) async fn retry_with_backoff<F, Fut>(
    url: &str,
    max_retries: u32,
    backoff: &BackoffPolicy,
    mut attempt: F,
) -> FetchOutcome
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = FetchOutcome>,
{
    let mut last_failure = FailureReason::Transport("no attempt made".to_string());

    for n in 0..max_retries {
        match attempt(n).await {
            FetchOutcome::RetryableFailure(reason) => last_failure = reason,
            outcome => return outcome,
        }

        if n + 1 < max_retries {
            let delay = backoff.delay(n);
            log::info!(
                "Waiting {:.2} seconds before retry {}",
                delay.as_secs_f64(),
                n + 2
            );
            sleep(delay).await;
        }
    }

    log::error!(
        "Giving up on {} after {} attempts: {}",
        url,
        max_retries,
        last_failure
    );
    FetchOutcome::TerminalFailure(FailureReason::Exhausted {
        attempts: max_retries,
        last: Box::new(last_failure),
    })
}

impl PageSource for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> FetchOutcome {
        self.fetch(url).await
    }
}
