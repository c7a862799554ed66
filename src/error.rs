use std::path::PathBuf;

/// Problems with a `ScraperConfig`, reported when the scraper is built.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid selector for {field}: {selector}")]
    Selector { field: &'static str, selector: String },
}

/// Failures a scrape invocation surfaces to its caller.
#[derive(thiserror::Error, Debug)]
pub enum ScrapeError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Nothing was collected across every attempted page. `pages_blocked`
    /// tells how many of those pages answered with a block signal, so a
    /// caller can tell "blocked everywhere" apart from "genuinely empty".
    #[error("No products found. The site might be blocking the request ({pages_blocked} of {pages_attempted} pages blocked)")]
    NoResults {
        pages_attempted: u32,
        pages_blocked: u32,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ScrapeError {
    /// True when every attempted page was blocked.
    pub fn is_blocked(&self) -> bool {
        matches!(
            self,
            ScrapeError::NoResults { pages_attempted, pages_blocked }
                if *pages_attempted > 0 && pages_attempted == pages_blocked
        )
    }
}

pub type Result<T, E = ScrapeError> = std::result::Result<T, E>;
