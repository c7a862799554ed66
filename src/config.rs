use reqwest::header::{HeaderName, HeaderValue};
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

/// Environment variable pointing at a TOML config file.
pub const CONFIG_ENV_VAR: &str = "SCRAPER_CONFIG";

/// Upper bound on any single configured wait (backoff cap, jitter window,
/// inter-page pause), in seconds.
pub const MAX_WAIT_SECS: f64 = 3600.0;

/// User agent pool rotated across attempts
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36 Edg/121.0.0.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
];

/// Full scraper configuration. Built once, then shared read-only by the
/// fetcher, the rotator and the pagination controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub retry: RetryConfig,
    pub site: SiteConfig,
    pub identity: IdentityConfig,
    pub pacing: PacingConfig,
    pub server: ServerConfig,
    pub defaults: ScrapeDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per page, including the first one.
    pub max_retries: u32,
    pub initial_delay_secs: f64,
    pub backoff_factor: f64,
    pub max_delay_secs: f64,
    /// Width of the uniform jitter window added to every backoff delay.
    pub jitter_secs: f64,
    /// Per-attempt HTTP timeout.
    pub timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_secs: 2.0,
            backoff_factor: 2.0,
            max_delay_secs: 30.0,
            jitter_secs: 1.0,
            timeout_secs: 30,
        }
    }
}

impl RetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Scheme and host that root-relative links are resolved against.
    pub origin: String,
    pub search_path: String,
    pub selectors: SelectorConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            origin: "https://www.amazon.in".to_string(),
            search_path: "/s".to_string(),
            selectors: SelectorConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Base of every listing URL, e.g. `https://www.amazon.in/s`.
    pub fn search_base(&self) -> String {
        format!(
            "{}/{}",
            self.origin.trim_end_matches('/'),
            self.search_path.trim_start_matches('/')
        )
    }
}

/// CSS selectors for the result grid. Everything except `item` is
/// evaluated relative to one item node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub item: String,
    pub link: String,
    pub name: String,
    pub price: String,
    pub image: String,
    pub rating: String,
    pub review_count: String,
    pub availability: String,
    pub prime: String,
    pub discount: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            item: r#"div.s-main-slot div[data-component-type="s-search-result"]"#.to_string(),
            link: "a.a-link-normal.s-link-style.a-text-normal".to_string(),
            name: "h2 span".to_string(),
            price: "span.a-price-whole".to_string(),
            image: "img.s-image".to_string(),
            rating: "span.a-icon-alt".to_string(),
            review_count: "span.a-size-base.s-underline-text".to_string(),
            availability: "span.a-color-success".to_string(),
            prime: "i.a-icon-prime".to_string(),
            discount: "span.a-badge-text".to_string(),
        }
    }
}

impl SelectorConfig {
    pub fn fields(&self) -> [(&'static str, &str); 10] {
        [
            ("item", self.item.as_str()),
            ("link", self.link.as_str()),
            ("name", self.name.as_str()),
            ("price", self.price.as_str()),
            ("image", self.image.as_str()),
            ("rating", self.rating.as_str()),
            ("review_count", self.review_count.as_str()),
            ("availability", self.availability.as_str()),
            ("prime", self.prime.as_str()),
            ("discount", self.discount.as_str()),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub user_agents: Vec<String>,
    /// Baseline headers sent with every request; `User-Agent` is added
    /// per attempt.
    pub headers: BTreeMap<String, String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        let headers = [
            ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"),
            ("Accept-Language", "en-US,en;q=0.5"),
            ("Accept-Encoding", "gzip, deflate, br"),
            ("Connection", "keep-alive"),
            ("Upgrade-Insecure-Requests", "1"),
            ("Cache-Control", "max-age=0"),
            ("TE", "trailers"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            user_agents: USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
            headers,
        }
    }
}

/// Randomised pause between two listing pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub page_delay_min_secs: f64,
    pub page_delay_max_secs: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            page_delay_min_secs: 3.0,
            page_delay_max_secs: 5.0,
        }
    }
}

impl PacingConfig {
    /// No pause at all; used by tests and one-shot tooling.
    pub fn none() -> Self {
        Self {
            page_delay_min_secs: 0.0,
            page_delay_max_secs: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub max_scrapes_per_minute: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_scrapes_per_minute: 10,
        }
    }
}

/// Values used when a caller leaves a request parameter out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeDefaults {
    pub max_products: usize,
    pub max_pages: u32,
    pub start_page: u32,
}

impl Default for ScrapeDefaults {
    fn default() -> Self {
        Self {
            max_products: 15,
            max_pages: 20,
            start_page: 1,
        }
    }
}

impl ScraperConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ScraperConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Reads the file named by `SCRAPER_CONFIG`, or falls back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let retry = &self.retry;
        if retry.max_retries == 0 {
            return invalid("retry.max_retries must be at least 1");
        }
        if !retry.initial_delay_secs.is_finite() || retry.initial_delay_secs < 0.0 {
            return invalid("retry.initial_delay_secs must be a non-negative number");
        }
        if !retry.backoff_factor.is_finite() || retry.backoff_factor < 1.0 {
            return invalid("retry.backoff_factor must be at least 1");
        }
        if !retry.max_delay_secs.is_finite() || retry.max_delay_secs < retry.initial_delay_secs {
            return invalid("retry.max_delay_secs must not be below retry.initial_delay_secs");
        }
        if retry.max_delay_secs > MAX_WAIT_SECS {
            return invalid("retry.max_delay_secs must not exceed 3600");
        }
        if !retry.jitter_secs.is_finite() || !(0.0..=MAX_WAIT_SECS).contains(&retry.jitter_secs) {
            return invalid("retry.jitter_secs must be between 0 and 3600");
        }
        if retry.timeout_secs == 0 {
            return invalid("retry.timeout_secs must be at least 1");
        }

        let pacing = &self.pacing;
        if !pacing.page_delay_min_secs.is_finite()
            || !pacing.page_delay_max_secs.is_finite()
            || pacing.page_delay_min_secs < 0.0
            || pacing.page_delay_max_secs < pacing.page_delay_min_secs
            || pacing.page_delay_max_secs > MAX_WAIT_SECS
        {
            return invalid("pacing delays must satisfy 0 <= page_delay_min_secs <= page_delay_max_secs <= 3600");
        }

        if self.identity.user_agents.is_empty() {
            return invalid("identity.user_agents must not be empty");
        }
        for ua in &self.identity.user_agents {
            if HeaderValue::from_str(ua).is_err() {
                return invalid(&format!("user agent is not a valid header value: {}", ua));
            }
        }
        for (name, value) in &self.identity.headers {
            if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_str(value).is_err() {
                return invalid(&format!("invalid baseline header: {}: {}", name, value));
            }
        }

        match Url::parse(&self.site.origin) {
            Ok(url) if url.has_host() => {}
            _ => return invalid(&format!("site.origin is not an absolute URL: {}", self.site.origin)),
        }
        if Url::parse(&self.site.search_base()).is_err() {
            return invalid("site.search_path does not form a valid URL with site.origin");
        }
        for (field, selector) in self.site.selectors.fields() {
            if Selector::parse(selector).is_err() {
                return Err(ConfigError::Selector {
                    field,
                    selector: selector.to_string(),
                });
            }
        }

        if self.server.max_scrapes_per_minute == 0 {
            return invalid("server.max_scrapes_per_minute must be at least 1");
        }

        let defaults = &self.defaults;
        if defaults.max_products == 0 || defaults.max_pages == 0 || defaults.start_page == 0 {
            return invalid("defaults.max_products, max_pages and start_page must be at least 1");
        }

        Ok(())
    }
}

fn invalid(message: &str) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(message.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ScraperConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.timeout(), Duration::from_secs(30));
        assert_eq!(config.defaults.max_products, 15);
        assert_eq!(config.site.search_base(), "https://www.amazon.in/s");
    }

    #[test]
    fn test_partial_toml_overrides_only_named_fields() {
        let toml = r#"
            [retry]
            max_retries = 3
            timeout_secs = 15

            [site]
            origin = "https://shop.example"

            [site.selectors]
            price = "span.price"
        "#;

        let config = ScraperConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.timeout_secs, 15);
        assert_eq!(config.retry.backoff_factor, 2.0);
        assert_eq!(config.site.origin, "https://shop.example");
        assert_eq!(config.site.search_path, "/s");
        assert_eq!(config.site.selectors.price, "span.price");
        assert_eq!(config.site.selectors.name, "h2 span");
        assert_eq!(config.identity.user_agents.len(), USER_AGENTS.len());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ScraperConfig::default();
        config.retry.max_retries = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ScraperConfig::default();
        config.retry.max_delay_secs = 1.0;
        assert!(config.validate().is_err());

        let mut config = ScraperConfig::default();
        config.identity.user_agents.clear();
        assert!(config.validate().is_err());

        let mut config = ScraperConfig::default();
        config.retry.max_retries = 100;
        config.retry.max_delay_secs = 1e20;
        assert!(config.validate().is_err());

        let mut config = ScraperConfig::default();
        config.retry.jitter_secs = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = ScraperConfig::default();
        config.pacing.page_delay_max_secs = 1e12;
        assert!(config.validate().is_err());

        let mut config = ScraperConfig::default();
        config.retry.max_delay_secs = MAX_WAIT_SECS;
        assert!(config.validate().is_ok());

        let mut config = ScraperConfig::default();
        config.pacing.page_delay_min_secs = 6.0;
        assert!(config.validate().is_err());

        let mut config = ScraperConfig::default();
        config.site.origin = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_reports_broken_selector() {
        let mut config = ScraperConfig::default();
        config.site.selectors.rating = "span[[".to_string();
        match config.validate() {
            Err(ConfigError::Selector { field, .. }) => assert_eq!(field, "rating"),
            other => panic!("expected selector error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_missing_file() {
        let result = ScraperConfig::load("/definitely/not/here.toml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
