use rand::Rng;
use rand::seq::IndexedRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};

use crate::config::IdentityConfig;
use crate::error::ConfigError;

/// Hands out a plausible browser identity per attempt: the baseline
/// headers plus a user agent drawn uniformly from the pool.
#[derive(Debug, Clone)]
pub struct HeaderRotator {
    user_agents: Vec<HeaderValue>,
    baseline: HeaderMap,
}

impl HeaderRotator {
    pub fn new(config: &IdentityConfig) -> Result<Self, ConfigError> {
        let user_agents = config
            .user_agents
            .iter()
            .map(|ua| {
                HeaderValue::from_str(ua)
                    .map_err(|_| ConfigError::Invalid(format!("invalid user agent: {}", ua)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if user_agents.is_empty() {
            return Err(ConfigError::Invalid("user agent pool is empty".to_string()));
        }

        let mut baseline = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ConfigError::Invalid(format!("invalid header name: {}", name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ConfigError::Invalid(format!("invalid header value: {}", value)))?;
            baseline.insert(name, value);
        }

        Ok(Self { user_agents, baseline })
    }

    pub fn headers(&self) -> HeaderMap {
        self.headers_with(&mut rand::rng())
    }

    pub fn headers_with<R: Rng + ?Sized>(&self, rng: &mut R) -> HeaderMap {
        let mut headers = self.baseline.clone();
        if let Some(ua) = self.user_agents.choose(rng) {
            headers.insert(USER_AGENT, ua.clone());
        }
        headers
    }

    pub fn pool_size(&self) -> usize {
        self.user_agents.len()
    }
}
