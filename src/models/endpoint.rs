use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use super::OwaspCategory;
use crate::utils::fingerprint;

/// Default garak generator used when an endpoint does not name one
pub const DEFAULT_GENERATOR: &str = "rest";

/// Default per-probe timeout
pub const DEFAULT_TIMEOUT_SECS: f64 = 300.0;

/// Upper bound for a per-probe timeout (one day)
pub const MAX_TIMEOUT_SECS: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    pub requests_per_second: f64,
    pub burst: u32,
}

impl RateLimit {
    /// Burst defaults to one second's worth of requests (at least 1).
    pub fn per_second(requests_per_second: f64) -> Self {
        Self {
            requests_per_second,
            burst: (requests_per_second.ceil() as u32).max(1),
        }
    }

    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = burst.max(1);
        self
    }
}

/// A validated scan target.
///
/// `auth_ref` is an opaque handle (e.g. `env:OPENAI_API_KEY`). It is never
/// printed: `Debug` shows a fingerprint instead.
#[derive(Clone, PartialEq)]
pub struct Endpoint {
    pub id: String,
    pub address: String,
    pub auth_ref: String,
    pub categories: BTreeSet<OwaspCategory>,
    pub rate_limit: RateLimit,
    pub timeout: Duration,
    pub enabled: bool,
    /// garak generator family (`--model_type`)
    pub generator: String,
    /// garak model name; falls back to the address
    pub model: Option<String>,
}

impl Endpoint {
    pub fn new(id: impl Into<String>, address: impl Into<String>, auth_ref: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            auth_ref: auth_ref.into(),
            categories: BTreeSet::new(),
            rate_limit: RateLimit::per_second(1.0),
            timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
            enabled: true,
            generator: DEFAULT_GENERATOR.to_string(),
            model: None,
        }
    }

    pub fn with_categories(mut self, categories: impl IntoIterator<Item = OwaspCategory>) -> Self {
        self.categories = categories.into_iter().collect();
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn accepts(&self, category: OwaspCategory) -> bool {
        self.categories.contains(&category)
    }

    /// Loggable stand-in for the auth reference
    pub fn auth_fingerprint(&self) -> String {
        fingerprint(&self.auth_ref)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("auth_ref", &format_args!("<{}>", self.auth_fingerprint()))
            .field("categories", &self.categories)
            .field("rate_limit", &self.rate_limit)
            .field("timeout", &self.timeout)
            .field("enabled", &self.enabled)
            .field("generator", &self.generator)
            .field("model", &self.model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_never_prints_auth_ref() {
        let endpoint = Endpoint::new("ep1", "https://llm.internal/v1", "env:SECRET_TOKEN_NAME");
        let printed = format!("{:?}", endpoint);
        assert!(!printed.contains("SECRET_TOKEN_NAME"));
        assert!(printed.contains(&endpoint.auth_fingerprint()));
    }

    #[test]
    fn test_default_burst_follows_rate() {
        assert_eq!(RateLimit::per_second(0.5).burst, 1);
        assert_eq!(RateLimit::per_second(4.2).burst, 5);
        assert_eq!(RateLimit::per_second(2.0).with_burst(0).burst, 1);
    }
}
