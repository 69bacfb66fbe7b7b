//! Session configuration
//!
//! Defaults can be overridden through the environment:
//!
//! - `LOGPACK_SERVER_URL`: pack server base URL
//! - `LOGPACK_QUERY_TIMEOUT_SECS`: how long a query may stay unanswered
//! - `LOGPACK_API_TIMEOUT_SECS`: HTTP timeout, sized for large pack downloads
//! - `LOGPACK_META_CACHE_TTL_MINUTES`: pack metadata cache lifetime

use logpack_common::PackError;
use std::time::Duration;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_SERVER_URL: &str = "http://localhost:4321";

pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Five minutes, enough for large pack downloads
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 300;

pub const DEFAULT_META_CACHE_TTL_MINUTES: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub server_url: String,
    pub query_timeout: Duration,
    pub api_timeout: Duration,
    pub meta_cache_ttl_minutes: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            api_timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
            meta_cache_ttl_minutes: DEFAULT_META_CACHE_TTL_MINUTES,
        }
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>, PackError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| PackError::Config(format!("{} must be a number, got '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}

impl SessionConfig {
    /// Defaults overridden by `LOGPACK_*` environment variables
    pub fn from_env() -> Result<Self, PackError> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("LOGPACK_SERVER_URL") {
            config.server_url = url;
        }
        if let Some(secs) = env_number::<u64>("LOGPACK_QUERY_TIMEOUT_SECS")? {
            config.query_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_number::<u64>("LOGPACK_API_TIMEOUT_SECS")? {
            config.api_timeout = Duration::from_secs(secs);
        }
        if let Some(minutes) = env_number::<i64>("LOGPACK_META_CACHE_TTL_MINUTES")? {
            config.meta_cache_ttl_minutes = minutes;
        }

        config.server_url = config.server_url.trim_end_matches('/').to_string();
        Ok(config)
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.server_url, "http://localhost:4321");
        assert_eq!(config.query_timeout, Duration::from_secs(30));
        assert_eq!(config.api_timeout, Duration::from_secs(300));
        assert_eq!(config.meta_cache_ttl_minutes, 5);
    }

    #[test]
    fn test_builder_trims_trailing_slash() {
        let config = SessionConfig::default()
            .with_server_url("https://packs.example.com/")
            .with_query_timeout(Duration::from_millis(50));
        assert_eq!(config.server_url, "https://packs.example.com");
        assert_eq!(config.query_timeout, Duration::from_millis(50));
    }
}
