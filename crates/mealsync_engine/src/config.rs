//! Configuration for the sync engine.

use std::time::Duration;

/// Default retry ceiling for queued mutations.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default cache freshness window.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for the gateway and the reconciler.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the REST API (e.g. `https://api.example.com/api`).
    pub server_url: String,
    /// Failed replay attempts after which a mutation is dropped.
    pub max_retries: u32,
    /// Age after which the cache is no longer considered fresh.
    pub cache_ttl: Duration,
    /// Timeout for plain JSON requests.
    pub request_timeout: Duration,
    /// Timeout for multipart uploads.
    pub upload_timeout: Duration,
    /// Default page size for listings.
    pub page_size: u32,
    /// Periodic sync nudge while started; `None` disables it.
    pub sync_interval: Option<Duration>,
}

impl SyncConfig {
    /// Creates a new configuration for the given server.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            cache_ttl: DEFAULT_CACHE_TTL,
            request_timeout: Duration::from_secs(15),
            upload_timeout: Duration::from_secs(30),
            page_size: 20,
            sync_interval: None,
        }
    }

    /// Sets the retry ceiling (at least one attempt).
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Sets the cache freshness window.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Sets the JSON request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the upload timeout.
    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    /// Sets the default page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Enables the periodic sync nudge.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_defaults() {
        let config = SyncConfig::new("https://api.example.com");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.cache_ttl, Duration::from_secs(86_400));
        assert_eq!(config.upload_timeout, Duration::from_secs(30));
        assert!(config.sync_interval.is_none());
    }

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("https://api.example.com")
            .with_max_retries(3)
            .with_page_size(50)
            .with_request_timeout(Duration::from_secs(5))
            .with_sync_interval(Duration::from_secs(300));

        assert_eq!(config.server_url, "https://api.example.com");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.page_size, 50);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.sync_interval, Some(Duration::from_secs(300)));
    }

    #[test]
    fn builder_clamps_zero() {
        let config = SyncConfig::default().with_max_retries(0).with_page_size(0);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.page_size, 1);
    }
}
