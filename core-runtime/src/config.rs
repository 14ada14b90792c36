//! # Core Configuration Module
//!
//! Provides configuration management for the Virtual Tourist core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the database location, the Flickr API settings and an
//! optional injected HTTP client. `build()` validates everything up front so
//! a misconfigured key or base URL fails at startup instead of on the first
//! photo search.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::{CoreConfig, FlickrApiConfig};
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/virtual_tourist.db")
//!     .flickr(FlickrApiConfig::new("your_flickr_api_key"))
//!     .build()
//!     .expect("valid config");
//! assert_eq!(config.flickr.bbox_half_width, 1.0);
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Missing Flickr API key
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/virtual_tourist.db")
//!     .build()
//!     .expect("Should fail - missing Flickr configuration");
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use crate::logging::redact_if_sensitive;
use bridge_traits::HttpClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Production endpoint of the Flickr REST API.
pub const FLICKR_API_BASE_URL: &str = "https://api.flickr.com/services/rest";

/// Default half extent of the search box, in degrees.
pub const DEFAULT_BBOX_HALF_SPAN: f64 = 1.0;

/// Default timeout applied to each Flickr request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the Flickr photo search API.
///
/// # Security Note
///
/// The API key should never be hardcoded in the binary. Load it from the
/// environment or the host platform's secure configuration and inject it here.
/// `Debug` output redacts the key.
///
/// # Example
///
/// ```
/// use core_runtime::config::FlickrApiConfig;
/// use std::time::Duration;
///
/// let config = FlickrApiConfig::new("your_flickr_api_key")
///     .with_bbox_half_span(0.5, 0.5)
///     .with_request_timeout(Duration::from_secs(10))
///     .with_random_seed(42);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, PartialEq)]
pub struct FlickrApiConfig {
    /// Flickr API key sent as `api_key` on every search.
    pub api_key: String,

    /// REST endpoint. Tests point this at a fake host.
    pub base_url: String,

    /// Half width of the bounding box around a pin, in degrees of longitude.
    pub bbox_half_width: f64,

    /// Half height of the bounding box around a pin, in degrees of latitude.
    pub bbox_half_height: f64,

    /// Per-request timeout for search calls.
    pub request_timeout: Duration,

    /// Seed for the random page generator. `None` seeds from OS entropy.
    pub random_seed: Option<u64>,
}

impl FlickrApiConfig {
    /// Creates a config for the production endpoint with default spans.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: FLICKR_API_BASE_URL.to_string(),
            bbox_half_width: DEFAULT_BBOX_HALF_SPAN,
            bbox_half_height: DEFAULT_BBOX_HALF_SPAN,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            random_seed: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_bbox_half_span(mut self, half_width: f64, half_height: f64) -> Self {
        self.bbox_half_width = half_width;
        self.bbox_half_height = half_height;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Makes page selection deterministic.
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Config(
                "Flickr API key cannot be empty. \
                 Obtain one at https://www.flickr.com/services/apps/create/"
                    .to_string(),
            ));
        }

        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(Error::Config(format!(
                "Flickr base URL must be an absolute http(s) URL, got '{}'",
                self.base_url
            )));
        }

        if !(self.bbox_half_width > 0.0 && self.bbox_half_width <= 180.0) {
            return Err(Error::Config(format!(
                "Bounding box half width must be in (0, 180] degrees, got {}",
                self.bbox_half_width
            )));
        }

        if !(self.bbox_half_height > 0.0 && self.bbox_half_height <= 90.0) {
            return Err(Error::Config(format!(
                "Bounding box half height must be in (0, 90] degrees, got {}",
                self.bbox_half_height
            )));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

impl std::fmt::Debug for FlickrApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlickrApiConfig")
            .field("api_key", &redact_if_sensitive("api_key", &self.api_key))
            .field("base_url", &self.base_url)
            .field("bbox_half_width", &self.bbox_half_width)
            .field("bbox_half_height", &self.bbox_half_height)
            .field("request_timeout", &self.request_timeout)
            .field("random_seed", &self.random_seed)
            .finish()
    }
}

/// Core configuration for the Virtual Tourist core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// HTTP client for search and image downloads. When absent the host
    /// must enable the `desktop-shims` feature to get the reqwest default.
    pub http_client: Option<Arc<dyn HttpClient>>,

    /// Flickr API settings
    pub flickr: FlickrApiConfig,

    /// Capacity of the event bus channel
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field("flickr", &self.flickr)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        self.flickr.validate()
    }
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    flickr: Option<FlickrApiConfig>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .database_path("/path/to/virtual_tourist.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the HTTP client implementation.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the Flickr API configuration (required).
    pub fn flickr(mut self, config: FlickrApiConfig) -> Self {
        self.flickr = Some(config);
        self
    }

    /// Shorthand for `flickr(FlickrApiConfig::new(api_key))`.
    pub fn flickr_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.flickr = Some(FlickrApiConfig::new(api_key));
        self
    }

    /// Default: [`DEFAULT_EVENT_BUFFER_SIZE`]
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the database path or the Flickr settings
    /// are missing or invalid.
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config(
                "Database path is required. Call .database_path() on the builder.".to_string(),
            )
        })?;

        let flickr = self.flickr.ok_or_else(|| {
            Error::Config(
                "Flickr API configuration is required. \
                 Call .flickr() or .flickr_api_key() on the builder."
                    .to_string(),
            )
        })?;

        let config = CoreConfig {
            database_path,
            http_client: self.http_client,
            flickr,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{BridgeError, HttpRequest, HttpResponse};

    struct NoopHttpClient;

    #[async_trait]
    impl HttpClient for NoopHttpClient {
        async fn execute(
            &self,
            _request: HttpRequest,
        ) -> std::result::Result<HttpResponse, BridgeError> {
            Err(BridgeError::NotAvailable("offline".to_string()))
        }
    }

    #[test]
    fn test_builder_with_all_required_fields() {
        let config = CoreConfig::builder()
            .database_path("/tmp/vt.db")
            .flickr_api_key("key")
            .build()
            .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/vt.db"));
        assert_eq!(config.flickr.base_url, FLICKR_API_BASE_URL);
        assert_eq!(config.flickr.bbox_half_width, 1.0);
        assert_eq!(config.flickr.bbox_half_height, 1.0);
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert!(config.http_client.is_none());
    }

    #[test]
    fn test_builder_requires_database_path() {
        let result = CoreConfig::builder().flickr_api_key("key").build();
        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("Database path")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_builder_requires_flickr_config() {
        let result = CoreConfig::builder().database_path("/tmp/vt.db").build();
        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("Flickr")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_builder_keeps_injected_client() {
        let config = CoreConfig::builder()
            .database_path("/tmp/vt.db")
            .flickr_api_key("key")
            .http_client(Arc::new(NoopHttpClient))
            .event_buffer_size(8)
            .build()
            .unwrap();

        assert!(config.http_client.is_some());
        assert_eq!(config.event_buffer_size, 8);
    }

    #[test]
    fn test_validate_rejects_empty_api_key() {
        let err = FlickrApiConfig::new("  ").validate().unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("API key")));
    }

    #[test]
    fn test_validate_rejects_relative_base_url() {
        let config = FlickrApiConfig::new("key").with_base_url("api.flickr.com/services/rest");
        assert!(config.validate().is_err());

        let config = FlickrApiConfig::new("key").with_base_url("http://127.0.0.1:8080/rest");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_spans() {
        assert!(FlickrApiConfig::new("key")
            .with_bbox_half_span(0.0, 1.0)
            .validate()
            .is_err());
        assert!(FlickrApiConfig::new("key")
            .with_bbox_half_span(1.0, 91.0)
            .validate()
            .is_err());
        assert!(FlickrApiConfig::new("key")
            .with_bbox_half_span(f64::NAN, 1.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = FlickrApiConfig::new("key").with_request_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_event_buffer() {
        let result = CoreConfig::builder()
            .database_path("/tmp/vt.db")
            .flickr_api_key("key")
            .event_buffer_size(0)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = CoreConfig::builder()
            .database_path("/tmp/vt.db")
            .flickr_api_key("super-secret-key")
            .build()
            .unwrap();

        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret-key"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_config_is_cloneable() {
        let config = CoreConfig::builder()
            .database_path("/tmp/vt.db")
            .flickr(FlickrApiConfig::new("key").with_random_seed(7))
            .build()
            .unwrap();

        let cloned = config.clone();
        assert_eq!(cloned.flickr, config.flickr);
        assert_eq!(cloned.flickr.random_seed, Some(7));
    }
}
