//! Core service façade and bootstrap helpers.
//!
//! This crate wires the host-provided HTTP bridge, the SQLite photo store and
//! the Flickr client into a [`PinPhotoService`]. Desktop apps typically enable
//! the `desktop-shims` feature (which depends on `bridge-desktop`) so that a
//! reqwest-backed client is used when the configuration carries none.

pub mod error;
mod inflight;
pub mod service;

pub use error::{Result, ServiceError};
pub use service::{PhotoBatch, PhotoSource, PinPhotoService};

use std::sync::Arc;

use bridge_traits::http::HttpClient;
use core_library::db::{create_pool, DatabaseConfig};
use core_library::SqlitePhotoRepository;
use core_runtime::config::CoreConfig;
use core_runtime::events::EventBus;
use provider_flickr::FlickrClient;
use tracing::info;

/// Build a ready-to-use service from validated configuration.
///
/// Opens (and migrates) the database at `config.database_path`.
///
/// ```no_run
/// # async fn example() -> core_service::Result<()> {
/// use core_runtime::config::CoreConfig;
///
/// let config = CoreConfig::builder()
///     .database_path("virtual_tourist.db")
///     .flickr_api_key("your_api_key")
///     .build()?;
/// let service = core_service::bootstrap(config).await?;
/// let pins = service.list_pins().await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// - `Runtime` if the configuration is invalid or no HTTP client is
///   available
/// - `Repository` if the database cannot be opened or migrated
pub async fn bootstrap(config: CoreConfig) -> Result<PinPhotoService> {
    config.validate()?;

    let http_client = match config.http_client.clone() {
        Some(client) => client,
        None => default_http_client(&config)?,
    };

    let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
    let repository = Arc::new(SqlitePhotoRepository::new(pool));
    let client = Arc::new(FlickrClient::new(http_client, config.flickr.clone()));
    let events = Arc::new(EventBus::new(config.event_buffer_size));

    info!(database = %config.database_path.display(), "Photo service ready");
    Ok(PinPhotoService::new(client, repository, events))
}

#[cfg(feature = "desktop-shims")]
fn default_http_client(config: &CoreConfig) -> Result<Arc<dyn HttpClient>> {
    let client = bridge_desktop::ReqwestHttpClient::with_timeout(config.flickr.request_timeout)
        .map_err(|e| core_runtime::Error::CapabilityMissing {
            capability: "HttpClient".to_string(),
            message: e.to_string(),
        })?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn default_http_client(_config: &CoreConfig) -> Result<Arc<dyn HttpClient>> {
    Err(core_runtime::Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "No HTTP client configured. Provide one via CoreConfig::builder().http_client() \
                  or enable the desktop-shims feature."
            .to_string(),
    }
    .into())
}
