//! Workspace facade crate.
//!
//! Host applications depend on `virtual-tourist` and get the photo service,
//! its configuration and the desktop HTTP adapter without wiring each
//! workspace crate individually. The `desktop-shims` feature (on by default)
//! pulls in `core-service` and the reqwest-backed `bridge-desktop` client.

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop::ReqwestHttpClient;

#[cfg(feature = "desktop-shims")]
pub use core_service::{bootstrap, PhotoBatch, PhotoSource, PinPhotoService, ServiceError};
