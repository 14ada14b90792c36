//! # Photo Library Module
//!
//! Owns the local pin/photo database and provides the repository used to
//! read and mutate it.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite connection pooling and embedded migrations
//! - The `Pin` and `Photo` domain models
//! - `PhotoRepository`, the persistent cache of photos per pin
//!
//! Every mutating repository call runs in its own transaction and is committed
//! before it returns, so a subsequent read always observes the new state.

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use models::{Photo, PhotoId, Pin, PinId};
pub use repositories::{PhotoRepository, SqlitePhotoRepository};
