//! # Repository Pattern Implementation
//!
//! Repository traits and implementations for data access.
//!
//! - Traits define the interface so services can be tested against mocks
//! - SQLite implementations use sqlx for async database access
//! - All operations return `Result<T>` for error handling

pub mod photo;

pub use photo::{PhotoRepository, SqlitePhotoRepository};
