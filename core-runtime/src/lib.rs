//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the Virtual Tourist core:
//! - Logging and tracing infrastructure
//! - Configuration management (database location, Flickr API settings)
//! - Event bus system used for UI change notifications
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the other crates depend on.
//! It establishes the logging conventions and the event broadcasting mechanism
//! that replaces observer-style UI refreshes: the photo service emits an event
//! after every committed mutation and the host re-renders.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
