//! # Flickr Provider
//!
//! Implements `ImageSearchClient` for the Flickr REST API.
//!
//! ## Overview
//!
//! This module provides:
//! - Geographic photo search (`flickr.photos.search`) inside a bounding box
//!   around a coordinate
//! - The random-page protocol: one request to learn how many result pages
//!   exist, a second one for a uniformly chosen page
//! - Plain image downloads by absolute URL
//!
//! All network access goes through an injected `bridge_traits::HttpClient`.
//! Nothing here retries or caches; failures surface as [`ApiError`].

pub mod client;
pub mod error;
pub mod types;

pub use client::{
    build_search_url, page_limit, pick_random_page, FlickrClient, ImageSearchClient,
    MAX_TOTAL_RESULTS, RESULTS_PER_PAGE,
};
pub use error::{ApiError, ApiErrorKind, Result};
pub use types::{BoundingBox, PhotoDescriptor, SearchPage};
