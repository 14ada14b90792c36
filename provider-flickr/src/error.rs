//! Error types for the Flickr provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Flickr search and download errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request never produced a response (DNS, connect, timeout, reset)
    #[error("Network error: {0}")]
    Transport(String),

    /// Response status outside [200, 299]
    #[error("Unexpected HTTP status {status}")]
    BadStatus { status: u16 },

    /// The response carried no bytes
    #[error("Response body was empty")]
    EmptyBody,

    /// The body is not a JSON object
    #[error("Failed to parse API response: {0}")]
    MalformedJson(String),

    /// Flickr answered with `stat` other than `"ok"`
    #[error("Flickr API error {code}: {message}")]
    RemoteError { code: i64, message: String },

    /// A required response field is absent or has the wrong type
    #[error("Missing field in API response: {field}")]
    MissingField { field: String },

    /// The chosen result page held no usable photos
    #[error("No photos found on page {page}")]
    NoResults { page: u32 },
}

/// Flat discriminant of [`ApiError`] for UI wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    Transport,
    BadStatus,
    EmptyBody,
    MalformedJson,
    RemoteError,
    MissingField,
    NoResults,
}

impl ApiError {
    pub fn kind(&self) -> ApiErrorKind {
        match self {
            ApiError::Transport(_) => ApiErrorKind::Transport,
            ApiError::BadStatus { .. } => ApiErrorKind::BadStatus,
            ApiError::EmptyBody => ApiErrorKind::EmptyBody,
            ApiError::MalformedJson(_) => ApiErrorKind::MalformedJson,
            ApiError::RemoteError { .. } => ApiErrorKind::RemoteError,
            ApiError::MissingField { .. } => ApiErrorKind::MissingField,
            ApiError::NoResults { .. } => ApiErrorKind::NoResults,
        }
    }

    pub fn is_no_results(&self) -> bool {
        matches!(self, ApiError::NoResults { .. })
    }

    /// Short message suitable for an alert or an empty-album label.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ApiErrorKind::NoResults => "No images found for this location",
            ApiErrorKind::Transport => "The network connection failed",
            ApiErrorKind::RemoteError => "The photo service rejected the request",
            ApiErrorKind::BadStatus
            | ApiErrorKind::EmptyBody
            | ApiErrorKind::MalformedJson
            | ApiErrorKind::MissingField => "The photo service returned an unexpected response",
        }
    }

    pub(crate) fn missing(field: &str) -> Self {
        ApiError::MissingField {
            field: field.to_string(),
        }
    }
}

impl From<BridgeError> for ApiError {
    fn from(error: BridgeError) -> Self {
        ApiError::Transport(error.to_string())
    }
}

/// Result type for Flickr operations
pub type Result<T> = std::result::Result<T, ApiError>;
