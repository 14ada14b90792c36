use core_library::{LibraryError, PinId};
use provider_flickr::ApiError;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// A fetch for this pin is already running
    #[error("A photo fetch is already in progress for pin {pin_id}")]
    AlreadyInFlight { pin_id: PinId },

    #[error("Photo search failed for pin {pin_id}: {source}")]
    Search {
        pin_id: PinId,
        #[source]
        source: ApiError,
    },

    #[error("Image download failed: {0}")]
    Download(ApiError),

    #[error("Repository error: {0}")]
    Repository(#[from] LibraryError),

    /// The pin was deleted before its photos could be stored
    #[error("Pin {pin_id} no longer exists")]
    PinGone { pin_id: PinId },

    /// Failure of a download this caller joined rather than started
    #[error("{0}")]
    Shared(Arc<ServiceError>),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),
}

impl ServiceError {
    /// The underlying API failure, if any, for choosing UI wording.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            ServiceError::Search { source, .. } => Some(source),
            ServiceError::Download(error) => Some(error),
            ServiceError::Shared(inner) => inner.api_error(),
            _ => None,
        }
    }

    pub fn is_already_in_flight(&self) -> bool {
        matches!(self, ServiceError::AlreadyInFlight { .. })
    }

    pub fn is_pin_gone(&self) -> bool {
        match self {
            ServiceError::PinGone { .. } => true,
            ServiceError::Shared(inner) => inner.is_pin_gone(),
            _ => false,
        }
    }

    /// Unwrap a shared download failure when this caller holds the last reference.
    pub(crate) fn from_shared(error: Arc<ServiceError>) -> Self {
        Arc::try_unwrap(error).unwrap_or_else(ServiceError::Shared)
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
