use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    /// The store rejected a read or write, or could not flush it.
    #[error("Persistence failure: {0}")]
    PersistFailure(#[from] sqlx::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl LibraryError {
    pub(crate) fn pin_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity_type: "Pin".to_string(),
            id: id.to_string(),
        }
    }

    pub(crate) fn photo_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity_type: "Photo".to_string(),
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;
