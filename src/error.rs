use thiserror::Error;

/// Failures raised by the tag engine and catalog.
///
/// `NotFound` and `InvalidArgument` are always reported before any statement
/// mutates the workspace; `Persistence` may surface mid-transaction, in which
/// case the enclosing transaction is rolled back when dropped.
#[derive(Debug, Error)]
pub enum TagError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("database error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TagError {
    pub fn not_found(what: impl Into<String>) -> Self {
        TagError::NotFound(what.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        TagError::InvalidArgument(message.into())
    }

    /// Stable code used in the IPC error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            TagError::NotFound(_) => "not_found",
            TagError::InvalidArgument(_) => "bad_params",
            TagError::Persistence(_) | TagError::Serialization(_) => "db_failed",
        }
    }
}

pub type TagResult<T> = Result<T, TagError>;
