use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Domain error taxonomy. Every variant is deterministic for a given input;
/// nothing here is retryable except the underlying database errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("property '{0}' not found in schema")]
    UnknownField(String),

    #[error("property '{0}' must contain a valid value")]
    MissingRequiredField(String),

    #[error("empty fields should not be sent, property '{0}' is empty")]
    EmptyField(String),

    #[error("valid update parameters not found")]
    EmptyUpdate,

    #[error("property '{0}' cannot be updated")]
    NonUpdatableField(String),

    #[error("property 'message_type' must contain a valid value, {0} received")]
    InvalidMessageType(String),

    #[error("cannot set 'related_message' as '{0}' is an invalid value")]
    InvalidRelatedMessage(String),

    #[error("property '{field}' is not a valid timestamp: {value}")]
    InvalidTimestamp { field: String, value: String },

    #[error("cannot set '{field}': invalid value")]
    InvalidFieldValue { field: String },

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    /// HTTP status the embedding request layer should map this error to.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::UnknownField(_)
            | AppError::MissingRequiredField(_)
            | AppError::EmptyField(_)
            | AppError::EmptyUpdate
            | AppError::NonUpdatableField(_)
            | AppError::InvalidMessageType(_)
            | AppError::InvalidRelatedMessage(_)
            | AppError::InvalidTimestamp { .. }
            | AppError::InvalidFieldValue { .. } => 400,
            AppError::Forbidden => 403,
            AppError::NotFound => 404,
            AppError::Config(_) | AppError::Database(_) => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }
}
