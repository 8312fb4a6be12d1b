use std::sync::PoisonError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// A booking rule was violated; surfaces to clients as 400.
    #[error("{0}")]
    Business(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ServiceError {
    pub fn business(message: impl Into<String>) -> Self {
        ServiceError::Business(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }
}

impl<T> From<PoisonError<T>> for ServiceError {
    fn from(_: PoisonError<T>) -> Self {
        ServiceError::Storage("database connection lock poisoned".to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
