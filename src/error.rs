//! Error types for the finance tracker

use thiserror::Error;

/// Result type alias for tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Error, Debug)]
pub enum TrackerError {

    // =============================
    // Client Errors
    // =============================

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Google token audience mismatch (received {received}, expected {expected})")]
    AudienceMismatch { received: String, expected: String },

    #[error("Identity verification failed: {0}")]
    Verification(String),

    #[error("{0}")]
    NotFound(String),

    // =============================
    // Upstream / Server Errors
    // =============================

    #[error("Model returned invalid JSON: {0}")]
    UpstreamParse(String),

    #[error("Model call failed: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Password hashing error: {0}")]
    Hashing(String),

    #[error("Token error: {0}")]
    Token(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sqlx::Error> for TrackerError {
    fn from(error: sqlx::Error) -> Self {
        TrackerError::Database(error.to_string())
    }
}

impl From<bcrypt::BcryptError> for TrackerError {
    fn from(error: bcrypt::BcryptError) -> Self {
        TrackerError::Hashing(error.to_string())
    }
}
