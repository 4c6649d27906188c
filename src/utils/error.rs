use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from I/O operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from JSON serialization/deserialization
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error from the outbound HTTP client
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Statistical model or scaler could not be loaded
    #[error("Model error: {0}")]
    ModelError(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for application
pub type AppResult<T> = Result<T, AppError>;
