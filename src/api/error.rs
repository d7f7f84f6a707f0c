use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("unexpected response shape: {0}")]
    Shape(String),

    /// Every candidate endpoint was tried and none accepted the request.
    /// Carries the last error seen, which is what gets surfaced to the user.
    #[error("no endpoint accepted the request: {0}")]
    Exhausted(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;
