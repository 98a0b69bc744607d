use thiserror::Error;

/// Errors surfaced by a `MessagingTransport` implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("BSP API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),
}
