use thiserror::Error;

/// Error taxonomy shared at the boundary between crates (§7). Crate-local
/// collaborators (Store, Transport, Router, Dispatcher, Agent registry) own
/// narrower error enums and convert into this one at the ingress/worker
/// boundary where a stable, client-facing code is needed.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown destination MSISDN: {destination}")]
    Unroutable { destination: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authorization failed: {0}")]
    AuthFailed(String),

    #[error("Tenant mismatch: expected {expected}, got {actual}")]
    TenantMismatch { expected: String, actual: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Quota exceeded for tenant {tenant_id}")]
    QuotaExceeded { tenant_id: String },

    #[error("Queue full")]
    QueueFull,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Request timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BrokerError {
    /// Short machine-readable code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            BrokerError::Config(_) => "CONFIG_ERROR",
            BrokerError::Unroutable { .. } => "UNROUTABLE",
            BrokerError::Validation(_) => "VALIDATION_ERROR",
            BrokerError::AuthFailed(_) => "AUTH_FAILED",
            BrokerError::TenantMismatch { .. } => "TENANT_MISMATCH",
            BrokerError::Store(_) => "STORE_ERROR",
            BrokerError::Transport(_) => "TRANSPORT_ERROR",
            BrokerError::Agent(_) => "AGENT_ERROR",
            BrokerError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            BrokerError::QueueFull => "QUEUE_FULL",
            BrokerError::Serialization(_) => "SERIALIZATION_ERROR",
            BrokerError::Io(_) => "IO_ERROR",
            BrokerError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            BrokerError::Timeout { .. } => "TIMEOUT",
            BrokerError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;
