use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("unknown agent_id: {0}")]
    UnknownAgent(String),

    #[error("tool validation error: {0}")]
    ToolValidation(String),

    #[error("tool targets a contact outside this turn's tenant")]
    TenantMismatch,

    #[error("store error: {0}")]
    Store(#[from] wabroker_store::StoreError),

    #[error("transport error: {0}")]
    Transport(#[from] wabroker_transport::TransportError),

    #[error("no transport configured for tenant {0}")]
    NoTransport(i64),

    #[error("agent invocation exceeded its deadline")]
    Timeout,

    #[error("agent error: {0}")]
    Provider(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
