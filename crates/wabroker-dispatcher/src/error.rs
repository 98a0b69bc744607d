use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("store error: {0}")]
    Store(#[from] wabroker_store::StoreError),

    #[error("transport error: {0}")]
    Transport(#[from] wabroker_transport::TransportError),

    #[error("agent error: {0}")]
    Agent(#[from] wabroker_agent::AgentError),

    #[error("no transport configured for tenant {0}")]
    NoTransport(i64),

    #[error("contact {0} vanished between routing and dispatch")]
    ContactNotFound(i64),

    #[error("tenant {0} has no agent binding configured")]
    UnboundTenant(i64),

    #[error("agent invocation exceeded its deadline")]
    AgentTimeout,
}

pub type Result<T> = std::result::Result<T, DispatchError>;
