use thiserror::Error;

/// Errors raised while resolving an inbound event's tenant binding (spec §4.2).
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("unknown destination MSISDN: {destination}")]
    Unroutable { destination: String },
}

pub type Result<T> = std::result::Result<T, RouterError>;
