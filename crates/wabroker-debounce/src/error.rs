use thiserror::Error;

#[derive(Debug, Error)]
pub enum DebounceError {
    #[error("turn queue closed")]
    QueueClosed,
}

pub type Result<T> = std::result::Result<T, DebounceError>;
