use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("contact not found: {0}")]
    ContactNotFound(i64),

    #[error("action not found: {0}")]
    ActionNotFound(i64),

    #[error("tenant mismatch: row belongs to tenant {actual}, caller is tenant {expected}")]
    TenantMismatch { expected: i64, actual: i64 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("background task panicked: {0}")]
    TaskJoin(String),
}
