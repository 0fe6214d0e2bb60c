use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("namespace '{namespace}' already in use")]
    DuplicateNamespace { namespace: String },

    #[error("schema without export")]
    OrphanSchema,

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
