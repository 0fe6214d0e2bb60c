use thiserror::Error;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("invalid collection filter: {details}")]
    FilterInvalid { details: String },

    #[error("invalid mapping file: {details}")]
    MappingFileInvalid { details: String },

    #[error("type not mapped for field {field}({tag})")]
    UnknownType { field: String, tag: String },

    #[error("no sample document in collection '{collection}'")]
    EmptyCollection { collection: String },

    #[error("mapping file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] mosql_store::StoreError),

    #[error(transparent)]
    Source(#[from] mosql_source::SourceError),
}

impl From<serde_json::Error> for MappingError {
    fn from(err: serde_json::Error) -> Self {
        MappingError::MappingFileInvalid {
            details: err.to_string(),
        }
    }
}

pub type MappingResult<T> = Result<T, MappingError>;
