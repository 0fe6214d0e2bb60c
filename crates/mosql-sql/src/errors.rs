use std::borrow::Cow;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DdlError {
    #[error("destination connection error: {details}")]
    Connect { details: Cow<'static, str> },

    #[error("destination DDL failed: {0}")]
    Execute(#[from] tokio_postgres::Error),

    #[error("invalid schema: {details}")]
    InvalidSchema { details: Cow<'static, str> },
}

pub type DdlResult<T> = Result<T, DdlError>;
