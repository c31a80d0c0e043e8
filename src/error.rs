use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Run lease '{lease}' is held by another invocation")]
    LeaseHeld { lease: String },

    #[error("Invalid value '{value}' in column {column}")]
    InvalidColumn { column: &'static str, value: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String)
}

pub type Result<T> = std::result::Result<T, ProcessorError>;
