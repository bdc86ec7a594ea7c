use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid version stamp: {0}")]
    InvalidVersion(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}
