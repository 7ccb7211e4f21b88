use thiserror::Error;

use crate::id::JobId;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// A job id was tracked twice. Never expected with ids from `generate_id`.
    #[error("job {0} is already tracked")]
    InvalidState(JobId),
    #[error("random source failed while generating a job id: {0}")]
    IdentifierExhaustion(String),
    #[error("no tokio runtime available to run jobs on")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, RegistryError>;
