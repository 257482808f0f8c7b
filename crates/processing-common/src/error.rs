use thiserror::Error;

/// Caller-facing failures of the distribution core.
///
/// These are returned synchronously at registration or submission time and
/// are never retried automatically. Backend failures met while polling or
/// cleaning up are absorbed by the background loops and never show up here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DistributorError {
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Worker family not found: {0}")]
    FamilyNotFound(String),

    #[error("Worker not found: {worker_id} in family {family_id}")]
    WorkerNotFound { family_id: String, worker_id: String },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Queue closed")]
    QueueClosed,
}

impl DistributorError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        DistributorError::BadRequest(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        DistributorError::InvalidArgument(message.into())
    }
}

impl From<serde_json::Error> for DistributorError {
    fn from(err: serde_json::Error) -> Self {
        DistributorError::BadRequest(format!("Malformed worker description: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, DistributorError>;
