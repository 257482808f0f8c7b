use crate::worker_registry::Worker;
use async_trait::async_trait;
use processing_common::{DescriptionStep, WorkerOutcome};
use std::time::Duration;
use thiserror::Error;

const TASKS_PATH: &str = "/worker/v1/tasks";

/// Failure to get an outcome from a remote worker
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerClientError {
    #[error("Worker {worker_id} unreachable: {reason}")]
    Unreachable { worker_id: String, reason: String },

    /// The call reached the worker and broke afterwards; the worker may still
    /// be running the task.
    #[error("Worker {worker_id} call failed: {reason}")]
    Transport { worker_id: String, reason: String },

    #[error("Worker rejected the task with status {status}")]
    Rejected { status: u16 },

    #[error("Invalid worker response: {0}")]
    InvalidResponse(String),
}

impl WorkerClientError {
    /// Whether another worker of the family may succeed where this one failed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, WorkerClientError::Unreachable { .. })
    }
}

/// Executes a step on a remote worker
#[async_trait]
pub trait WorkerClient: Send + Sync {
    async fn submit_step(
        &self,
        worker: &Worker,
        step: &DescriptionStep,
    ) -> Result<WorkerOutcome, WorkerClientError>;
}

/// Worker client speaking JSON over HTTP.
///
/// Only connecting is bounded in time: a task runs as long as its worker
/// needs.
pub struct HttpWorkerClient {
    client: reqwest::Client,
}

impl HttpWorkerClient {
    pub fn new(connect_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        HttpWorkerClient { client }
    }
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn submit_step(
        &self,
        worker: &Worker,
        step: &DescriptionStep,
    ) -> Result<WorkerOutcome, WorkerClientError> {
        let url = format!("{}{}", worker.base_url(), TASKS_PATH);
        let response = self
            .client
            .post(&url)
            .json(step)
            .send()
            .await
            .map_err(|e| {
                let worker_id = worker.worker_id.clone();
                let reason = e.to_string();
                if e.is_connect() {
                    WorkerClientError::Unreachable { worker_id, reason }
                } else {
                    WorkerClientError::Transport { worker_id, reason }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkerClientError::Rejected {
                status: status.as_u16(),
            });
        }

        response
            .json::<WorkerOutcome>()
            .await
            .map_err(|e| WorkerClientError::InvalidResponse(e.to_string()))
    }
}
