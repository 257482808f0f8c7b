use crate::worker_client::WorkerClientError;
use processing_common::{
    AccessRequestContext, DescriptionStep, ItemStatus, Priority, StepState, TaskId, WorkerOutcome,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// A batch of elements of one step, queued in a worker family.
///
/// The task travels back to its distributor inside a `TaskReport`, so it can
/// be retried or resumed without being rebuilt.
#[derive(Debug)]
pub struct WorkerTask {
    pub id: TaskId,
    pub family_id: String,
    pub priority: Priority,
    pub description: DescriptionStep,
    pub state: Arc<StepState>,
    /// Recoverable failures met so far
    pub attempt: u32,
    /// Access requests the task waited on before being resumed
    pub async_resources: HashMap<String, AccessRequestContext>,
    reply: mpsc::UnboundedSender<TaskReport>,
}

impl WorkerTask {
    pub fn new(
        family_id: impl Into<String>,
        description: DescriptionStep,
        state: Arc<StepState>,
        reply: mpsc::UnboundedSender<TaskReport>,
    ) -> Self {
        WorkerTask {
            id: Uuid::new_v4(),
            family_id: family_id.into(),
            priority: Priority::Regular,
            description,
            state,
            attempt: 0,
            async_resources: HashMap::new(),
            reply,
        }
    }

    pub fn elements(&self) -> &[String] {
        self.description.elements()
    }

    /// Requeue as high priority, for retries and resumptions
    pub fn promote(mut self) -> Self {
        self.priority = Priority::High;
        self
    }

    /// Hand the task back to its distributor
    pub fn report(self, worker_id: Option<String>, outcome: TaskOutcome) {
        let reply = self.reply.clone();
        let task_id = self.id;
        let report = TaskReport {
            task: self,
            worker_id,
            outcome,
        };
        if reply.send(report).is_err() {
            debug!("Distributor of task {} is gone, dropping report", task_id);
        }
    }
}

/// What happened to a task taken from a family queue
#[derive(Debug)]
pub enum TaskOutcome {
    Completed(ItemStatus),
    Suspended(HashMap<String, AccessRequestContext>),
    Failed(WorkerClientError),
    /// Skipped because its step stopped running
    Interrupted,
}

impl TaskOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Completed(_) => "completed",
            TaskOutcome::Suspended(_) => "suspended",
            TaskOutcome::Failed(_) => "failed",
            TaskOutcome::Interrupted => "interrupted",
        }
    }
}

impl From<Result<WorkerOutcome, WorkerClientError>> for TaskOutcome {
    fn from(result: Result<WorkerOutcome, WorkerClientError>) -> Self {
        match result {
            Ok(WorkerOutcome::Completed(status)) => TaskOutcome::Completed(status),
            Ok(WorkerOutcome::Suspended { async_resources }) => {
                TaskOutcome::Suspended(async_resources)
            }
            Err(e) => TaskOutcome::Failed(e),
        }
    }
}

#[derive(Debug)]
pub struct TaskReport {
    pub task: WorkerTask,
    /// Worker that handled the task, if any did
    pub worker_id: Option<String>,
    pub outcome: TaskOutcome,
}
