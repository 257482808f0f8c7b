use crate::{AccessRequestContext, ItemStatus, Step};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier of a task sent to a worker family
pub type TaskId = Uuid;

/// Workflow context a worker needs to process a batch of elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerParameters {
    pub container_name: String,
    pub request_id: String,
    #[serde(default)]
    pub logbook_type_process: String,
    /// Elements this invocation operates on.
    #[serde(default)]
    pub object_names: Vec<String>,
}

impl WorkerParameters {
    pub fn new(container_name: impl Into<String>, request_id: impl Into<String>) -> Self {
        WorkerParameters {
            container_name: container_name.into(),
            request_id: request_id.into(),
            logbook_type_process: String::new(),
            object_names: Vec::new(),
        }
    }

    pub fn logbook_type_process(mut self, logbook_type_process: impl Into<String>) -> Self {
        self.logbook_type_process = logbook_type_process.into();
        self
    }

    pub fn object_names(mut self, object_names: Vec<String>) -> Self {
        self.object_names = object_names;
        self
    }
}

/// Payload posted to a remote worker: one step applied to some elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptionStep {
    pub step: Step,
    pub parameters: WorkerParameters,
}

impl DescriptionStep {
    pub fn new(step: Step, parameters: WorkerParameters) -> Self {
        DescriptionStep { step, parameters }
    }

    pub fn elements(&self) -> &[String] {
        &self.parameters.object_names
    }
}

/// What a worker reports after handling a `DescriptionStep`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerOutcome {
    /// The elements were processed.
    Completed(ItemStatus),
    /// The elements wait on storage access requests. The worker thread is
    /// released and the task is resumed once every request is resolved.
    #[serde(rename_all = "camelCase")]
    Suspended {
        async_resources: HashMap<String, AccessRequestContext>,
    },
}

impl WorkerOutcome {
    pub fn is_suspended(&self) -> bool {
        matches!(self, WorkerOutcome::Suspended { .. })
    }
}
