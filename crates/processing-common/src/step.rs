use crate::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// How a step reacts to the failure of one of its elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessBehavior {
    /// Stop the remaining elements on the first KO.
    Blocking,
    NoBlocking,
    /// Always run, aggregated like `NoBlocking`.
    Final,
}

impl ProcessBehavior {
    pub fn stops_on(&self, status: StatusCode) -> bool {
        match self {
            ProcessBehavior::Blocking => status.is_greater_or_equal_to_ko(),
            ProcessBehavior::NoBlocking | ProcessBehavior::Final => {
                status.is_greater_or_equal_to_fatal()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistributionKind {
    Ref,
    List,
}

fn default_status_on_empty_distribution() -> StatusCode {
    StatusCode::Warning
}

/// Which elements a step operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub kind: DistributionKind,
    /// Target of a REF distribution; empty means the container itself.
    #[serde(default)]
    pub element: String,
    /// Elements of a LIST distribution.
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulk_size: Option<usize>,
    #[serde(default = "default_status_on_empty_distribution")]
    pub status_on_empty_distribution: StatusCode,
}

impl Distribution {
    pub fn reference(element: impl Into<String>) -> Self {
        Distribution {
            kind: DistributionKind::Ref,
            element: element.into(),
            items: Vec::new(),
            bulk_size: None,
            status_on_empty_distribution: default_status_on_empty_distribution(),
        }
    }

    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Distribution {
            kind: DistributionKind::List,
            element: String::new(),
            items: items.into_iter().map(Into::into).collect(),
            bulk_size: None,
            status_on_empty_distribution: default_status_on_empty_distribution(),
        }
    }

    pub fn with_bulk_size(mut self, bulk_size: usize) -> Self {
        self.bulk_size = Some(bulk_size);
        self
    }

    pub fn with_status_on_empty_distribution(mut self, status: StatusCode) -> Self {
        self.status_on_empty_distribution = status;
        self
    }
}

/// One handler invocation a worker performs for each element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub action_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<ProcessBehavior>,
}

impl Action {
    pub fn new(action_key: impl Into<String>) -> Self {
        Action {
            action_key: action_key.into(),
            behavior: None,
        }
    }
}

/// A workflow step as handed to the distributor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub step_name: String,
    pub worker_group_id: String,
    pub behavior: ProcessBehavior,
    pub distribution: Distribution,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Step {
    pub fn new(
        step_name: impl Into<String>,
        worker_group_id: impl Into<String>,
        behavior: ProcessBehavior,
        distribution: Distribution,
    ) -> Self {
        let step_name = step_name.into();
        Step {
            id: step_name.clone(),
            step_name,
            worker_group_id: worker_group_id.into(),
            behavior,
            distribution,
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }
}

/// Operator request applied to a running step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum PauseOrCancelAction {
    None = 0,
    Pause = 1,
    Cancel = 2,
}

impl PauseOrCancelAction {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PauseOrCancelAction::Pause,
            2 => PauseOrCancelAction::Cancel,
            _ => PauseOrCancelAction::None,
        }
    }
}

/// Shared control and progress state of a step in execution.
///
/// Read by consumers before executing a task and by the monitor through
/// liveness probes, so every field is atomic.
#[derive(Debug)]
pub struct StepState {
    action: AtomicU8,
    aborted: AtomicBool,
    element_to_process: AtomicU64,
    element_processed: AtomicU64,
}

impl StepState {
    pub fn new() -> Self {
        StepState {
            action: AtomicU8::new(PauseOrCancelAction::None as u8),
            aborted: AtomicBool::new(false),
            element_to_process: AtomicU64::new(0),
            element_processed: AtomicU64::new(0),
        }
    }

    pub fn pause(&self) {
        // A cancel is final, a later pause must not downgrade it.
        let _ = self.action.compare_exchange(
            PauseOrCancelAction::None as u8,
            PauseOrCancelAction::Pause as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    pub fn cancel(&self) {
        self.action
            .store(PauseOrCancelAction::Cancel as u8, Ordering::SeqCst);
    }

    /// Internal stop after an unrecoverable element failure.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn pause_or_cancel_action(&self) -> PauseOrCancelAction {
        PauseOrCancelAction::from_u8(self.action.load(Ordering::SeqCst))
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        !self.is_aborted() && self.pause_or_cancel_action() == PauseOrCancelAction::None
    }

    pub fn add_element_to_process(&self, count: u64) {
        self.element_to_process.fetch_add(count, Ordering::SeqCst);
    }

    pub fn add_element_processed(&self, count: u64) {
        self.element_processed.fetch_add(count, Ordering::SeqCst);
    }

    pub fn element_to_process(&self) -> u64 {
        self.element_to_process.load(Ordering::SeqCst)
    }

    pub fn element_processed(&self) -> u64 {
        self.element_processed.load(Ordering::SeqCst)
    }
}

impl Default for StepState {
    fn default() -> Self {
        Self::new()
    }
}

/// A step together with its live execution state.
#[derive(Debug, Clone)]
pub struct ProcessStep {
    pub step: Step,
    pub state: Arc<StepState>,
}

impl ProcessStep {
    pub fn new(step: Step) -> Self {
        ProcessStep {
            step,
            state: Arc::new(StepState::new()),
        }
    }

    pub fn pause(&self) {
        self.state.pause();
    }

    pub fn cancel(&self) {
        self.state.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }
}
