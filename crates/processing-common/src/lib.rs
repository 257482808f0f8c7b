mod access_request;
mod error;
mod priority;
mod status;
mod step;
mod task;
mod worker;

pub use access_request::{AccessRequestContext, AccessRequestStatus};
pub use error::{DistributorError, Result};
pub use priority::Priority;
pub use status::{ItemStatus, StatusCode, OBJECTS_LIST_EMPTY};
pub use step::{
    Action, Distribution, DistributionKind, PauseOrCancelAction, ProcessBehavior, ProcessStep,
    Step, StepState,
};
pub use task::{DescriptionStep, TaskId, WorkerOutcome, WorkerParameters};
pub use worker::{WorkerConfiguration, WorkerDescription};
