//! Step distribution core of the processing service.
//!
//! The binary owns one [`ProcessDistributor`] along with the worker families,
//! the async resources monitor and the cleaner it drives. Workflow engines
//! embed the library and call [`ProcessDistributor::distribute`].

pub mod cleaner;
pub mod config;
pub mod distributor;
pub mod executor;
pub mod family;
pub mod metrics;
pub mod monitor;
pub mod queue;
pub mod server;
pub mod storage;
pub mod task;
pub mod worker_client;
pub mod worker_manager;
pub mod worker_registry;

#[cfg(test)]
mod test_support;

pub use cleaner::AsyncResourceCleaner;
pub use config::DistributorConfig;
pub use distributor::ProcessDistributor;
pub use family::WorkerFamilyManager;
pub use metrics::DistributorMetrics;
pub use monitor::{AsyncResourceCallback, AsyncResourcesMonitor, LivenessChecker};
pub use queue::PriorityTaskQueue;
pub use server::{create_router, ServerState};
pub use storage::{HttpStorageClient, StorageClient, StorageClientError};
pub use task::{TaskOutcome, TaskReport, WorkerTask};
pub use worker_client::{HttpWorkerClient, WorkerClient, WorkerClientError};
pub use worker_manager::{WorkerManager, WorkerRegistration};
pub use worker_registry::{Worker, WorkerFamily};
