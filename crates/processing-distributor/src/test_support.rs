use crate::{
    metrics::DistributorMetrics,
    storage::{StorageClient, StorageClientError},
    task::{TaskReport, WorkerTask},
    worker_client::{WorkerClient, WorkerClientError},
    worker_registry::Worker,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use processing_common::{
    AccessRequestContext, AccessRequestStatus, DescriptionStep, Distribution, ItemStatus,
    ProcessBehavior, StatusCode, Step, StepState, WorkerDescription, WorkerOutcome, WorkerParameters,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

pub const FAMILY: &str = "DefaultWorker";

pub fn metrics() -> Arc<DistributorMetrics> {
    Arc::new(DistributorMetrics::new().unwrap())
}

pub fn description(name: &str, capacity: usize) -> WorkerDescription {
    WorkerDescription::new(name, FAMILY, capacity, "localhost", 8096)
}

pub fn task(
    elements: &[&str],
    state: Arc<StepState>,
    reply: mpsc::UnboundedSender<TaskReport>,
) -> WorkerTask {
    let step = Step::new(
        "STP_TEST",
        FAMILY,
        ProcessBehavior::NoBlocking,
        Distribution::list(elements.iter().copied()),
    );
    let parameters = WorkerParameters::new("container", "request")
        .object_names(elements.iter().map(|e| e.to_string()).collect());
    WorkerTask::new(FAMILY, DescriptionStep::new(step, parameters), state, reply)
}

/// Poll `condition` until it holds or the deadline passes
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

pub async fn next_report(rx: &mut mpsc::UnboundedReceiver<TaskReport>) -> Option<TaskReport> {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .ok()
        .flatten()
}

/// In-memory worker.
///
/// Elements starting with `hold` block until `release` is called, elements
/// starting with `suspend` suspend on one access request named after the
/// element the first time they run, and elements starting with `ko` or
/// `fatal` complete with that status. Workers listed in `unreachable` fail
/// to connect; workers listed in `broken` accept the call and then fail.
pub struct FakeWorkerClient {
    pub executions: Mutex<Vec<(String, Vec<String>)>>,
    pub unreachable: Mutex<HashSet<String>>,
    pub broken: Mutex<HashSet<String>>,
    suspended_once: Mutex<HashSet<String>>,
    started: Mutex<usize>,
    released: Semaphore,
}

impl Default for FakeWorkerClient {
    fn default() -> Self {
        FakeWorkerClient {
            executions: Mutex::new(Vec::new()),
            unreachable: Mutex::new(HashSet::new()),
            broken: Mutex::new(HashSet::new()),
            suspended_once: Mutex::new(HashSet::new()),
            started: Mutex::new(0),
            released: Semaphore::new(0),
        }
    }
}

impl FakeWorkerClient {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeWorkerClient::default())
    }

    pub fn release(&self, count: usize) {
        self.released.add_permits(count);
    }

    pub fn started(&self) -> usize {
        *self.started.lock()
    }

    pub fn executions_on(&self, worker_id: &str) -> usize {
        self.executions
            .lock()
            .iter()
            .filter(|(worker, _)| worker == worker_id)
            .count()
    }
}

#[async_trait]
impl WorkerClient for FakeWorkerClient {
    async fn submit_step(
        &self,
        worker: &Worker,
        step: &DescriptionStep,
    ) -> Result<WorkerOutcome, WorkerClientError> {
        *self.started.lock() += 1;
        if self.unreachable.lock().contains(&worker.worker_id) {
            return Err(WorkerClientError::Unreachable {
                worker_id: worker.worker_id.clone(),
                reason: "connection refused".to_string(),
            });
        }
        if self.broken.lock().contains(&worker.worker_id) {
            return Err(WorkerClientError::Transport {
                worker_id: worker.worker_id.clone(),
                reason: "operation timed out".to_string(),
            });
        }

        let elements = step.elements().to_vec();
        if elements.iter().any(|e| e.starts_with("hold")) {
            if let Ok(permit) = self.released.acquire().await {
                permit.forget();
            }
        }
        self.executions
            .lock()
            .push((worker.worker_id.clone(), elements.clone()));

        let suspended: HashMap<_, _> = {
            let mut suspended_once = self.suspended_once.lock();
            elements
                .iter()
                .filter(|e| e.starts_with("suspend") && suspended_once.insert(e.to_string()))
                .map(|e| {
                    (
                        format!("ar-{}", e),
                        AccessRequestContext::new("default", None),
                    )
                })
                .collect()
        };
        if !suspended.is_empty() {
            return Ok(WorkerOutcome::Suspended {
                async_resources: suspended,
            });
        }

        let status = elements.iter().fold(ItemStatus::new(&step.step.step_name), |s, e| {
            if e.starts_with("fatal") {
                s.increment(StatusCode::Fatal)
            } else if e.starts_with("ko") {
                s.increment(StatusCode::Ko)
            } else {
                s.increment(StatusCode::Ok)
            }
        });
        Ok(WorkerOutcome::Completed(status))
    }
}

/// In-memory storage backend recording every call
#[derive(Default)]
pub struct FakeStorageClient {
    pub statuses: Mutex<HashMap<String, Option<AccessRequestStatus>>>,
    pub status_calls: Mutex<Vec<(String, Option<String>, Vec<String>)>>,
    pub fail_status_checks: Mutex<usize>,
    pub removals: Mutex<Vec<(String, Option<String>, String, bool)>>,
    /// Remaining failures per access request id
    pub failing_removals: Mutex<HashMap<String, usize>>,
}

impl FakeStorageClient {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeStorageClient::default())
    }

    pub fn set_status(&self, id: &str, status: Option<AccessRequestStatus>) {
        self.statuses.lock().insert(id.to_string(), status);
    }

    pub fn status_call_count(&self) -> usize {
        self.status_calls.lock().len()
    }

    pub fn removal_calls_for(&self, id: &str) -> usize {
        self.removals
            .lock()
            .iter()
            .filter(|(_, _, removed, _)| removed == id)
            .count()
    }
}

#[async_trait]
impl StorageClient for FakeStorageClient {
    async fn check_access_request_statuses(
        &self,
        strategy_id: &str,
        offer_id: Option<&str>,
        access_request_ids: &[String],
    ) -> Result<HashMap<String, Option<AccessRequestStatus>>, StorageClientError> {
        self.status_calls.lock().push((
            strategy_id.to_string(),
            offer_id.map(str::to_string),
            access_request_ids.to_vec(),
        ));
        {
            let mut failures = self.fail_status_checks.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(StorageClientError::Unavailable("backend down".to_string()));
            }
        }
        let statuses = self.statuses.lock();
        Ok(access_request_ids
            .iter()
            .filter_map(|id| statuses.get(id).map(|status| (id.clone(), *status)))
            .collect())
    }

    async fn remove_access_request(
        &self,
        strategy_id: &str,
        offer_id: Option<&str>,
        access_request_id: &str,
        ignore_not_found: bool,
    ) -> Result<(), StorageClientError> {
        self.removals.lock().push((
            strategy_id.to_string(),
            offer_id.map(str::to_string),
            access_request_id.to_string(),
            ignore_not_found,
        ));
        let mut failing = self.failing_removals.lock();
        if let Some(remaining) = failing.get_mut(access_request_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StorageClientError::Unavailable("backend down".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use processing_common::StepState;

    #[tokio::test]
    async fn test_fake_worker_holds_until_released() {
        let client = FakeWorkerClient::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let task = task(&["hold-1"], Arc::new(StepState::new()), tx);
        let worker = Worker::new("w1", description("w1", 1));

        let call = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.submit_step(&worker, &task.description).await })
        };
        assert!(eventually(|| client.started() == 1).await);
        assert!(!call.is_finished());

        client.release(1);
        let outcome = tokio::time::timeout(Duration::from_secs(2), call)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, WorkerOutcome::Completed(_)));
        assert_eq!(client.executions_on("w1"), 1);
    }
}
