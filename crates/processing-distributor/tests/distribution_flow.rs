use async_trait::async_trait;
use parking_lot::Mutex;
use processing_common::{
    AccessRequestContext, AccessRequestStatus, DescriptionStep, Distribution, ItemStatus,
    ProcessBehavior, ProcessStep, StatusCode, Step, WorkerDescription, WorkerOutcome,
    WorkerParameters,
};
use processing_distributor::{
    AsyncResourceCleaner, AsyncResourcesMonitor, DistributorConfig, DistributorMetrics,
    ProcessDistributor, StorageClient, StorageClientError, Worker, WorkerClient,
    WorkerClientError, WorkerManager,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Worker that needs an access request for every element named `tape-*`
/// the first time it sees it.
#[derive(Default)]
struct TapeWorker {
    seen: Mutex<HashSet<String>>,
    runs: Mutex<Vec<(String, Vec<String>)>>,
}

#[async_trait]
impl WorkerClient for TapeWorker {
    async fn submit_step(
        &self,
        worker: &Worker,
        step: &DescriptionStep,
    ) -> Result<WorkerOutcome, WorkerClientError> {
        let elements = step.elements().to_vec();
        self.runs
            .lock()
            .push((worker.worker_id.clone(), elements.clone()));

        let needed: HashMap<String, AccessRequestContext> = {
            let mut seen = self.seen.lock();
            elements
                .iter()
                .filter(|e| e.starts_with("tape") && seen.insert(e.to_string()))
                .map(|e| {
                    (
                        format!("ar-{}", e),
                        AccessRequestContext::new("tape-strategy", Some("offer-tape".to_string())),
                    )
                })
                .collect()
        };
        if !needed.is_empty() {
            return Ok(WorkerOutcome::Suspended {
                async_resources: needed,
            });
        }

        Ok(WorkerOutcome::Completed(
            ItemStatus::new(&step.step.step_name).increment_by(StatusCode::Ok, elements.len() as u64),
        ))
    }
}

/// Storage where each access request becomes ready after a number of checks
#[derive(Default)]
struct TapeStorage {
    checks_before_ready: usize,
    checks: Mutex<HashMap<String, usize>>,
    removed: Mutex<Vec<String>>,
}

#[async_trait]
impl StorageClient for TapeStorage {
    async fn check_access_request_statuses(
        &self,
        _strategy_id: &str,
        _offer_id: Option<&str>,
        access_request_ids: &[String],
    ) -> Result<HashMap<String, Option<AccessRequestStatus>>, StorageClientError> {
        let mut checks = self.checks.lock();
        Ok(access_request_ids
            .iter()
            .map(|id| {
                let count = checks.entry(id.clone()).or_insert(0);
                *count += 1;
                let status = if *count > self.checks_before_ready {
                    AccessRequestStatus::Ready
                } else {
                    AccessRequestStatus::NotReady
                };
                (id.clone(), Some(status))
            })
            .collect())
    }

    async fn remove_access_request(
        &self,
        _strategy_id: &str,
        _offer_id: Option<&str>,
        access_request_id: &str,
        _ignore_not_found: bool,
    ) -> Result<(), StorageClientError> {
        self.removed.lock().push(access_request_id.to_string());
        Ok(())
    }
}

struct Service {
    worker: Arc<TapeWorker>,
    storage: Arc<TapeStorage>,
    manager: Arc<WorkerManager>,
    cleaner: Arc<AsyncResourceCleaner>,
    distributor: ProcessDistributor,
    shutdown: CancellationToken,
}

fn service(checks_before_ready: usize) -> Service {
    let config = DistributorConfig {
        poll_delay_monitor_millis: 10,
        poll_delay_cleaner_millis: 10,
        worker_bulk_size: 2,
        distributor_batch_size: 2,
        ..DistributorConfig::default()
    };
    let metrics = Arc::new(DistributorMetrics::new().unwrap());
    let worker = Arc::new(TapeWorker::default());
    let storage = Arc::new(TapeStorage {
        checks_before_ready,
        ..TapeStorage::default()
    });

    let manager = Arc::new(
        WorkerManager::new(
            config.regular_queue_capacity,
            worker.clone(),
            Arc::clone(&metrics),
        )
        .unwrap(),
    );
    let monitor = Arc::new(
        AsyncResourcesMonitor::new(
            storage.clone(),
            config.status_check_batch_size,
            config.poll_delay_monitor(),
            Arc::clone(&metrics),
        )
        .unwrap(),
    );
    let cleaner = Arc::new(AsyncResourceCleaner::new(
        storage.clone(),
        config.poll_delay_cleaner(),
        metrics,
    ));

    let shutdown = CancellationToken::new();
    Arc::clone(&monitor).spawn(shutdown.clone());
    Arc::clone(&cleaner).spawn(shutdown.clone());

    let distributor = ProcessDistributor::new(
        Arc::clone(&manager),
        monitor,
        Arc::clone(&cleaner),
        &config,
    )
    .unwrap();
    Service {
        worker,
        storage,
        manager,
        cleaner,
        distributor,
        shutdown,
    }
}

fn register(manager: &WorkerManager, family: &str, worker_id: &str, capacity: usize) {
    manager
        .register_worker_description(
            worker_id,
            WorkerDescription::new(worker_id, family, capacity, "localhost", 8096),
        )
        .unwrap();
}

fn list_step(family: &str, items: &[&str]) -> ProcessStep {
    ProcessStep::new(Step::new(
        "STP_PRESERVATION",
        family,
        ProcessBehavior::Blocking,
        Distribution::list(items.iter().copied()),
    ))
}

#[tokio::test]
async fn test_step_waits_for_tape_access_and_releases_it() {
    let service = service(2);
    register(&service.manager, "DefaultWorker", "w1", 2);
    register(&service.manager, "DefaultWorker", "w2", 1);

    let step = list_step(
        "DefaultWorker",
        &["disk-1", "tape-1", "disk-2", "disk-3", "tape-2", "disk-4", "disk-5"],
    );
    let status = tokio::time::timeout(
        Duration::from_secs(5),
        service.distributor.distribute(
            WorkerParameters::new("container", "request-1"),
            &step,
            "workflow-1",
        ),
    )
    .await
    .unwrap();

    assert_eq!(status.global_status, StatusCode::Ok);
    assert_eq!(status.count(StatusCode::Ok), 7);
    assert_eq!(step.state.element_to_process(), 7);
    assert_eq!(step.state.element_processed(), 7);

    // Every element ran once, the tape ones twice.
    let runs = service.worker.runs.lock().clone();
    let tape_runs = runs
        .iter()
        .filter(|(_, elements)| elements.iter().any(|e| e.starts_with("tape")))
        .count();
    assert_eq!(tape_runs, 4);
    assert!(runs.iter().all(|(_, elements)| elements.len() <= 2));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while service.cleaner.pending_removals() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let mut removed = service.storage.removed.lock().clone();
    removed.sort();
    assert_eq!(removed, vec!["ar-tape-1".to_string(), "ar-tape-2".to_string()]);

    service.shutdown.cancel();
    service.manager.shutdown().await;
}

#[tokio::test]
async fn test_cancelled_step_drops_waiting_tasks() {
    let service = service(usize::MAX);
    register(&service.manager, "DefaultWorker", "w1", 1);

    let step = list_step("DefaultWorker", &["tape-1", "tape-2"]);
    let canceller = {
        let step = step.clone();
        let checks = Arc::clone(&service.storage);
        tokio::spawn(async move {
            while checks.checks.lock().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            step.cancel();
        })
    };

    let status = tokio::time::timeout(
        Duration::from_secs(5),
        service.distributor.distribute(
            WorkerParameters::new("container", "request-2"),
            &step,
            "workflow-2",
        ),
    )
    .await
    .unwrap();
    canceller.await.unwrap();

    assert_eq!(step.state.element_processed(), 0);
    assert_eq!(status.count(StatusCode::Ok), 0);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while service.cleaner.pending_removals() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(service.storage.removed.lock().len(), 2);

    service.shutdown.cancel();
    service.manager.shutdown().await;
}

#[tokio::test]
async fn test_families_are_isolated() {
    let service = service(0);
    register(&service.manager, "DefaultWorker", "w1", 1);
    register(&service.manager, "BigWorker", "big1", 1);

    let default_step = list_step("DefaultWorker", &["a", "b", "c"]);
    let big_step = list_step("BigWorker", &["x", "y"]);
    let (default_status, big_status) = tokio::join!(
        service.distributor.distribute(
            WorkerParameters::new("container", "request-3"),
            &default_step,
            "workflow-3",
        ),
        service.distributor.distribute(
            WorkerParameters::new("container", "request-4"),
            &big_step,
            "workflow-4",
        ),
    );

    assert_eq!(default_status.count(StatusCode::Ok), 3);
    assert_eq!(big_status.count(StatusCode::Ok), 2);
    let runs = service.worker.runs.lock().clone();
    assert!(runs
        .iter()
        .filter(|(worker, _)| worker == "big1")
        .all(|(_, elements)| elements.iter().all(|e| e == "x" || e == "y")));

    service.shutdown.cancel();
    service.manager.shutdown().await;
}
