use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use processing_common::{DistributorError, Result, WorkerDescription};
use serde::Serialize;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// A remote worker registered in a family
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub worker_id: String,
    pub family_id: String,
    pub capacity: usize,
    pub description: WorkerDescription,
    pub registered_at: DateTime<Utc>,
}

impl Worker {
    pub fn new(worker_id: impl Into<String>, description: WorkerDescription) -> Self {
        Worker {
            worker_id: worker_id.into(),
            family_id: description.family.clone(),
            capacity: description.capacity,
            description,
            registered_at: Utc::now(),
        }
    }

    /// Base URL of the worker's HTTP endpoint
    pub fn base_url(&self) -> String {
        self.description.configuration.base_url()
    }
}

/// Snapshot of a worker family, for introspection
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerFamily {
    pub family_id: String,
    pub workers: Vec<Worker>,
    pub queue_size: usize,
}

struct RegisteredWorker {
    worker: Worker,
    stop: CancellationToken,
}

/// Workers of one family, each with the token stopping its consumers
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, RegisteredWorker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        WorkerRegistry {
            workers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a worker, failing if its id is already taken
    pub fn register(&self, worker: Worker, stop: CancellationToken) -> Result<()> {
        let mut workers = self.workers.write();
        if workers.contains_key(&worker.worker_id) {
            return Err(DistributorError::AlreadyExists(format!(
                "worker {} in family {}",
                worker.worker_id, worker.family_id
            )));
        }
        workers.insert(worker.worker_id.clone(), RegisteredWorker { worker, stop });
        Ok(())
    }

    /// Remove a worker and cancel its stop token
    pub fn deregister(&self, worker_id: &str) -> Option<Worker> {
        let registered = self.workers.write().remove(worker_id)?;
        registered.stop.cancel();
        Some(registered.worker)
    }

    /// Remove every worker, cancelling their tokens
    pub fn deregister_all(&self) -> Vec<Worker> {
        let drained: Vec<RegisteredWorker> =
            self.workers.write().drain().map(|(_, w)| w).collect();
        drained
            .into_iter()
            .map(|registered| {
                registered.stop.cancel();
                registered.worker
            })
            .collect()
    }

    pub fn get(&self, worker_id: &str) -> Option<Worker> {
        self.workers
            .read()
            .get(worker_id)
            .map(|registered| registered.worker.clone())
    }

    /// Get all workers, oldest registration first
    pub fn all_workers(&self) -> Vec<Worker> {
        let mut workers: Vec<Worker> = self
            .workers
            .read()
            .values()
            .map(|registered| registered.worker.clone())
            .collect();
        workers.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.worker_id.cmp(&b.worker_id))
        });
        workers
    }

    pub fn count(&self) -> usize {
        self.workers.read().len()
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
