use crate::{
    family::WorkerFamilyManager,
    metrics::DistributorMetrics,
    task::WorkerTask,
    worker_client::WorkerClient,
    worker_registry::{Worker, WorkerFamily},
};
use parking_lot::RwLock;
use processing_common::{DistributorError, Result, WorkerDescription};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// A registration entry of a workers file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRegistration {
    pub worker_id: String,
    pub description: WorkerDescription,
}

/// Registry of every worker family of the process.
///
/// Built once by the application root and shared with the distributor.
/// Families are created on the first registration of one of their workers
/// and are kept afterwards, even without workers.
pub struct WorkerManager {
    families: RwLock<HashMap<String, Arc<WorkerFamilyManager>>>,
    queue_capacity: usize,
    client: Arc<dyn WorkerClient>,
    metrics: Arc<DistributorMetrics>,
}

impl WorkerManager {
    pub fn new(
        queue_capacity: usize,
        client: Arc<dyn WorkerClient>,
        metrics: Arc<DistributorMetrics>,
    ) -> Result<Self> {
        if queue_capacity == 0 {
            return Err(DistributorError::invalid_argument(
                "regular queue capacity must be positive",
            ));
        }
        Ok(WorkerManager {
            families: RwLock::new(HashMap::new()),
            queue_capacity,
            client,
            metrics,
        })
    }

    pub fn metrics(&self) -> &Arc<DistributorMetrics> {
        &self.metrics
    }

    /// Register a worker from its JSON descriptor
    pub fn register_worker(
        &self,
        family_id: &str,
        worker_id: &str,
        description_json: &str,
    ) -> Result<Worker> {
        let description = WorkerDescription::parse(description_json)?;
        if description.family != family_id {
            return Err(DistributorError::bad_request(format!(
                "worker {} declares family {} but was registered in {}",
                worker_id, description.family, family_id
            )));
        }
        self.register_worker_description(worker_id, description)
    }

    /// Register a worker, creating its family if needed
    pub fn register_worker_description(
        &self,
        worker_id: &str,
        description: WorkerDescription,
    ) -> Result<Worker> {
        description.validate()?;
        let family = self.find_or_create_family(&description.family)?;
        family.register_worker(worker_id, description)
    }

    /// Register every entry, stopping at the first failure
    pub fn register_all(&self, registrations: Vec<WorkerRegistration>) -> Result<usize> {
        let count = registrations.len();
        for registration in registrations {
            self.register_worker_description(&registration.worker_id, registration.description)?;
        }
        Ok(count)
    }

    pub fn unregister_worker(&self, family_id: &str, worker_id: &str) -> Result<Worker> {
        let family = self
            .find_family(family_id)
            .ok_or_else(|| DistributorError::FamilyNotFound(family_id.to_string()))?;
        family.unregister_worker(worker_id)
    }

    /// Queue a task in a family, waiting while its regular lane is full
    pub async fn submit_job(&self, task: WorkerTask, family_id: &str) -> Result<()> {
        let family = self.find_family(family_id).ok_or_else(|| {
            DistributorError::bad_request(format!("no queue for worker family {}", family_id))
        })?;
        family.submit_job(task).await
    }

    /// Queue a task in the high lane of a family without waiting
    pub fn submit_high_priority_job(&self, task: WorkerTask, family_id: &str) -> Result<()> {
        let family = self.find_family(family_id).ok_or_else(|| {
            DistributorError::bad_request(format!("no queue for worker family {}", family_id))
        })?;
        family.submit_high_priority_job(task)
    }

    pub fn find_family(&self, family_id: &str) -> Option<Arc<WorkerFamilyManager>> {
        self.families.read().get(family_id).cloned()
    }

    fn find_or_create_family(&self, family_id: &str) -> Result<Arc<WorkerFamilyManager>> {
        if let Some(family) = self.find_family(family_id) {
            return Ok(family);
        }

        let mut families = self.families.write();
        if let Some(family) = families.get(family_id) {
            return Ok(Arc::clone(family));
        }
        let family = Arc::new(WorkerFamilyManager::new(
            family_id,
            self.queue_capacity,
            Arc::clone(&self.client),
            Arc::clone(&self.metrics),
        )?);
        families.insert(family_id.to_string(), Arc::clone(&family));
        info!("Created worker family {}", family_id);
        Ok(family)
    }

    /// Snapshot of every family and its workers, sorted by family id
    pub fn get_workers_list(&self) -> Vec<WorkerFamily> {
        let families: Vec<Arc<WorkerFamilyManager>> =
            self.families.read().values().cloned().collect();
        let mut snapshot: Vec<WorkerFamily> = families.iter().map(|f| f.snapshot()).collect();
        snapshot.sort_by(|a, b| a.family_id.cmp(&b.family_id));
        snapshot
    }

    /// Stop every family
    pub async fn shutdown(&self) {
        let families: Vec<Arc<WorkerFamilyManager>> =
            self.families.read().values().cloned().collect();
        for family in families {
            family.shutdown().await;
        }
    }
}
