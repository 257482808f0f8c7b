use crate::{
    executor::Consumer,
    metrics::DistributorMetrics,
    queue::PriorityTaskQueue,
    task::WorkerTask,
    worker_client::WorkerClient,
    worker_registry::{Worker, WorkerFamily, WorkerRegistry},
};
use processing_common::{DistributorError, Result, WorkerDescription};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

/// Shared queue and consumer pool of one worker family.
///
/// Every registered worker contributes `capacity` consumers reading the same
/// queue. Tasks are never bound to a worker: unregistering one only stops
/// its consumers, and whatever is queued is drained by the others. A family
/// without workers keeps accepting tasks, which wait until a worker
/// registers again.
pub struct WorkerFamilyManager {
    family_id: String,
    queue: Arc<PriorityTaskQueue<WorkerTask>>,
    workers: WorkerRegistry,
    consumers: TaskTracker,
    client: Arc<dyn WorkerClient>,
    metrics: Arc<DistributorMetrics>,
}

impl WorkerFamilyManager {
    pub fn new(
        family_id: impl Into<String>,
        queue_capacity: usize,
        client: Arc<dyn WorkerClient>,
        metrics: Arc<DistributorMetrics>,
    ) -> Result<Self> {
        Ok(WorkerFamilyManager {
            family_id: family_id.into(),
            queue: Arc::new(PriorityTaskQueue::new(queue_capacity)?),
            workers: WorkerRegistry::new(),
            consumers: TaskTracker::new(),
            client,
            metrics,
        })
    }

    pub fn family_id(&self) -> &str {
        &self.family_id
    }

    /// Register a worker and start its consumers
    pub fn register_worker(&self, worker_id: &str, description: WorkerDescription) -> Result<Worker> {
        description.validate()?;
        if description.family != self.family_id {
            return Err(DistributorError::bad_request(format!(
                "worker {} belongs to family {}, not {}",
                worker_id, description.family, self.family_id
            )));
        }

        let worker = Worker::new(worker_id, description);
        let stop = CancellationToken::new();
        self.workers.register(worker.clone(), stop.clone())?;

        for slot in 0..worker.capacity {
            let consumer = Consumer {
                slot,
                worker: worker.clone(),
                queue: Arc::clone(&self.queue),
                client: Arc::clone(&self.client),
                metrics: Arc::clone(&self.metrics),
                stop: stop.clone(),
            };
            self.consumers.spawn(consumer.run());
        }

        self.metrics
            .set_workers_registered(&self.family_id, self.workers.count());
        info!(
            "Registered worker {} in family {} (capacity: {})",
            worker.worker_id, self.family_id, worker.capacity
        );
        Ok(worker)
    }

    /// Stop a worker's consumers. Queued tasks stay in the shared queue.
    pub fn unregister_worker(&self, worker_id: &str) -> Result<Worker> {
        let worker = self
            .workers
            .deregister(worker_id)
            .ok_or_else(|| DistributorError::WorkerNotFound {
                family_id: self.family_id.clone(),
                worker_id: worker_id.to_string(),
            })?;

        self.metrics
            .set_workers_registered(&self.family_id, self.workers.count());
        info!(
            "Unregistered worker {} from family {} ({} tasks queued)",
            worker_id,
            self.family_id,
            self.queue.size()
        );
        Ok(worker)
    }

    /// Queue a task in the lane of its priority, waiting while the regular
    /// lane is full
    pub async fn submit_job(&self, task: WorkerTask) -> Result<()> {
        debug!("Submitting task {} to family {}", task.id, self.family_id);
        let priority = task.priority;
        self.queue.add_entry(task, priority).await?;
        self.metrics.set_queue_depth(&self.family_id, self.queue.size());
        Ok(())
    }

    /// Queue a task in the high lane without waiting
    pub fn submit_high_priority_job(&self, task: WorkerTask) -> Result<()> {
        debug!("Resubmitting task {} to family {}", task.id, self.family_id);
        self.queue.add_high_priority_entry(task.promote())?;
        self.metrics.set_queue_depth(&self.family_id, self.queue.size());
        Ok(())
    }

    pub fn workers(&self) -> Vec<Worker> {
        self.workers.all_workers()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.count()
    }

    pub fn queue_size(&self) -> usize {
        self.queue.size()
    }

    pub fn snapshot(&self) -> WorkerFamily {
        WorkerFamily {
            family_id: self.family_id.clone(),
            workers: self.workers(),
            queue_size: self.queue_size(),
        }
    }

    /// Stop every consumer and wait for in-flight tasks to finish
    pub async fn shutdown(&self) {
        let stopped = self.workers.deregister_all();
        self.queue.close();
        self.consumers.close();
        self.consumers.wait().await;
        self.metrics.set_workers_registered(&self.family_id, 0);
        info!(
            "Family {} shut down ({} workers stopped)",
            self.family_id,
            stopped.len()
        );
    }
}
