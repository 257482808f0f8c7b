use crate::{
    metrics::DistributorMetrics,
    queue::PriorityTaskQueue,
    task::{TaskOutcome, WorkerTask},
    worker_client::WorkerClient,
    worker_registry::Worker,
};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One execution slot of a registered worker.
///
/// A worker of capacity N runs N consumers, all reading the family's shared
/// queue. Cancelling `stop` ends the consumer after its current task.
pub struct Consumer {
    pub(crate) slot: usize,
    pub(crate) worker: Worker,
    pub(crate) queue: Arc<PriorityTaskQueue<WorkerTask>>,
    pub(crate) client: Arc<dyn WorkerClient>,
    pub(crate) metrics: Arc<DistributorMetrics>,
    pub(crate) stop: CancellationToken,
}

impl Consumer {
    /// Run the consumer
    pub async fn run(self) {
        debug!(
            "Consumer {}-{} started on family {}",
            self.worker.worker_id, self.slot, self.worker.family_id
        );

        loop {
            let task = tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                taken = self.queue.take() => match taken {
                    Ok(task) => task,
                    Err(e) => {
                        warn!("Consumer {}-{} stopping: {}", self.worker.worker_id, self.slot, e);
                        break;
                    }
                },
            };
            self.metrics
                .set_queue_depth(&self.worker.family_id, self.queue.size());
            self.execute_task(task).await;
        }

        info!(
            "Consumer {}-{} of family {} stopped",
            self.worker.worker_id, self.slot, self.worker.family_id
        );
    }

    /// Execute a task on the remote worker and report the outcome
    async fn execute_task(&self, task: WorkerTask) {
        let family_id = self.worker.family_id.as_str();

        if !task.state.is_running() {
            debug!("Skipping task {}: its step is no longer running", task.id);
            self.metrics.inc_tasks_total(family_id, "interrupted");
            task.report(None, TaskOutcome::Interrupted);
            return;
        }

        debug!(
            "Executing task {} ({} elements) on worker {}",
            task.id,
            task.elements().len(),
            self.worker.worker_id
        );

        let started = Instant::now();
        let result = self.client.submit_step(&self.worker, &task.description).await;
        self.metrics
            .observe_task_duration(family_id, started.elapsed().as_secs_f64());

        let outcome = TaskOutcome::from(result);
        if let TaskOutcome::Failed(e) = &outcome {
            warn!("Task {} failed on worker {}: {}", task.id, self.worker.worker_id, e);
        }
        self.metrics.inc_tasks_total(family_id, outcome.label());
        task.report(Some(self.worker.worker_id.clone()), outcome);
    }
}
