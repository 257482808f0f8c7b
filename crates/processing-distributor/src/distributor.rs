use crate::{
    cleaner::AsyncResourceCleaner,
    config::DistributorConfig,
    monitor::AsyncResourcesMonitor,
    task::{TaskOutcome, TaskReport, WorkerTask},
    worker_manager::WorkerManager,
};
use processing_common::{
    AccessRequestContext, DescriptionStep, DistributionKind, ItemStatus, ProcessStep, Result,
    StatusCode, WorkerParameters, OBJECTS_LIST_EMPTY,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Splits a workflow step into tasks and drives them through the worker
/// family of the step until every task is settled.
pub struct ProcessDistributor {
    worker_manager: Arc<WorkerManager>,
    monitor: Arc<AsyncResourcesMonitor>,
    cleaner: Arc<AsyncResourceCleaner>,
    worker_bulk_size: usize,
    batch_size: usize,
    element_retry_limit: u32,
}

impl ProcessDistributor {
    pub fn new(
        worker_manager: Arc<WorkerManager>,
        monitor: Arc<AsyncResourcesMonitor>,
        cleaner: Arc<AsyncResourceCleaner>,
        config: &DistributorConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(ProcessDistributor {
            worker_manager,
            monitor,
            cleaner,
            worker_bulk_size: config.worker_bulk_size,
            batch_size: config.distributor_batch_size,
            element_retry_limit: config.element_retry_limit,
        })
    }

    pub fn worker_manager(&self) -> &Arc<WorkerManager> {
        &self.worker_manager
    }

    /// Run a step over its elements and return its aggregated status.
    ///
    /// Tasks are submitted in waves of `distributor_batch_size`; each wave
    /// settles before the next starts, and no new wave starts once the step
    /// is paused, cancelled or aborted.
    pub async fn distribute(
        &self,
        parameters: WorkerParameters,
        step: &ProcessStep,
        workflow_id: &str,
    ) -> ItemStatus {
        let definition = &step.step;
        let mut responses = ItemStatus::new(&definition.step_name);

        let elements = match definition.distribution.kind {
            DistributionKind::Ref => {
                let element = definition.distribution.element.trim();
                if element.is_empty() {
                    vec![parameters.container_name.clone()]
                } else {
                    vec![element.to_string()]
                }
            }
            DistributionKind::List => definition.distribution.items.clone(),
        };

        if elements.is_empty() {
            info!("Step {} has no element to process", definition.step_name);
            responses.set_items_status(
                OBJECTS_LIST_EMPTY,
                ItemStatus::new(OBJECTS_LIST_EMPTY)
                    .increment(definition.distribution.status_on_empty_distribution),
            );
            return responses;
        }

        let family_id = definition.worker_group_id.as_str();
        if self.worker_manager.find_family(family_id).is_none() {
            error!("No worker family found for {}", family_id);
            return responses.increment(StatusCode::Fatal);
        }

        step.state.add_element_to_process(elements.len() as u64);
        let bulk_size = definition
            .distribution
            .bulk_size
            .filter(|size| *size > 0)
            .unwrap_or(self.worker_bulk_size);
        info!(
            "Distributing {} elements of step {} to family {} (bulk size: {})",
            elements.len(),
            definition.step_name,
            family_id,
            bulk_size
        );

        for wave in elements.chunks(bulk_size * self.batch_size) {
            if !step.is_running() {
                info!(
                    "Step {} stopped ({:?}), no further task submitted",
                    definition.step_name,
                    step.state.pause_or_cancel_action()
                );
                break;
            }

            // Once submitted, only the tasks of the wave hold a sender.
            let (reply, mut reports) = mpsc::unbounded_channel();
            let mut outstanding = 0usize;
            for chunk in wave.chunks(bulk_size) {
                let description = DescriptionStep::new(
                    definition.clone(),
                    parameters.clone().object_names(chunk.to_vec()),
                );
                let task = WorkerTask::new(
                    family_id,
                    description,
                    Arc::clone(&step.state),
                    reply.clone(),
                );
                if let Err(e) = self.worker_manager.submit_job(task, family_id).await {
                    error!("Could not submit task of step {}: {}", definition.step_name, e);
                    self.fail(&mut responses, step, &e.to_string());
                    break;
                }
                outstanding += 1;
            }

            drop(reply);

            while outstanding > 0 {
                let Some(report) = reports.recv().await else {
                    error!(
                        "{} tasks of step {} were dropped before completion",
                        outstanding, definition.step_name
                    );
                    self.fail(&mut responses, step, "tasks dropped before completion");
                    break;
                };
                if self.handle_report(report, step, workflow_id, &mut responses) {
                    outstanding -= 1;
                }
            }
        }

        info!(
            "Step {} distributed: {} ({} of {} elements processed)",
            definition.step_name,
            responses.global_status.as_str(),
            step.state.element_processed(),
            step.state.element_to_process()
        );
        responses
    }

    /// Apply a task report. Returns whether the task is settled, as opposed
    /// to resubmitted or waiting on async resources.
    fn handle_report(
        &self,
        report: TaskReport,
        step: &ProcessStep,
        workflow_id: &str,
        responses: &mut ItemStatus,
    ) -> bool {
        let TaskReport {
            mut task,
            worker_id,
            outcome,
        } = report;

        match outcome {
            TaskOutcome::Completed(status) => {
                if !matches!(status.global_status, StatusCode::Unknown | StatusCode::Fatal) {
                    step.state.add_element_processed(task.elements().len() as u64);
                }
                if step.step.behavior.stops_on(status.global_status) {
                    warn!(
                        "Task {} of step {} ended {}, stopping the step",
                        task.id,
                        step.step.step_name,
                        status.global_status.as_str()
                    );
                    step.state.abort();
                }
                responses.merge(&status);
                self.release_async_resources(&mut task);
                true
            }
            TaskOutcome::Suspended(async_resources) => {
                self.suspend(task, async_resources, step, workflow_id, responses)
            }
            TaskOutcome::Failed(e) if e.is_recoverable() => {
                if let Some(worker_id) = worker_id {
                    match self
                        .worker_manager
                        .unregister_worker(&task.family_id, &worker_id)
                    {
                        Ok(_) => warn!("Worker {} is unreachable and was unregistered", worker_id),
                        Err(e) => debug!("Worker {} already gone: {}", worker_id, e),
                    }
                }

                task.attempt += 1;
                if task.attempt > self.element_retry_limit {
                    error!("Task {} failed {} times, giving up", task.id, task.attempt);
                    self.fail(responses, step, &e.to_string());
                    self.release_async_resources(&mut task);
                    return true;
                }

                debug!("Retrying task {} (attempt {})", task.id, task.attempt);
                let family_id = task.family_id.clone();
                match self.worker_manager.submit_high_priority_job(task, &family_id) {
                    Ok(()) => false,
                    Err(e) => {
                        self.fail(responses, step, &e.to_string());
                        true
                    }
                }
            }
            TaskOutcome::Failed(e) => {
                self.fail(responses, step, &e.to_string());
                self.release_async_resources(&mut task);
                true
            }
            TaskOutcome::Interrupted => {
                self.release_async_resources(&mut task);
                true
            }
        }
    }

    /// Park a task until its access requests are resolved. Returns whether
    /// the task is settled.
    fn suspend(
        &self,
        mut task: WorkerTask,
        async_resources: HashMap<String, AccessRequestContext>,
        step: &ProcessStep,
        workflow_id: &str,
        responses: &mut ItemStatus,
    ) -> bool {
        let family_id = task.family_id.clone();
        if async_resources.is_empty() {
            return match self.worker_manager.submit_high_priority_job(task, &family_id) {
                Ok(()) => false,
                Err(e) => {
                    error!("Could not resume task: {}", e);
                    self.fail(responses, step, &e.to_string());
                    true
                }
            };
        }

        task.async_resources.extend(async_resources.clone());
        let bulk_id = task.id.to_string();
        let state = Arc::clone(&task.state);
        let manager = Arc::clone(&self.worker_manager);
        debug!(
            "Task {} waits on {} access requests",
            bulk_id,
            async_resources.len()
        );

        let watched = self.monitor.watch_async_resources_for_bulk(
            async_resources,
            workflow_id,
            &bulk_id,
            move || state.is_running(),
            move || {
                if let Err(e) = manager.submit_high_priority_job(task, &family_id) {
                    error!("Could not resume task in family {}: {}", family_id, e);
                }
            },
        );
        match watched {
            Ok(()) => false,
            Err(e) => {
                error!("Could not watch access requests of task {}: {}", bulk_id, e);
                self.fail(responses, step, &e.to_string());
                true
            }
        }
    }

    fn fail(&self, responses: &mut ItemStatus, step: &ProcessStep, detail: &str) {
        responses.set_items_status(
            &step.step.step_name,
            ItemStatus::new(&step.step.step_name)
                .increment(StatusCode::Fatal)
                .with_detail(detail),
        );
        step.state.abort();
    }

    fn release_async_resources(&self, task: &mut WorkerTask) {
        if task.async_resources.is_empty() {
            return;
        }
        let resources = std::mem::take(&mut task.async_resources);
        if let Err(e) = self.cleaner.mark_async_resources_for_removal(resources) {
            warn!("Access requests of task {} not released: {}", task.id, e);
        }
    }
}
