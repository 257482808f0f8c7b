use crate::{metrics::DistributorMetrics, storage::StorageClient};
use parking_lot::Mutex;
use processing_common::{AccessRequestContext, DistributorError, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Removes access requests that are no longer needed.
///
/// Removal is best effort and at least once: an entry stays tracked until
/// the backend accepts its removal, and is retried every cycle until then.
pub struct AsyncResourceCleaner {
    storage: Arc<dyn StorageClient>,
    poll_delay: Duration,
    pending: Mutex<BTreeMap<String, AccessRequestContext>>,
    metrics: Arc<DistributorMetrics>,
}

impl AsyncResourceCleaner {
    pub fn new(
        storage: Arc<dyn StorageClient>,
        poll_delay: Duration,
        metrics: Arc<DistributorMetrics>,
    ) -> Self {
        AsyncResourceCleaner {
            storage,
            poll_delay,
            pending: Mutex::new(BTreeMap::new()),
            metrics,
        }
    }

    /// Track access requests for removal. Nothing is tracked if one of the
    /// ids already is.
    pub fn mark_async_resources_for_removal(
        &self,
        async_resources: HashMap<String, AccessRequestContext>,
    ) -> Result<()> {
        let count = async_resources.len();
        let tracked = {
            let mut pending = self.pending.lock();
            if let Some(id) = async_resources.keys().find(|id| pending.contains_key(*id)) {
                return Err(DistributorError::invalid_argument(format!(
                    "access request {} is already marked for removal",
                    id
                )));
            }
            pending.extend(async_resources);
            pending.len()
        };
        self.metrics.pending_removals.set(tracked as i64);
        debug!("Marked {} access requests for removal", count);
        Ok(())
    }

    pub fn pending_removals(&self) -> usize {
        self.pending.lock().len()
    }

    /// Try to remove every tracked access request once
    pub async fn run_cycle(&self) {
        let snapshot: Vec<(String, AccessRequestContext)> = self
            .pending
            .lock()
            .iter()
            .map(|(id, context)| (id.clone(), context.clone()))
            .collect();
        if snapshot.is_empty() {
            return;
        }

        let mut removed = 0;
        for (id, context) in snapshot {
            match self
                .storage
                .remove_access_request(&context.strategy_id, context.offer_id.as_deref(), &id, true)
                .await
            {
                Ok(()) => {
                    self.pending.lock().remove(&id);
                    self.metrics.inc_removals("ok");
                    removed += 1;
                }
                Err(e) => {
                    self.metrics.inc_removals("error");
                    warn!(
                        "Could not remove access request {} on strategy {}, will retry: {}",
                        id, context.strategy_id, e
                    );
                }
            }
        }

        let remaining = self.pending_removals();
        self.metrics.pending_removals.set(remaining as i64);
        debug!(
            "Removed {} access requests, {} still pending",
            removed, remaining
        );
    }

    /// Run cycles with a fixed delay between them until `shutdown` fires
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Async resource cleaner started (delay: {:?})", self.poll_delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_delay) => {}
                }
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = self.run_cycle() => {}
                }
            }
            info!(
                "Async resource cleaner stopped ({} removals pending)",
                self.pending_removals()
            );
        })
    }
}
