use crate::{metrics::DistributorMetrics, storage::StorageClient};
use parking_lot::Mutex;
use processing_common::{AccessRequestContext, DistributorError, Result};
use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Notified once a watched bulk no longer needs to wait.
///
/// Consuming the box makes a second notification impossible.
pub trait AsyncResourceCallback: Send {
    fn notify_workflow(self: Box<Self>);
}

impl<F> AsyncResourceCallback for F
where
    F: FnOnce() + Send,
{
    fn notify_workflow(self: Box<Self>) {
        (*self)()
    }
}

/// Whether the workflow owning a bulk still waits for it
pub type LivenessChecker = Arc<dyn Fn() -> bool + Send + Sync>;

struct WatchedBulk {
    request_id: String,
    bulk_id: String,
    pending: BTreeMap<String, AccessRequestContext>,
    liveness: LivenessChecker,
    callback: Box<dyn AsyncResourceCallback>,
}

/// Polls the storage backend until every access request of a bulk is
/// resolved, then notifies the bulk's callback.
///
/// A single cycle batches the pending ids of all bulks by (strategy, offer),
/// so the number of backend calls does not grow with the number of bulks.
pub struct AsyncResourcesMonitor {
    storage: Arc<dyn StorageClient>,
    batch_size: usize,
    poll_delay: Duration,
    bulks: Mutex<BTreeMap<u64, WatchedBulk>>,
    next_bulk: AtomicU64,
    metrics: Arc<DistributorMetrics>,
}

impl AsyncResourcesMonitor {
    pub fn new(
        storage: Arc<dyn StorageClient>,
        batch_size: usize,
        poll_delay: Duration,
        metrics: Arc<DistributorMetrics>,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(DistributorError::invalid_argument(
                "status check batch size must be positive",
            ));
        }
        Ok(AsyncResourcesMonitor {
            storage,
            batch_size,
            poll_delay,
            bulks: Mutex::new(BTreeMap::new()),
            next_bulk: AtomicU64::new(0),
            metrics,
        })
    }

    /// Watch the access requests of a bulk until they are all resolved or
    /// `liveness` reports that the workflow stopped waiting
    pub fn watch_async_resources_for_bulk<L, C>(
        &self,
        async_resources: HashMap<String, AccessRequestContext>,
        request_id: &str,
        bulk_id: &str,
        liveness: L,
        callback: C,
    ) -> Result<()>
    where
        L: Fn() -> bool + Send + Sync + 'static,
        C: AsyncResourceCallback + 'static,
    {
        if async_resources.is_empty() {
            return Err(DistributorError::invalid_argument(format!(
                "bulk {} of request {} has no access request to watch",
                bulk_id, request_id
            )));
        }

        let bulk = WatchedBulk {
            request_id: request_id.to_string(),
            bulk_id: bulk_id.to_string(),
            pending: async_resources.into_iter().collect(),
            liveness: Arc::new(liveness),
            callback: Box::new(callback),
        };
        let count = bulk.pending.len();
        let seq = self.next_bulk.fetch_add(1, Ordering::SeqCst);

        let watched = {
            let mut bulks = self.bulks.lock();
            bulks.insert(seq, bulk);
            bulks.len()
        };
        self.metrics.monitored_bulks.set(watched as i64);
        info!(
            "Watching {} access requests for bulk {} of request {}",
            count, bulk_id, request_id
        );
        Ok(())
    }

    /// Number of bulks still waiting
    pub fn watched_bulks(&self) -> usize {
        self.bulks.lock().len()
    }

    /// Run one polling cycle
    pub async fn run_cycle(&self) {
        let probes: Vec<(u64, LivenessChecker)> = {
            let bulks = self.bulks.lock();
            bulks
                .iter()
                .map(|(seq, bulk)| (*seq, Arc::clone(&bulk.liveness)))
                .collect()
        };
        if probes.is_empty() {
            debug!("No async resources to check");
            return;
        }

        let mut interrupted = Vec::new();
        let mut live = Vec::new();
        for (seq, liveness) in probes {
            if liveness() {
                live.push(seq);
            } else {
                interrupted.push(seq);
            }
        }
        if !interrupted.is_empty() {
            let removed = self.remove_bulks(&interrupted);
            for bulk in removed {
                info!(
                    "Workflow {} stopped waiting, releasing bulk {}",
                    bulk.request_id, bulk.bulk_id
                );
                notify(bulk);
            }
        }

        // Pending ids by backend location. Ids shared by several bulks are
        // sent once per bulk.
        let groups: BTreeMap<AccessRequestContext, Vec<(u64, String)>> = {
            let bulks = self.bulks.lock();
            let mut groups: BTreeMap<AccessRequestContext, Vec<(u64, String)>> = BTreeMap::new();
            for seq in &live {
                if let Some(bulk) = bulks.get(seq) {
                    for (id, context) in &bulk.pending {
                        groups
                            .entry(context.clone())
                            .or_default()
                            .push((*seq, id.clone()));
                    }
                }
            }
            groups
        };

        let mut resolved: Vec<(u64, String)> = Vec::new();
        for (context, entries) in &groups {
            for chunk in entries.chunks(self.batch_size) {
                resolved.extend(self.check_chunk(context, chunk).await);
            }
        }

        let done = {
            let mut bulks = self.bulks.lock();
            for (seq, id) in &resolved {
                if let Some(bulk) = bulks.get_mut(seq) {
                    bulk.pending.remove(id);
                }
            }
            let finished: Vec<u64> = bulks
                .iter()
                .filter(|(_, bulk)| bulk.pending.is_empty())
                .map(|(seq, _)| *seq)
                .collect();
            finished
                .iter()
                .filter_map(|seq| bulks.remove(seq))
                .collect::<Vec<_>>()
        };
        self.metrics.monitored_bulks.set(self.watched_bulks() as i64);

        for bulk in done {
            info!(
                "Access requests of bulk {} of request {} are available",
                bulk.bulk_id, bulk.request_id
            );
            notify(bulk);
        }
    }

    /// Check one batch. A backend failure leaves every id of the batch pending.
    async fn check_chunk(
        &self,
        context: &AccessRequestContext,
        chunk: &[(u64, String)],
    ) -> Vec<(u64, String)> {
        let ids: Vec<String> = chunk.iter().map(|(_, id)| id.clone()).collect();
        let statuses = match self
            .storage
            .check_access_request_statuses(&context.strategy_id, context.offer_id.as_deref(), &ids)
            .await
        {
            Ok(statuses) => statuses,
            Err(e) => {
                self.metrics.inc_status_checks("error");
                error!(
                    "Could not check {} access requests on strategy {}: {}",
                    ids.len(),
                    context.strategy_id,
                    e
                );
                return Vec::new();
            }
        };
        self.metrics.inc_status_checks("ok");

        chunk
            .iter()
            .filter(|(_, id)| {
                let resolved = matches!(statuses.get(id), Some(Some(status)) if status.is_resolved());
                if !resolved {
                    debug!("Access request {} not ready yet", id);
                }
                resolved
            })
            .cloned()
            .collect()
    }

    fn remove_bulks(&self, seqs: &[u64]) -> Vec<WatchedBulk> {
        let removed: Vec<WatchedBulk> = {
            let mut bulks = self.bulks.lock();
            seqs.iter().filter_map(|seq| bulks.remove(seq)).collect()
        };
        self.metrics.monitored_bulks.set(self.watched_bulks() as i64);
        removed
    }

    /// Run cycles with a fixed delay between them until `shutdown` fires
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Async resources monitor started (delay: {:?}, batch size: {})",
                self.poll_delay, self.batch_size
            );
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
            info!("Async resources monitor stopped");
        })
    }
}

fn notify(bulk: WatchedBulk) {
    let WatchedBulk {
        request_id,
        bulk_id,
        callback,
        ..
    } = bulk;
    if catch_unwind(AssertUnwindSafe(|| callback.notify_workflow())).is_err() {
        warn!(
            "Callback of bulk {} of request {} panicked",
            bulk_id, request_id
        );
    }
}
