use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

/// Prometheus metrics for the distributor
pub struct DistributorMetrics {
    pub registry: Registry,

    // Task outcomes per family
    pub tasks_total: CounterVec,
    pub task_duration: HistogramVec,

    // Family state
    pub queue_depth: IntGaugeVec,
    pub workers_registered: IntGaugeVec,

    // Async resources
    pub monitored_bulks: IntGauge,
    pub status_checks_total: CounterVec,
    pub pending_removals: IntGauge,
    pub removals_total: CounterVec,
}

impl DistributorMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let tasks_total = CounterVec::new(
            Opts::new("pd_tasks_total", "Total number of tasks by family and outcome"),
            &["family", "outcome"],
        )?;
        registry.register(Box::new(tasks_total.clone()))?;

        let task_duration = HistogramVec::new(
            HistogramOpts::new(
                "pd_task_duration_seconds",
                "Remote task execution duration in seconds",
            ),
            &["family"],
        )?;
        registry.register(Box::new(task_duration.clone()))?;

        let queue_depth = IntGaugeVec::new(
            Opts::new("pd_queue_depth", "Entries waiting in a family queue"),
            &["family"],
        )?;
        registry.register(Box::new(queue_depth.clone()))?;

        let workers_registered = IntGaugeVec::new(
            Opts::new("pd_workers_registered", "Registered workers per family"),
            &["family"],
        )?;
        registry.register(Box::new(workers_registered.clone()))?;

        let monitored_bulks = IntGauge::new("pd_monitored_bulks", "Bulks waiting on access requests")?;
        registry.register(Box::new(monitored_bulks.clone()))?;

        let status_checks_total = CounterVec::new(
            Opts::new(
                "pd_status_checks_total",
                "Access request status check batches by result",
            ),
            &["result"],
        )?;
        registry.register(Box::new(status_checks_total.clone()))?;

        let pending_removals =
            IntGauge::new("pd_pending_removals", "Access requests waiting for removal")?;
        registry.register(Box::new(pending_removals.clone()))?;

        let removals_total = CounterVec::new(
            Opts::new("pd_removals_total", "Access request removals by result"),
            &["result"],
        )?;
        registry.register(Box::new(removals_total.clone()))?;

        Ok(DistributorMetrics {
            registry,
            tasks_total,
            task_duration,
            queue_depth,
            workers_registered,
            monitored_bulks,
            status_checks_total,
            pending_removals,
            removals_total,
        })
    }

    /// Increment task counter
    pub fn inc_tasks_total(&self, family: &str, outcome: &str) {
        self.tasks_total.with_label_values(&[family, outcome]).inc();
    }

    /// Record remote execution duration
    pub fn observe_task_duration(&self, family: &str, duration_secs: f64) {
        self.task_duration
            .with_label_values(&[family])
            .observe(duration_secs);
    }

    pub fn set_queue_depth(&self, family: &str, depth: usize) {
        self.queue_depth
            .with_label_values(&[family])
            .set(depth as i64);
    }

    pub fn set_workers_registered(&self, family: &str, count: usize) {
        self.workers_registered
            .with_label_values(&[family])
            .set(count as i64);
    }

    pub fn inc_status_checks(&self, result: &str) {
        self.status_checks_total.with_label_values(&[result]).inc();
    }

    pub fn inc_removals(&self, result: &str) {
        self.removals_total.with_label_values(&[result]).inc();
    }

    /// Render the registry in the Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
