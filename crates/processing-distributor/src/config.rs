use processing_common::{DistributorError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributorConfig {
    pub poll_delay_monitor_millis: u64,
    pub poll_delay_cleaner_millis: u64,
    pub status_check_batch_size: usize,
    pub regular_queue_capacity: usize,
    /// Elements per task when the step does not set one
    pub worker_bulk_size: usize,
    /// Tasks submitted per distribution wave
    pub distributor_batch_size: usize,
    pub element_retry_limit: u32,
    /// Timeout of storage calls
    pub request_timeout_millis: u64,
    /// Connect timeout of worker calls, which are otherwise unbounded
    pub worker_connect_timeout_millis: u64,
    pub http_port: u16,
    pub log_level: String,
    pub storage_url: String,
    pub workers_file: Option<PathBuf>,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        DistributorConfig {
            poll_delay_monitor_millis: 5000,
            poll_delay_cleaner_millis: 5000,
            status_check_batch_size: 1000,
            regular_queue_capacity: 100,
            worker_bulk_size: 16,
            distributor_batch_size: 100,
            element_retry_limit: 3,
            request_timeout_millis: 60_000,
            worker_connect_timeout_millis: 5000,
            http_port: 9091,
            log_level: "info".to_string(),
            storage_url: "http://127.0.0.1:8102".to_string(),
            workers_file: None,
        }
    }
}

impl DistributorConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: DistributorConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("poll_delay_monitor_millis", self.poll_delay_monitor_millis),
            ("poll_delay_cleaner_millis", self.poll_delay_cleaner_millis),
            ("status_check_batch_size", self.status_check_batch_size as u64),
            ("regular_queue_capacity", self.regular_queue_capacity as u64),
            ("worker_bulk_size", self.worker_bulk_size as u64),
            ("distributor_batch_size", self.distributor_batch_size as u64),
            ("request_timeout_millis", self.request_timeout_millis),
            (
                "worker_connect_timeout_millis",
                self.worker_connect_timeout_millis,
            ),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(DistributorError::invalid_argument(format!(
                    "{} must be positive",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn poll_delay_monitor(&self) -> Duration {
        Duration::from_millis(self.poll_delay_monitor_millis)
    }

    pub fn poll_delay_cleaner(&self) -> Duration {
        Duration::from_millis(self.poll_delay_cleaner_millis)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_millis)
    }

    pub fn worker_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_connect_timeout_millis)
    }
}
