use crate::{DistributorError, Result};
use serde::{Deserialize, Serialize};

/// Network location of a remote worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerConfiguration {
    pub server_host: String,
    pub server_port: u16,
}

impl WorkerConfiguration {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }
}

/// Descriptor a worker sends when it registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerDescription {
    pub name: String,
    pub family: String,
    pub capacity: usize,
    #[serde(default)]
    pub storage: u64,
    #[serde(default)]
    pub status: String,
    pub configuration: WorkerConfiguration,
}

impl WorkerDescription {
    pub fn new(
        name: impl Into<String>,
        family: impl Into<String>,
        capacity: usize,
        server_host: impl Into<String>,
        server_port: u16,
    ) -> Self {
        WorkerDescription {
            name: name.into(),
            family: family.into(),
            capacity,
            storage: 0,
            status: "Active".to_string(),
            configuration: WorkerConfiguration {
                server_host: server_host.into(),
                server_port,
            },
        }
    }

    /// Parse and validate a JSON descriptor.
    pub fn parse(json: &str) -> Result<Self> {
        let description: WorkerDescription = serde_json::from_str(json)?;
        description.validate()?;
        Ok(description)
    }

    pub fn validate(&self) -> Result<()> {
        if self.family.trim().is_empty() {
            return Err(DistributorError::bad_request("worker family is empty"));
        }
        if self.capacity == 0 {
            return Err(DistributorError::bad_request(format!(
                "worker {} has no capacity",
                self.name
            )));
        }
        if self.configuration.server_host.trim().is_empty() {
            return Err(DistributorError::bad_request("worker server host is empty"));
        }
        if self.configuration.server_port == 0 {
            return Err(DistributorError::bad_request("worker server port is zero"));
        }
        Ok(())
    }
}
