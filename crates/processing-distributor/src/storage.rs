use async_trait::async_trait;
use processing_common::AccessRequestStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageClientError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage rejected the request with status {status}")]
    Rejected { status: u16 },

    #[error("Invalid storage response: {0}")]
    InvalidResponse(String),
}

/// Access request operations of the storage backend
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Status of each id. Ids the backend does not report may be missing
    /// from the map or mapped to `None`.
    async fn check_access_request_statuses(
        &self,
        strategy_id: &str,
        offer_id: Option<&str>,
        access_request_ids: &[String],
    ) -> Result<HashMap<String, Option<AccessRequestStatus>>, StorageClientError>;

    async fn remove_access_request(
        &self,
        strategy_id: &str,
        offer_id: Option<&str>,
        access_request_id: &str,
        ignore_not_found: bool,
    ) -> Result<(), StorageClientError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusCheckRequest<'a> {
    strategy_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    offer_id: Option<&'a str>,
    access_request_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusCheckResponse {
    #[serde(default)]
    statuses: HashMap<String, Option<AccessRequestStatus>>,
}

/// Storage client speaking JSON over HTTP
pub struct HttpStorageClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpStorageClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(HttpStorageClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

fn unavailable(e: reqwest::Error) -> StorageClientError {
    StorageClientError::Unavailable(e.to_string())
}

#[async_trait]
impl StorageClient for HttpStorageClient {
    async fn check_access_request_statuses(
        &self,
        strategy_id: &str,
        offer_id: Option<&str>,
        access_request_ids: &[String],
    ) -> Result<HashMap<String, Option<AccessRequestStatus>>, StorageClientError> {
        let url = format!("{}/storage/v1/access-requests/statuses", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&StatusCheckRequest {
                strategy_id,
                offer_id,
                access_request_ids,
            })
            .send()
            .await
            .map_err(unavailable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageClientError::Rejected {
                status: status.as_u16(),
            });
        }

        let body = response
            .json::<StatusCheckResponse>()
            .await
            .map_err(|e| StorageClientError::InvalidResponse(e.to_string()))?;
        Ok(body.statuses)
    }

    async fn remove_access_request(
        &self,
        strategy_id: &str,
        offer_id: Option<&str>,
        access_request_id: &str,
        ignore_not_found: bool,
    ) -> Result<(), StorageClientError> {
        let url = format!(
            "{}/storage/v1/access-requests/{}",
            self.base_url, access_request_id
        );
        let mut query = vec![("strategyId", strategy_id)];
        if let Some(offer_id) = offer_id {
            query.push(("offerId", offer_id));
        }

        let response = self
            .client
            .delete(&url)
            .query(&query)
            .send()
            .await
            .map_err(unavailable)?;

        let status = response.status();
        if status.is_success() || (ignore_not_found && status == reqwest::StatusCode::NOT_FOUND) {
            return Ok(());
        }
        Err(StorageClientError::Rejected {
            status: status.as_u16(),
        })
    }
}
