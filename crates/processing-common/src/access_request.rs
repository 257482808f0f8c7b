use serde::{Deserialize, Serialize};

/// Where an access request lives on the storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequestContext {
    pub strategy_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_id: Option<String>,
}

impl AccessRequestContext {
    pub fn new(strategy_id: impl Into<String>, offer_id: Option<String>) -> Self {
        AccessRequestContext {
            strategy_id: strategy_id.into(),
            offer_id,
        }
    }
}

/// State of an access request as reported by the storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessRequestStatus {
    Ready,
    NotReady,
    NotFound,
    Expired,
}

impl AccessRequestStatus {
    /// Whether a waiting bulk can stop tracking the request.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, AccessRequestStatus::NotReady)
    }
}
