use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sub-status recorded when a LIST distribution has nothing to process.
pub const OBJECTS_LIST_EMPTY: &str = "OBJECTS_LIST_EMPTY";

/// Outcome of a unit of work, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Unknown,
    Started,
    Ok,
    Warning,
    Ko,
    Fatal,
}

impl StatusCode {
    pub const ALL: [StatusCode; 6] = [
        StatusCode::Unknown,
        StatusCode::Started,
        StatusCode::Ok,
        StatusCode::Warning,
        StatusCode::Ko,
        StatusCode::Fatal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::Started => "STARTED",
            StatusCode::Ok => "OK",
            StatusCode::Warning => "WARNING",
            StatusCode::Ko => "KO",
            StatusCode::Fatal => "FATAL",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }

    pub fn is_greater_or_equal_to_ko(&self) -> bool {
        *self >= StatusCode::Ko
    }

    pub fn is_greater_or_equal_to_fatal(&self) -> bool {
        *self >= StatusCode::Fatal
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::Unknown
    }
}

/// Aggregated status of an item (an element, a task, or a whole step).
///
/// `status_meter` counts occurrences per status code, indexed in
/// `StatusCode::ALL` order. `global_status` is the worst status seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStatus {
    pub item_id: String,
    pub status_meter: Vec<u64>,
    pub global_status: StatusCode,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub items_status: BTreeMap<String, ItemStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ItemStatus {
    pub fn new(item_id: impl Into<String>) -> Self {
        ItemStatus {
            item_id: item_id.into(),
            status_meter: vec![0; StatusCode::ALL.len()],
            global_status: StatusCode::Unknown,
            items_status: BTreeMap::new(),
            detail: None,
        }
    }

    /// Count one more occurrence of `status`.
    pub fn increment(self, status: StatusCode) -> Self {
        self.increment_by(status, 1)
    }

    pub fn increment_by(mut self, status: StatusCode, count: u64) -> Self {
        self.ensure_meter();
        self.status_meter[status.index()] += count;
        self.global_status = self.global_status.max(status);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Number of occurrences recorded for `status`.
    pub fn count(&self, status: StatusCode) -> u64 {
        self.status_meter.get(status.index()).copied().unwrap_or(0)
    }

    /// Fold another status into this one: meters add up, the global status
    /// keeps the worst of both, sub-statuses merge by item id.
    pub fn merge(&mut self, other: &ItemStatus) {
        self.ensure_meter();
        for (slot, value) in self.status_meter.iter_mut().zip(other.status_meter.iter()) {
            *slot += value;
        }
        self.global_status = self.global_status.max(other.global_status);
        for (id, sub) in &other.items_status {
            self.items_status
                .entry(id.clone())
                .and_modify(|existing| existing.merge(sub))
                .or_insert_with(|| sub.clone());
        }
        if self.detail.is_none() {
            self.detail = other.detail.clone();
        }
    }

    /// Record `status` as a sub-status and fold it into this one.
    pub fn set_items_status(&mut self, item_id: &str, status: ItemStatus) {
        self.ensure_meter();
        for (slot, value) in self.status_meter.iter_mut().zip(status.status_meter.iter()) {
            *slot += value;
        }
        self.global_status = self.global_status.max(status.global_status);
        self.items_status
            .entry(item_id.to_string())
            .and_modify(|existing| existing.merge(&status))
            .or_insert(status);
    }

    fn ensure_meter(&mut self) {
        if self.status_meter.len() < StatusCode::ALL.len() {
            self.status_meter.resize(StatusCode::ALL.len(), 0);
        }
    }
}
