use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheduling lane of a task.
///
/// Fresh work goes through the bounded `Regular` lane. Resumptions and
/// retries of work already in flight use the `High` lane, which is drained
/// first and never blocks its producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Regular,
    High,
}

impl Priority {
    /// Get the lane name
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Regular => "regular",
            Priority::High => "high",
        }
    }

    /// Check if this is a high priority task
    pub fn is_high(&self) -> bool {
        matches!(self, Priority::High)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Regular
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_lanes() {
        assert_eq!(Priority::High.as_str(), "high");
        assert_eq!(Priority::Regular.as_str(), "regular");
        assert!(Priority::High.is_high());
        assert!(!Priority::default().is_high());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Regular);
    }

    #[test]
    fn test_priority_wire_format() {
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"HIGH\"");
        let parsed: Priority = serde_json::from_str("\"REGULAR\"").unwrap();
        assert_eq!(parsed, Priority::Regular);
    }
}
