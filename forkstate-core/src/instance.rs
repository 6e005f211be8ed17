//! Instance lifecycle and snapshots.

use crate::configuration::Configuration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a machine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineStatus {
    /// Created but `start` not yet called.
    #[default]
    NotStarted,
    /// Started and not yet in a final state.
    Running,
    /// Reached a final state.
    Completed,
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineStatus::NotStarted => f.write_str("not started"),
            MachineStatus::Running => f.write_str("running"),
            MachineStatus::Completed => f.write_str("completed"),
        }
    }
}

/// Point-in-time view of an engine-managed instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceInfo {
    /// Instance key.
    pub id: String,

    /// Machine name.
    pub machine: String,

    /// Checksum of the definition the instance runs.
    pub checksum: String,

    pub status: MachineStatus,

    /// Active configuration.
    pub configuration: Configuration,

    /// Events that changed the configuration.
    pub events_applied: u64,

    /// Events discarded because no transition matched.
    pub events_ignored: u64,

    /// Creation timestamp (Unix millis).
    pub created_at: i64,

    /// Last update timestamp (Unix millis).
    pub updated_at: i64,
}

pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(MachineStatus::default(), MachineStatus::NotStarted);
        assert_eq!(MachineStatus::NotStarted.to_string(), "not started");
        assert_eq!(MachineStatus::Completed.to_string(), "completed");
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&MachineStatus::NotStarted).unwrap();
        assert_eq!(json, "\"not_started\"");
        let parsed: MachineStatus = serde_json::from_str("\"running\"").unwrap();
        assert_eq!(parsed, MachineStatus::Running);
    }

    #[test]
    fn test_now_is_positive() {
        assert!(now_millis() > 0);
    }
}
