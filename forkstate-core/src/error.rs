//! Core error types.

use crate::action::ActionError;
use crate::instance::MachineStatus;
use thiserror::Error;

/// Errors from the state machine engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid machine definition: {reason}")]
    InvalidDefinition { reason: String },

    #[error("invalid operation: cannot {operation} while machine is {status}")]
    InvalidOperation {
        operation: &'static str,
        status: MachineStatus,
    },

    #[error("action '{action}' failed in state '{state}': {source}")]
    ActionFailed {
        action: String,
        state: String,
        #[source]
        source: ActionError,
    },

    #[error("machine not found: {machine}")]
    MachineNotFound { machine: String },

    #[error("machine already exists with a different definition: {machine}")]
    MachineExists { machine: String },

    #[error("instance not found: {instance_id}")]
    InstanceNotFound { instance_id: String },

    #[error("instance already exists: {instance_id}")]
    InstanceExists { instance_id: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CoreError {
    pub(crate) fn definition(reason: impl Into<String>) -> Self {
        CoreError::InvalidDefinition {
            reason: reason.into(),
        }
    }

    /// Returns true for errors raised while building a definition.
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidDefinition { .. } | CoreError::Json(_) | CoreError::Yaml(_)
        )
    }

    /// Returns a stable error code for logs and callers that match on strings.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::InvalidDefinition { .. } => "INVALID_DEFINITION",
            CoreError::InvalidOperation { .. } => "INVALID_OPERATION",
            CoreError::ActionFailed { .. } => "ACTION_FAILED",
            CoreError::MachineNotFound { .. } => "MACHINE_NOT_FOUND",
            CoreError::MachineExists { .. } => "MACHINE_EXISTS",
            CoreError::InstanceNotFound { .. } => "INSTANCE_NOT_FOUND",
            CoreError::InstanceExists { .. } => "INSTANCE_EXISTS",
            CoreError::Json(_) => "BAD_DEFINITION_FORMAT",
            CoreError::Yaml(_) => "BAD_DEFINITION_FORMAT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = CoreError::definition("bad");
        assert_eq!(err.error_code(), "INVALID_DEFINITION");
        assert!(err.is_definition_error());

        let err = CoreError::InvalidOperation {
            operation: "start",
            status: MachineStatus::Running,
        };
        assert_eq!(err.error_code(), "INVALID_OPERATION");
        assert!(!err.is_definition_error());
        assert_eq!(
            err.to_string(),
            "invalid operation: cannot start while machine is running"
        );
    }

    #[test]
    fn test_action_failure_keeps_source() {
        let err = CoreError::ActionFailed {
            action: "log".to_string(),
            state: "A".to_string(),
            source: ActionError::new("boom"),
        };
        assert_eq!(err.error_code(), "ACTION_FAILED");
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("boom"));
    }
}
