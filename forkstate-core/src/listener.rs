//! State change observers.

use crate::configuration::Configuration;

/// A committed configuration change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    /// Name of the machine definition.
    pub machine: String,
    /// Configuration before the change; empty on start.
    pub from: Configuration,
    pub to: Configuration,
    /// Triggering event, `None` on start and for automatic fork/join steps.
    pub event: Option<String>,
}

/// Receives every committed change, synchronously, on the caller's thread.
pub trait StateListener: Send + Sync {
    fn state_changed(&self, change: &StateChange);
}

impl<F> StateListener for F
where
    F: Fn(&StateChange) + Send + Sync,
{
    fn state_changed(&self, change: &StateChange) {
        self(change)
    }
}

/// Logs every change through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingListener;

impl StateListener for TracingListener {
    fn state_changed(&self, change: &StateChange) {
        tracing::info!(
            machine = %change.machine,
            event = change.event.as_deref().unwrap_or("-"),
            "stateChanged(from: {}, to: {})",
            change.from,
            change.to
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::StateId;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_closure_listener() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener = move |change: &StateChange| sink.lock().push(change.to.clone());

        let change = StateChange {
            machine: "m".to_string(),
            from: Configuration::empty(),
            to: Configuration::single(StateId::from("A")),
            event: None,
        };
        listener.state_changed(&change);
        TracingListener.state_changed(&change);

        assert_eq!(seen.lock().len(), 1);
        assert_eq!(seen.lock()[0].names(), vec!["A"]);
    }
}
