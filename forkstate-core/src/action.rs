//! Entry and exit actions.
//!
//! Definitions reference actions by id; the machine resolves each id against
//! an [`ActionRegistry`] when it is instantiated and invokes the action with an
//! [`ActionContext`] describing the transition being taken.

use crate::configuration::Configuration;
use crate::definition::StateId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error returned by a failing action.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ActionError {
    message: String,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Whether an action runs on activation or deactivation of its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionPhase {
    Entry,
    Exit,
}

impl fmt::Display for ActionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionPhase::Entry => f.write_str("entry"),
            ActionPhase::Exit => f.write_str("exit"),
        }
    }
}

/// What an action sees while it runs.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    /// Name of the machine definition.
    pub machine: &'a str,
    /// State being entered or exited.
    pub state: &'a StateId,
    pub phase: ActionPhase,
    /// Configuration before the step. Empty when the machine is starting.
    pub from: &'a Configuration,
    /// Configuration after the step.
    pub to: &'a Configuration,
    /// Event that triggered the step, `None` for start and automatic
    /// fork/join continuations.
    pub event: Option<&'a str>,
}

/// A unit of entry/exit behaviour.
pub trait Action: Send + Sync {
    fn execute(&self, ctx: &ActionContext<'_>) -> Result<(), ActionError>;
}

impl<F> Action for F
where
    F: Fn(&ActionContext<'_>) -> Result<(), ActionError> + Send + Sync,
{
    fn execute(&self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        self(ctx)
    }
}

/// Action that logs every activation and deactivation through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAction;

impl Action for LogAction {
    fn execute(&self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        tracing::info!(
            machine = ctx.machine,
            event = ctx.event.unwrap_or("-"),
            "{} {} ({} -> {})",
            ctx.phase,
            ctx.state,
            ctx.from,
            ctx.to
        );
        Ok(())
    }
}

/// Actions indexed by id.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an action, replacing any previous action with the same id.
    pub fn register(&mut self, id: impl Into<String>, action: impl Action + 'static) {
        self.actions.insert(id.into(), Arc::new(action));
    }

    /// Registers a closure as an action.
    pub fn register_fn<F>(&mut self, id: impl Into<String>, f: F)
    where
        F: Fn(&ActionContext<'_>) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.actions.insert(id.into(), Arc::new(f));
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with(mut self, id: impl Into<String>, action: impl Action + 'static) -> Self {
        self.register(id, action);
        self
    }

    /// Builder-style variant of [`register_fn`](Self::register_fn).
    pub fn with_fn<F>(mut self, id: impl Into<String>, f: F) -> Self
    where
        F: Fn(&ActionContext<'_>) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.register_fn(id, f);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.actions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.actions.keys().collect();
        ids.sort();
        f.debug_struct("ActionRegistry").field("actions", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_closure_action() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registry = ActionRegistry::new().with_fn("count", move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let state = StateId::from("A");
        let empty = Configuration::empty();
        let to = Configuration::single(state.clone());
        let ctx = ActionContext {
            machine: "m",
            state: &state,
            phase: ActionPhase::Entry,
            from: &empty,
            to: &to,
            event: None,
        };

        let action = registry.get("count").unwrap();
        action.execute(&ctx).unwrap();
        action.execute(&ctx).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = ActionRegistry::new();
        assert!(registry.is_empty());

        registry.register("log", LogAction);
        registry.register_fn("noop", |_ctx| Ok(()));
        assert!(registry.contains("log"));
        assert!(!registry.contains("missing"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_failing_action() {
        let registry = ActionRegistry::new().with_fn("fail", |_ctx| Err(ActionError::new("device offline")));

        let state = StateId::from("A");
        let cfg = Configuration::single(state.clone());
        let ctx = ActionContext {
            machine: "m",
            state: &state,
            phase: ActionPhase::Exit,
            from: &cfg,
            to: &cfg,
            event: Some("GO"),
        };

        let err = registry.get("fail").unwrap().execute(&ctx).unwrap_err();
        assert_eq!(err.message(), "device offline");
        assert_eq!(ActionPhase::Exit.to_string(), "exit");
    }
}
