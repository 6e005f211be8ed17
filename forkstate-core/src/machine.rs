//! A single running state machine.
//!
//! Events are processed to completion before `send_event` returns: exit
//! actions of the source states run, the configuration is committed and
//! listeners notified, then entry actions of the new states run. Entering a
//! fork expands into every region of its composite in the same step, and once
//! every region of the active composite rests in an end state the composite's
//! completion transition fires, resolving through its join.

use crate::action::{Action, ActionContext, ActionPhase, ActionRegistry};
use crate::configuration::Configuration;
use crate::definition::{MachineDefinition, PseudoRole, StateId};
use crate::error::CoreError;
use crate::instance::MachineStatus;
use crate::listener::{StateChange, StateListener};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Result of sending an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResult {
    pub from: Configuration,
    pub to: Configuration,
    /// False when no active state had a matching transition.
    pub applied: bool,
    /// Status after the event, including any automatic join.
    pub status: MachineStatus,
}

impl SendResult {
    pub fn is_completed(&self) -> bool {
        self.status == MachineStatus::Completed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Active {
    Idle,
    Simple(StateId),
    Composite {
        composite: StateId,
        /// Active leaf per region, in region order.
        leaves: Vec<StateId>,
    },
}

impl Active {
    fn configuration(&self) -> Configuration {
        match self {
            Active::Idle => Configuration::empty(),
            Active::Simple(state) => Configuration::single(state.clone()),
            Active::Composite { leaves, .. } => Configuration::from_states(leaves.clone()),
        }
    }
}

/// A machine instance: an immutable definition plus the mutable configuration.
pub struct StateMachine {
    definition: Arc<MachineDefinition>,
    actions: HashMap<String, Arc<dyn Action>>,
    listeners: Vec<Arc<dyn StateListener>>,
    status: MachineStatus,
    active: Active,
}

impl StateMachine {
    /// Creates a machine, resolving every entry/exit action the definition
    /// references.
    pub fn new(
        definition: Arc<MachineDefinition>,
        registry: &ActionRegistry,
    ) -> Result<Self, CoreError> {
        let mut actions = HashMap::new();
        for state in definition.states() {
            for id in state.entry.iter().chain(state.exit.iter()) {
                if actions.contains_key(id) {
                    continue;
                }
                let action = registry.get(id).ok_or_else(|| {
                    CoreError::definition(format!(
                        "action '{}' of state '{}' is not registered",
                        id, state.id
                    ))
                })?;
                actions.insert(id.clone(), action);
            }
        }

        Ok(Self {
            definition,
            actions,
            listeners: Vec::new(),
            status: MachineStatus::NotStarted,
            active: Active::Idle,
        })
    }

    /// Registers a listener notified on every committed change.
    pub fn add_listener(&mut self, listener: Arc<dyn StateListener>) {
        self.listeners.push(listener);
    }

    pub fn definition(&self) -> &Arc<MachineDefinition> {
        &self.definition
    }

    pub fn status(&self) -> MachineStatus {
        self.status
    }

    pub fn is_completed(&self) -> bool {
        self.status == MachineStatus::Completed
    }

    /// Active leaf states: one per region inside a composite, otherwise one.
    pub fn current_state(&self) -> Configuration {
        self.active.configuration()
    }

    /// The composite whose regions are active, if any.
    pub fn active_composite(&self) -> Option<&StateId> {
        match &self.active {
            Active::Composite { composite, .. } => Some(composite),
            _ => None,
        }
    }

    /// Enters the initial state and runs its entry actions.
    pub fn start(&mut self) -> Result<Configuration, CoreError> {
        if self.status != MachineStatus::NotStarted {
            return Err(CoreError::InvalidOperation {
                operation: "start",
                status: self.status,
            });
        }

        let initial = self.definition.initial.clone();
        self.status = MachineStatus::Running;
        tracing::info!(machine = %self.definition.name, state = %initial, "machine started");

        self.step(Vec::new(), Active::Simple(initial.clone()), vec![initial], None)?;
        Ok(self.current_state())
    }

    /// Delivers one event. Unmatched events leave the configuration unchanged
    /// and report `applied = false`.
    pub fn send_event(&mut self, event: &str) -> Result<SendResult, CoreError> {
        match self.status {
            MachineStatus::NotStarted => {
                return Err(CoreError::InvalidOperation {
                    operation: "send event",
                    status: self.status,
                })
            }
            MachineStatus::Completed => {
                tracing::debug!(machine = %self.definition.name, event, "machine completed, event ignored");
                return Ok(self.unchanged());
            }
            MachineStatus::Running => {}
        }

        let definition = Arc::clone(&self.definition);
        let from = self.current_state();

        let applied = match self.active.clone() {
            Active::Idle => false,
            Active::Simple(state) => match definition.get_transition(&state, event) {
                Some(target) => {
                    let (next, entries) = self.enter_plan(target)?;
                    self.step(vec![state], next, entries, Some(event))?;
                    true
                }
                None => false,
            },
            Active::Composite { composite, leaves } => {
                let mut exits = Vec::new();
                let mut entries = Vec::new();
                let mut next_leaves = leaves.clone();
                for (slot, leaf) in next_leaves.iter_mut().zip(&leaves) {
                    if let Some(target) = definition.get_transition(leaf, event) {
                        exits.push(leaf.clone());
                        entries.push(target.clone());
                        *slot = target.clone();
                    }
                }

                if !exits.is_empty() {
                    let next = Active::Composite {
                        composite,
                        leaves: next_leaves,
                    };
                    self.step(exits, next, entries, Some(event))?;
                    true
                } else if let Some(target) = definition.get_transition(&composite, event) {
                    let mut exits = leaves;
                    exits.push(composite);
                    let (next, entries) = self.enter_plan(target)?;
                    self.step(exits, next, entries, Some(event))?;
                    true
                } else {
                    false
                }
            }
        };

        if !applied {
            tracing::debug!(
                machine = %self.definition.name,
                event,
                state = %from,
                "no transition matched, event ignored"
            );
            return Ok(self.unchanged());
        }

        self.settle()?;

        Ok(SendResult {
            from,
            to: self.current_state(),
            applied: true,
            status: self.status,
        })
    }

    fn unchanged(&self) -> SendResult {
        let current = self.current_state();
        SendResult {
            from: current.clone(),
            to: current,
            applied: false,
            status: self.status,
        }
    }

    /// Fires completion transitions while every region of the active
    /// composite sits in an end state.
    fn settle(&mut self) -> Result<(), CoreError> {
        let definition = Arc::clone(&self.definition);

        loop {
            let (composite, leaves) = match &self.active {
                Active::Composite { composite, leaves } => (composite.clone(), leaves.clone()),
                _ => break,
            };
            let Some(regions) = definition.regions(&composite) else {
                break;
            };
            let complete = regions
                .iter()
                .zip(&leaves)
                .all(|(region, leaf)| region.is_end(leaf));
            if !complete {
                break;
            }
            let Some(target) = definition.automatic_target(&composite) else {
                tracing::debug!(composite = %composite, "all regions complete, no completion transition");
                break;
            };

            tracing::info!(
                machine = %definition.name,
                composite = %composite,
                target = %target,
                "all regions complete, joining"
            );
            let mut exits = leaves;
            exits.push(composite);
            let (next, entries) = self.enter_plan(target)?;
            self.step(exits, next, entries, None)?;
        }

        Ok(())
    }

    /// Resolves joins and forks down to the state that becomes active, and
    /// lists the states entered, outermost first.
    fn enter_plan(&self, target: &StateId) -> Result<(Active, Vec<StateId>), CoreError> {
        let mut target = target.clone();

        loop {
            let role = self.definition.state(&target).and_then(|s| s.role);
            match role {
                Some(PseudoRole::Join) | Some(PseudoRole::Fork) => {
                    let next = self.definition.automatic_target(&target).ok_or_else(|| {
                        CoreError::definition(format!("pseudo-state '{}' has no target", target))
                    })?;
                    target = next.clone();
                }
                None => break,
            }
        }

        match self.definition.regions(&target) {
            Some(regions) => {
                let leaves: Vec<StateId> = regions.iter().map(|r| r.initial.clone()).collect();
                let mut entries = Vec::with_capacity(leaves.len() + 1);
                entries.push(target.clone());
                entries.extend(leaves.iter().cloned());
                Ok((
                    Active::Composite {
                        composite: target,
                        leaves,
                    },
                    entries,
                ))
            }
            None => Ok((Active::Simple(target.clone()), vec![target])),
        }
    }

    /// Exit, commit, notify, enter.
    fn step(
        &mut self,
        exits: Vec<StateId>,
        next: Active,
        entries: Vec<StateId>,
        event: Option<&str>,
    ) -> Result<(), CoreError> {
        let from = self.current_state();
        let to = next.configuration();

        self.run_actions(&exits, ActionPhase::Exit, &from, &to, event)?;

        if let Active::Simple(state) = &next {
            if self.definition.is_final(state) {
                self.status = MachineStatus::Completed;
                tracing::info!(machine = %self.definition.name, state = %state, "machine completed");
            }
        }
        self.active = next;
        self.notify(&from, &to, event);

        self.run_actions(&entries, ActionPhase::Entry, &from, &to, event)
    }

    fn run_actions(
        &self,
        states: &[StateId],
        phase: ActionPhase,
        from: &Configuration,
        to: &Configuration,
        event: Option<&str>,
    ) -> Result<(), CoreError> {
        for state in states {
            let Some(info) = self.definition.state(state) else {
                continue;
            };
            let ids = match phase {
                ActionPhase::Entry => &info.entry,
                ActionPhase::Exit => &info.exit,
            };
            for id in ids {
                let Some(action) = self.actions.get(id) else {
                    continue;
                };
                let ctx = ActionContext {
                    machine: &self.definition.name,
                    state,
                    phase,
                    from,
                    to,
                    event,
                };
                action.execute(&ctx).map_err(|source| {
                    tracing::warn!(
                        machine = %self.definition.name,
                        action = %id,
                        state = %state,
                        %phase,
                        "action failed: {}",
                        source
                    );
                    CoreError::ActionFailed {
                        action: id.clone(),
                        state: state.to_string(),
                        source,
                    }
                })?;
            }
        }
        Ok(())
    }

    fn notify(&self, from: &Configuration, to: &Configuration, event: Option<&str>) {
        tracing::debug!(
            machine = %self.definition.name,
            event = event.unwrap_or("-"),
            "configuration {} -> {}",
            from,
            to
        );
        if self.listeners.is_empty() {
            return;
        }
        let change = StateChange {
            machine: self.definition.name.clone(),
            from: from.clone(),
            to: to.clone(),
            event: event.map(str::to_string),
        };
        for listener in &self.listeners {
            listener.state_changed(&change);
        }
    }
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("machine", &self.definition.name)
            .field("status", &self.status)
            .field("configuration", &self.current_state())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
