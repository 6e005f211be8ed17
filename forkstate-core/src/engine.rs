//! Multi-instance engine - coordinates definitions, actions, and instances.

use crate::action::{Action, ActionContext, ActionError, ActionRegistry};
use crate::configuration::Configuration;
use crate::definition::MachineDefinition;
use crate::error::CoreError;
use crate::instance::{now_millis, InstanceInfo, MachineStatus};
use crate::listener::StateListener;
use crate::machine::{SendResult, StateMachine};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

/// An instance plus the bookkeeping the engine reports in [`InstanceInfo`].
struct ManagedInstance {
    id: String,
    machine: StateMachine,
    events_applied: u64,
    events_ignored: u64,
    created_at: i64,
    updated_at: i64,
}

impl ManagedInstance {
    fn info(&self) -> InstanceInfo {
        let definition = self.machine.definition();
        InstanceInfo {
            id: self.id.clone(),
            machine: definition.name.clone(),
            checksum: definition.checksum.clone(),
            status: self.machine.status(),
            configuration: self.machine.current_state(),
            events_applied: self.events_applied,
            events_ignored: self.events_ignored,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// The state machine engine.
pub struct StateMachineEngine {
    /// Machine definitions indexed by name.
    definitions: DashMap<String, Arc<MachineDefinition>>,

    /// Instances indexed by ID.
    instances: DashMap<String, RwLock<ManagedInstance>>,

    /// Actions resolved when an instance is created.
    actions: RwLock<ActionRegistry>,

    /// Listeners attached to every instance created afterwards.
    listeners: RwLock<Vec<Arc<dyn StateListener>>>,
}

impl StateMachineEngine {
    pub fn new() -> Self {
        Self::with_actions(ActionRegistry::new())
    }

    /// Creates an engine with a pre-populated action registry.
    pub fn with_actions(actions: ActionRegistry) -> Self {
        Self {
            definitions: DashMap::new(),
            instances: DashMap::new(),
            actions: RwLock::new(actions),
            listeners: RwLock::new(Vec::new()),
        }
    }

    // =========================================================================
    // Actions and Listeners
    // =========================================================================

    /// Registers an action for instances created from now on.
    pub fn register_action(&self, id: impl Into<String>, action: impl Action + 'static) {
        self.actions.write().register(id, action);
    }

    /// Registers a closure action for instances created from now on.
    pub fn register_action_fn<F>(&self, id: impl Into<String>, f: F)
    where
        F: Fn(&ActionContext<'_>) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.actions.write().register_fn(id, f);
    }

    /// Adds a listener to instances created from now on.
    pub fn add_listener(&self, listener: Arc<dyn StateListener>) {
        self.listeners.write().push(listener);
    }

    // =========================================================================
    // Machine Definition Management
    // =========================================================================

    /// Registers a machine definition from its JSON form.
    ///
    /// Returns the checksum and whether the definition was newly stored.
    /// Re-registering an identical definition is an idempotent success.
    pub fn put_machine(&self, name: &str, definition_json: &Value) -> Result<(String, bool), CoreError> {
        let definition = MachineDefinition::from_json(name, definition_json)?;
        self.put_definition(definition)
    }

    /// Registers an already validated definition under its own name.
    pub fn put_definition(&self, definition: MachineDefinition) -> Result<(String, bool), CoreError> {
        if let Some(existing) = self.definitions.get(&definition.name) {
            if existing.checksum == definition.checksum {
                return Ok((existing.checksum.clone(), false));
            }
            return Err(CoreError::MachineExists {
                machine: definition.name.clone(),
            });
        }

        let checksum = definition.checksum.clone();
        tracing::info!(machine = %definition.name, %checksum, "registered machine");
        self.definitions
            .insert(definition.name.clone(), Arc::new(definition));

        Ok((checksum, true))
    }

    /// Gets a machine definition.
    pub fn get_machine(&self, name: &str) -> Result<Arc<MachineDefinition>, CoreError> {
        self.definitions
            .get(name)
            .map(|r| r.clone())
            .ok_or_else(|| CoreError::MachineNotFound {
                machine: name.to_string(),
            })
    }

    /// Lists registered machine names, sorted.
    pub fn list_machines(&self) -> Vec<String> {
        let mut names: Vec<String> = self.definitions.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    // =========================================================================
    // Instance Management
    // =========================================================================

    /// Creates a new, not yet started instance. A random ID is generated
    /// when none is given.
    pub fn create_instance(
        &self,
        instance_id: Option<&str>,
        machine: &str,
    ) -> Result<InstanceInfo, CoreError> {
        let id = instance_id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        if self.instances.contains_key(&id) {
            return Err(CoreError::InstanceExists { instance_id: id });
        }

        let definition = self.get_machine(machine)?;
        let mut state_machine = StateMachine::new(definition, &self.actions.read())?;
        for listener in self.listeners.read().iter() {
            state_machine.add_listener(Arc::clone(listener));
        }

        let now = now_millis();
        let instance = ManagedInstance {
            id: id.clone(),
            machine: state_machine,
            events_applied: 0,
            events_ignored: 0,
            created_at: now,
            updated_at: now,
        };
        let info = instance.info();

        match self.instances.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                return Err(CoreError::InstanceExists {
                    instance_id: entry.key().clone(),
                })
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(RwLock::new(instance));
            }
        }

        tracing::debug!(instance = %info.id, machine, "created instance");
        Ok(info)
    }

    /// Starts an instance, entering its initial state.
    pub fn start_instance(&self, instance_id: &str) -> Result<Configuration, CoreError> {
        let instance_lock = self.lookup(instance_id)?;
        let mut instance = instance_lock.write();

        let configuration = instance.machine.start()?;
        instance.updated_at = now_millis();
        Ok(configuration)
    }

    /// Delivers an event to an instance.
    pub fn send_event(&self, instance_id: &str, event: &str) -> Result<SendResult, CoreError> {
        let instance_lock = self.lookup(instance_id)?;
        let mut instance = instance_lock.write();

        let result = instance.machine.send_event(event);
        instance.updated_at = now_millis();

        let result = result?;
        if result.applied {
            instance.events_applied += 1;
        } else {
            instance.events_ignored += 1;
        }
        Ok(result)
    }

    /// Returns the active configuration of an instance.
    pub fn current_state(&self, instance_id: &str) -> Result<Configuration, CoreError> {
        let instance_lock = self.lookup(instance_id)?;
        let configuration = instance_lock.read().machine.current_state();
        Ok(configuration)
    }

    /// Returns the status of an instance.
    pub fn status(&self, instance_id: &str) -> Result<MachineStatus, CoreError> {
        let instance_lock = self.lookup(instance_id)?;
        let status = instance_lock.read().machine.status();
        Ok(status)
    }

    /// Gets a snapshot of an instance.
    pub fn get_instance(&self, instance_id: &str) -> Result<InstanceInfo, CoreError> {
        let instance_lock = self.lookup(instance_id)?;
        let info = instance_lock.read().info();
        Ok(info)
    }

    /// Removes an instance, returning its last snapshot.
    pub fn remove_instance(&self, instance_id: &str) -> Result<InstanceInfo, CoreError> {
        let (_, instance_lock) =
            self.instances
                .remove(instance_id)
                .ok_or_else(|| CoreError::InstanceNotFound {
                    instance_id: instance_id.to_string(),
                })?;
        let info = instance_lock.into_inner().info();
        tracing::debug!(instance = %instance_id, "removed instance");
        Ok(info)
    }

    // =========================================================================
    // Instance Enumeration
    // =========================================================================

    /// Returns all instance IDs.
    pub fn list_instance_ids(&self) -> Vec<String> {
        self.instances.iter().map(|r| r.key().clone()).collect()
    }

    /// Returns the number of instances.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    fn lookup(
        &self,
        instance_id: &str,
    ) -> Result<dashmap::mapref::one::Ref<'_, String, RwLock<ManagedInstance>>, CoreError> {
        self.instances
            .get(instance_id)
            .ok_or_else(|| CoreError::InstanceNotFound {
                instance_id: instance_id.to_string(),
            })
    }
}

impl Default for StateMachineEngine {
    fn default() -> Self {
        Self::new()
    }
}
