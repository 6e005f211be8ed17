//! # forkstate-core
//!
//! Hierarchical state machine engine with fork/join parallel regions.
//!
//! This crate provides:
//! - Machine definition parsing and validation (JSON or YAML)
//! - Event processing with fork expansion and join completion
//! - Entry/exit actions resolved by id from an action registry
//! - State change listeners
//! - A multi-instance engine

pub mod action;
pub mod configuration;
pub mod definition;
pub mod engine;
pub mod error;
pub mod instance;
pub mod listener;
pub mod machine;

pub use action::{Action, ActionContext, ActionError, ActionPhase, ActionRegistry, LogAction};
pub use configuration::Configuration;
pub use definition::{
    MachineDefinition, MachineDefinitionRaw, PseudoRole, Region, StateDecl, StateId, StateInfo,
    StateKind, TransitionDecl,
};
pub use engine::StateMachineEngine;
pub use error::CoreError;
pub use instance::{InstanceInfo, MachineStatus};
pub use listener::{StateChange, StateListener, TracingListener};
pub use machine::{SendResult, StateMachine};
