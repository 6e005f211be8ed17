//! forkstate - hierarchical state machine driver
//!
//! Loads a machine definition, starts one instance and feeds it a script of
//! events, logging the active configuration after each step.

mod config;

use clap::Parser;
use config::{Config, ConfigError, DefinitionConfig};
use forkstate_core::{
    CoreError, InstanceInfo, LogAction, MachineDefinition, StateMachineEngine, TracingListener,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Traffic intersection advisory device, used when no definition is configured.
const BUILTIN_DEFINITION: &str = include_str!("../definitions/traffic_advisory.json");

#[derive(Parser, Debug)]
#[command(name = "forkstate")]
#[command(about = "Drive a hierarchical fork/join state machine with a script of events")]
#[command(version)]
struct Cli {
    /// YAML config file
    #[arg(short, long, env = "FORKSTATE_CONFIG")]
    config: Option<PathBuf>,

    /// Machine definition file (JSON, or YAML by extension)
    #[arg(short, long)]
    definition: Option<PathBuf>,

    /// Name to register the definition under
    #[arg(short, long)]
    machine: Option<String>,

    /// Instance ID
    #[arg(short, long)]
    instance: Option<String>,

    /// Log filter (RUST_LOG takes precedence)
    #[arg(long)]
    log: Option<String>,

    /// Write the effective configuration to FILE and exit
    #[arg(long, value_name = "FILE")]
    write_config: Option<PathBuf>,

    /// Events to send after start, replacing the configured script
    events: Vec<String>,
}

impl Cli {
    fn apply(&mut self, config: &mut Config) {
        if let Some(path) = self.definition.take() {
            config.definition.path = Some(path);
        }
        if let Some(machine) = self.machine.take() {
            config.definition.machine = machine;
        }
        if let Some(id) = self.instance.take() {
            config.run.instance_id = id;
        }
        if let Some(level) = self.log.take() {
            config.logging.level = level;
        }
        if !self.events.is_empty() {
            config.run.events = std::mem::take(&mut self.events);
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    if let Some(path) = &cli.write_config {
        config.save(path)?;
        println!("Wrote configuration to {}", path.display());
        return Ok(());
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    match &config.definition.path {
        Some(path) => tracing::info!("Loading definition from {}", path.display()),
        None => tracing::info!("Using built-in traffic advisory definition"),
    }

    let engine = build_engine(&config.definition)?;
    let info = drive(&engine, &config)?;

    tracing::info!(
        "Instance {} finished: {} in {} ({} applied, {} ignored)",
        info.id,
        info.status,
        info.configuration,
        info.events_applied,
        info.events_ignored
    );

    Ok(())
}

/// Reads the configured definition, or the built-in one.
fn load_definition(config: &DefinitionConfig) -> Result<MachineDefinition, Box<dyn std::error::Error>> {
    let Some(path) = &config.path else {
        return Ok(MachineDefinition::from_json_str(&config.machine, BUILTIN_DEFINITION)?);
    };

    let content =
        std::fs::read_to_string(path).map_err(|e| ConfigError::DefinitionError(path.clone(), e))?;
    let definition = if config.is_yaml() {
        MachineDefinition::from_yaml_str(&config.machine, &content)?
    } else {
        MachineDefinition::from_json_str(&config.machine, &content)?
    };
    Ok(definition)
}

/// Builds an engine with the `log` action, a logging listener and the
/// configured definition registered.
fn build_engine(config: &DefinitionConfig) -> Result<StateMachineEngine, Box<dyn std::error::Error>> {
    let engine = StateMachineEngine::new();
    engine.register_action("log", LogAction);
    engine.add_listener(Arc::new(TracingListener));

    let definition = load_definition(config)?;
    let (checksum, _) = engine.put_definition(definition)?;
    tracing::debug!(machine = %config.machine, %checksum, "definition registered");

    Ok(engine)
}

/// Creates and starts the configured instance, then sends every scripted
/// event in order.
fn drive(engine: &StateMachineEngine, config: &Config) -> Result<InstanceInfo, CoreError> {
    let id = config.run.instance_id.as_str();
    engine.create_instance(Some(id), &config.definition.machine)?;

    let state = engine.start_instance(id)?;
    tracing::info!("current state: {}", state);

    for event in &config.run.events {
        let result = engine.send_event(id, event)?;
        if !result.applied {
            tracing::info!("event {} not accepted in {}", event, result.from);
        }
        tracing::info!("current state: {}", result.to);
    }

    engine.get_instance(id)
}
