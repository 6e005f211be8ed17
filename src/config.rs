//! Driver configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via FORKSTATE_CONFIG or --config)
//! 3. Environment variables
//! 4. Command line arguments (applied by `main`)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the built-in traffic advisory machine.
pub const BUILTIN_MACHINE: &str = "traffic_advisory";

/// Instance id used when none is configured.
pub const DEFAULT_INSTANCE_ID: &str = "13232";

/// Driver configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which machine definition to load.
    pub definition: DefinitionConfig,
    /// Instance and event script.
    pub run: RunConfig,
    /// Log filter.
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads configuration from `path`, or from `FORKSTATE_CONFIG` when no
    /// path is given, then applies environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match std::env::var("FORKSTATE_CONFIG") {
                Ok(path) => Self::from_file(path)?,
                Err(_) => Self::default(),
            },
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        self.definition.apply_overrides(&var);
        self.run.apply_overrides(&var);
        self.logging.apply_overrides(&var);
    }

    /// Rejects settings that cannot drive a machine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.definition.machine.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "definition.machine must not be empty".to_string(),
            ));
        }
        if self.run.instance_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "run.instance_id must not be empty".to_string(),
            ));
        }
        if let Some(event) = self.run.events.iter().find(|e| e.trim().is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "run.events contains a blank event: {:?}",
                event
            )));
        }
        Ok(())
    }
}

/// Machine definition source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefinitionConfig {
    /// JSON or YAML definition file; the built-in traffic advisory
    /// definition is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Name the definition is registered under.
    pub machine: String,
}

impl Default for DefinitionConfig {
    fn default() -> Self {
        Self {
            path: None,
            machine: BUILTIN_MACHINE.to_string(),
        }
    }
}

impl DefinitionConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("FORKSTATE_DEFINITION") {
            if !path.is_empty() {
                self.path = Some(PathBuf::from(path));
            }
        }

        if let Some(machine) = var("FORKSTATE_MACHINE") {
            if !machine.is_empty() {
                self.machine = machine;
            }
        }
    }

    /// Returns true when the definition file should be parsed as YAML.
    pub fn is_yaml(&self) -> bool {
        self.path
            .as_ref()
            .and_then(|p| p.extension())
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
            .unwrap_or(false)
    }
}

/// Instance and events to drive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub instance_id: String,
    /// Events sent in order after start.
    pub events: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            instance_id: DEFAULT_INSTANCE_ID.to_string(),
            events: [
                "ACTIVATE_DEVICE",
                "ACTIVATE_UI_AND_SPAT",
                "ACTIVATE_UI_STANDBY",
                "ACTIVATE_SPAT_STANDBY",
            ]
            .iter()
            .map(|e| e.to_string())
            .collect(),
        }
    }
}

impl RunConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(id) = var("FORKSTATE_INSTANCE") {
            if !id.is_empty() {
                self.instance_id = id;
            }
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `forkstate_core=debug`.
    /// `RUST_LOG` takes precedence.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(level) = var("FORKSTATE_LOG") {
            if !level.is_empty() {
                self.level = level;
            }
        }
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    IoError(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    ParseError(PathBuf, String),

    #[error("failed to read definition file '{}': {}", .0.display(), .1)]
    DefinitionError(PathBuf, #[source] std::io::Error),

    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.definition.machine, BUILTIN_MACHINE);
        assert!(config.definition.path.is_none());
        assert_eq!(config.run.instance_id, "13232");
        assert_eq!(config.run.events.len(), 4);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("forkstate.yaml");

        let mut config = Config::default();
        config.definition.path = Some(PathBuf::from("machines/door.yaml"));
        config.run.events = vec!["OPEN".to_string(), "CLOSE".to_string()];
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(loaded.definition.is_yaml());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.yaml");
        std::fs::write(&path, "run:\n  instance_id: lane-7\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.run.instance_id, "lane-7");
        assert_eq!(config.run.events, RunConfig::default().events);
        assert_eq!(config.definition.machine, BUILTIN_MACHINE);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/nonexistent/forkstate.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(..)));
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn test_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "run: [not, a, map").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(..)));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FORKSTATE_DEFINITION", "door.json"),
            ("FORKSTATE_MACHINE", "door"),
            ("FORKSTATE_INSTANCE", "door-1"),
            ("FORKSTATE_LOG", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.definition.path, Some(PathBuf::from("door.json")));
        assert!(!config.definition.is_yaml());
        assert_eq!(config.definition.machine, "door");
        assert_eq!(config.run.instance_id, "door-1");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_empty_overrides_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|_| Some(String::new()));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.run.instance_id = " ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = Config::default();
        config.run.events.push(String::new());
        assert!(config.validate().is_err());
    }
}
