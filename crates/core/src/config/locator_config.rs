use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ConfigSource, ConfigValidator, IdentifierValidator, MinimumValidator};
use crate::runlevel::{DEFAULT_ENVIRONMENT, RUNLEVEL_IMMEDIATE};

pub const ENV_LOCATOR_NAME: &str = "WARDEN_LOCATOR_NAME";
pub const ENV_EVENT_DISPATCH: &str = "WARDEN_EVENT_DISPATCH";
pub const ENV_RUNLEVEL_ASYNC: &str = "WARDEN_RUNLEVEL_ASYNC";
pub const ENV_RUNLEVEL_BASELINE: &str = "WARDEN_RUNLEVEL_BASELINE";
pub const ENV_RUNLEVEL_ENVIRONMENT: &str = "WARDEN_RUNLEVEL_ENVIRONMENT";

/// Default name of a locator
pub const DEFAULT_LOCATOR_NAME: &str = "default";

/// Configuration trait for locator settings
pub trait ConfigLoader: Sized {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self, ConfigError>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError>;

    /// Get configuration source information for debugging
    fn config_sources(&self) -> HashMap<String, ConfigSource>;
}

/// How locator events reach listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// On the thread that caused the event
    #[default]
    Synchronous,
    /// On one dedicated worker thread
    Background,
}

impl FromStr for DispatchMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "synchronous" | "sync" => Ok(DispatchMode::Synchronous),
            "background" | "async" => Ok(DispatchMode::Background),
            _ => Err(ConfigError::invalid_value(
                "dispatch",
                s,
                "synchronous or background",
            )),
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Synchronous => write!(f, "synchronous"),
            DispatchMode::Background => write!(f, "background"),
        }
    }
}

/// Run-level controller settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunLevelConfig {
    /// Run transitions on the controller's worker thread
    pub asynchronous: bool,
    /// Level the controller advances to when created
    pub baseline: i32,
    /// Only components of this environment are activated
    pub environment: String,
}

impl Default for RunLevelConfig {
    fn default() -> Self {
        Self {
            asynchronous: false,
            baseline: RUNLEVEL_IMMEDIATE,
            environment: DEFAULT_ENVIRONMENT.to_string(),
        }
    }
}

/// Settings of one locator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    pub name: String,
    /// Name of the parent locator, resolved through the factory
    pub parent: Option<String>,
    pub dispatch: DispatchMode,
    pub run_level: RunLevelConfig,
    #[serde(skip)]
    sources: HashMap<String, ConfigSource>,
}

impl LocatorConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self {
            name: DEFAULT_LOCATOR_NAME.to_string(),
            parent: None,
            dispatch: DispatchMode::default(),
            run_level: RunLevelConfig::default(),
            sources: HashMap::new(),
        }
    }

    /// Default configuration under another name
    pub fn named(name: impl Into<String>) -> Self {
        let mut config = Self::new();
        config.name = name.into();
        config.sources.insert("name".to_string(), ConfigSource::Programmatic);
        config
    }

    /// Set the dispatch mode
    pub fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self.sources.insert("dispatch".to_string(), ConfigSource::Programmatic);
        self
    }

    /// Set the run-level settings
    pub fn with_run_level(mut self, run_level: RunLevelConfig) -> Self {
        self.run_level = run_level;
        self.sources.insert("run_level".to_string(), ConfigSource::Programmatic);
        self
    }

    /// Load configuration from a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(yaml)?;
        config.mark_document();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_str(json)?;
        config.mark_document();
        config.validate()?;
        Ok(config)
    }

    fn mark_document(&mut self) {
        for field in ["name", "parent", "dispatch", "run_level"] {
            self.sources.insert(field.to_string(), ConfigSource::Document);
        }
    }

    /// Load configuration through a variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::new();

        let track = |config: &mut Self, field: &str, var: &str, default: String, set: bool| {
            let source = if set {
                ConfigSource::EnvVar(var.to_string())
            } else {
                ConfigSource::Default(default)
            };
            config.sources.insert(field.to_string(), source);
        };

        let name = lookup(ENV_LOCATOR_NAME);
        if let Some(name) = &name {
            config.name = name.clone();
        }
        track(&mut config, "name", ENV_LOCATOR_NAME, DEFAULT_LOCATOR_NAME.to_string(), name.is_some());

        let dispatch = lookup(ENV_EVENT_DISPATCH);
        if let Some(dispatch) = &dispatch {
            config.dispatch = dispatch.parse()?;
        }
        track(
            &mut config,
            "dispatch",
            ENV_EVENT_DISPATCH,
            DispatchMode::default().to_string(),
            dispatch.is_some(),
        );

        let asynchronous = lookup(ENV_RUNLEVEL_ASYNC);
        if let Some(value) = &asynchronous {
            config.run_level.asynchronous = value.parse().map_err(|_| {
                ConfigError::invalid_value("run_level.asynchronous", value.clone(), "true or false")
            })?;
        }
        track(
            &mut config,
            "run_level.asynchronous",
            ENV_RUNLEVEL_ASYNC,
            "false".to_string(),
            asynchronous.is_some(),
        );

        let baseline = lookup(ENV_RUNLEVEL_BASELINE);
        if let Some(value) = &baseline {
            config.run_level.baseline = value.parse().map_err(|_| {
                ConfigError::invalid_value("run_level.baseline", value.clone(), "an integer run level")
            })?;
        }
        track(
            &mut config,
            "run_level.baseline",
            ENV_RUNLEVEL_BASELINE,
            RUNLEVEL_IMMEDIATE.to_string(),
            baseline.is_some(),
        );

        let environment = lookup(ENV_RUNLEVEL_ENVIRONMENT);
        if let Some(value) = &environment {
            config.run_level.environment = value.clone();
        }
        track(
            &mut config,
            "run_level.environment",
            ENV_RUNLEVEL_ENVIRONMENT,
            DEFAULT_ENVIRONMENT.to_string(),
            environment.is_some(),
        );

        config.validate()?;
        Ok(config)
    }
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader for LocatorConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        IdentifierValidator.validate("name", &self.name)?;
        IdentifierValidator.validate("run_level.environment", &self.run_level.environment)?;
        MinimumValidator {
            min: RUNLEVEL_IMMEDIATE,
        }
        .validate("run_level.baseline", &self.run_level.baseline)?;

        if let Some(parent) = &self.parent {
            IdentifierValidator.validate("parent", parent)?;
            if parent == &self.name {
                return Err(ConfigError::validation_failed(format!(
                    "locator '{}' cannot be its own parent",
                    self.name
                )));
            }
        }
        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        self.sources.clone()
    }
}
