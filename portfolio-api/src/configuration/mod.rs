//! Logic for loading configuration in to an object model
mod expansion;

use std::str::FromStr;

use displaydoc::Display;
pub(crate) use expansion::Expansion;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::demand_control::DemandControlConfig;

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// could not expand variable: {key}, {cause}
    CannotExpandVariable { key: String, cause: String },
    /// could not expand variable: {key}. Variables must be prefixed with one of '{supported_modes}' followed by '.' e.g. 'env.'
    UnknownExpansionMode {
        key: String,
        supported_modes: String,
    },
    /// {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },
}

/// The configuration of the portfolio API.
///
/// Can be created through `serde::Deserialize` from various formats,
/// or from YAML with environment expansion through [`FromStr`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct Configuration {
    /// Limits enforced by the query sanitizer.
    pub limits: Limits,

    /// Query cost estimation and budget.
    pub demand_control: DemandControlConfig,

    /// Request-scoped batch loading.
    pub batching: BatchingConfig,

    /// The pool of threads running parsing, costing and bulk fetches.
    pub worker_pool: WorkerPool,
}

/// Query sanitizer limits.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct Limits {
    /// Maximum length of a trimmed query, in characters.
    pub max_query_length: usize,

    /// Maximum selection nesting depth.
    pub max_query_depth: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_query_length: 10_000,
            max_query_depth: 10,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct BatchingConfig {
    /// Issue one bulk fetch per distinct filter and page instead of applying the arguments of an
    /// arbitrary key to the whole batch.
    pub partition_by_arguments: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct WorkerPool {
    /// Number of threads. Defaults to the available parallelism.
    pub threads: Option<usize>,
}

impl Configuration {
    fn validate(self) -> Result<Self, ConfigurationError> {
        let invalid = |error: &str| ConfigurationError::InvalidConfiguration {
            message: "invalid configuration value",
            error: error.to_string(),
        };
        if self.limits.max_query_length == 0 {
            return Err(invalid("limits.max_query_length must be greater than 0"));
        }
        if self.limits.max_query_depth == 0 {
            return Err(invalid("limits.max_query_depth must be greater than 0"));
        }
        if self.demand_control.max_query_cost == 0 {
            return Err(invalid("demand_control.max_query_cost must be greater than 0"));
        }
        if self.worker_pool.threads == Some(0) {
            return Err(invalid("worker_pool.threads must be greater than 0"));
        }
        Ok(self)
    }
}

impl FromStr for Configuration {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_yaml_configuration(s, Expansion::default())
    }
}

/// Parse YAML, expand variables, apply environment overrides, deserialize and check values.
pub(crate) fn validate_yaml_configuration(
    raw_yaml: &str,
    expansion: Expansion,
) -> Result<Configuration, ConfigurationError> {
    let defaulted_yaml = if raw_yaml.trim().is_empty() {
        "{}"
    } else {
        raw_yaml
    };

    let yaml: serde_json::Value = serde_yaml::from_str(defaulted_yaml).map_err(|e| {
        ConfigurationError::InvalidConfiguration {
            message: "failed to parse yaml",
            error: e.to_string(),
        }
    })?;
    let expanded = expansion.expand(&yaml)?;
    let configuration: Configuration = serde_json::from_value(expanded).map_err(|e| {
        ConfigurationError::InvalidConfiguration {
            message: "failed to deserialize configuration",
            error: e.to_string(),
        }
    })?;
    configuration.validate()
}

/// Generate the JSON schema for the configuration.
pub fn generate_config_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(Configuration)
}
