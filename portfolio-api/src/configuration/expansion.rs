//! Environment variable expansion in the configuration file

use std::collections::HashMap;
use std::env;
use std::fs;
use std::str::FromStr;

use proteus::Parser;
use proteus::TransformBuilder;
use serde_json::Value;

use super::ConfigurationError;

#[derive(buildstructor::Builder, Clone)]
pub(crate) struct Expansion {
    supported_modes: Vec<String>,
    override_configs: Vec<Override>,
    #[cfg(test)]
    mocked_env_vars: HashMap<String, String>,
}

#[derive(buildstructor::Builder, Clone)]
pub(crate) struct Override {
    /// The dotted path to the config value to override.
    config_path: String,
    /// Env variables take precedence over any override values.
    env_name: Option<String>,
    /// Override value
    value: Option<Value>,
    /// The type of the value, used to coerce env variables.
    value_type: ValueType,
    #[cfg(test)]
    mocked_env_vars: HashMap<String, String>,
}

#[derive(Clone)]
pub(crate) enum ValueType {
    String,
    Number,
    Bool,
}

impl Override {
    fn value(&self) -> Option<Value> {
        // Order of precedence is:
        // 1. In tests only, if the mocked env variable is set, use that
        // 2. If the env variable is set, use that
        // 3. If the override is set, use that
        // 4. Don't change the config
        let env_value = self.env_name.as_ref().and_then(|name| {
            #[cfg(test)]
            if let Some(value) = self.mocked_env_vars.get(name) {
                return Some(value.clone());
            }
            env::var(name).ok()
        });
        match (env_value, self.value.clone()) {
            (Some(value), _) => {
                // Coerce the env variable into the correct format, otherwise let it through as a string
                let parsed = Value::from_str(&value);
                let string_var = Value::String(value);
                Some(match (&self.value_type, parsed) {
                    (ValueType::Bool, Ok(Value::Bool(bool))) => Value::Bool(bool),
                    (ValueType::Number, Ok(Value::Number(number))) => Value::Number(number),
                    _ => string_var,
                })
            }
            (_, Some(value)) => Some(value),
            _ => None,
        }
    }
}

#[buildstructor::buildstructor]
impl Expansion {
    pub(crate) fn default() -> Self {
        Self::default_builder().build()
    }

    #[builder]
    pub(crate) fn default_new(
        #[cfg_attr(not(test), allow(unused))] mocked_env_vars: HashMap<String, String>,
    ) -> Self {
        let env_override = |config_path: &str, env_name: &str, value_type: ValueType| {
            let builder = Override::builder()
                .config_path(config_path)
                .env_name(env_name)
                .value_type(value_type);
            #[cfg(test)]
            let builder = builder.mocked_env_vars(mocked_env_vars.clone());
            builder.build()
        };

        let builder = Expansion::builder();
        #[cfg(test)]
        let builder = builder.mocked_env_vars(mocked_env_vars.clone());
        builder
            .supported_mode("env")
            .supported_mode("file")
            .override_config(env_override(
                "limits.max_query_length",
                "PORTFOLIO_MAX_QUERY_LENGTH",
                ValueType::Number,
            ))
            .override_config(env_override(
                "limits.max_query_depth",
                "PORTFOLIO_MAX_QUERY_DEPTH",
                ValueType::Number,
            ))
            .override_config(env_override(
                "demand_control.max_query_cost",
                "PORTFOLIO_MAX_QUERY_COST",
                ValueType::Number,
            ))
            .override_config(env_override(
                "demand_control.mode",
                "PORTFOLIO_DEMAND_CONTROL_MODE",
                ValueType::String,
            ))
            .override_config(env_override(
                "batching.partition_by_arguments",
                "PORTFOLIO_PARTITION_BY_ARGUMENTS",
                ValueType::Bool,
            ))
            .build()
    }
}

impl Expansion {
    fn context_fn(&self) -> impl Fn(&str) -> Result<Option<String>, ConfigurationError> + '_ {
        move |key: &str| {
            if !self
                .supported_modes
                .iter()
                .any(|prefix| key.starts_with(prefix.as_str()))
            {
                return Err(ConfigurationError::UnknownExpansionMode {
                    key: key.to_string(),
                    supported_modes: self.supported_modes.join("|"),
                });
            }

            if let Some(key) = key.strip_prefix("env.") {
                return self.get_env(key).map(Some).map_err(|cause| {
                    ConfigurationError::CannotExpandVariable {
                        key: key.to_string(),
                        cause: format!("{cause}"),
                    }
                });
            }
            if let Some(key) = key.strip_prefix("file.") {
                if !std::path::Path::new(key).exists() {
                    return Ok(None);
                }

                return fs::read_to_string(key).map(Some).map_err(|cause| {
                    ConfigurationError::CannotExpandVariable {
                        key: key.to_string(),
                        cause: format!("{cause}"),
                    }
                });
            }
            Err(ConfigurationError::UnknownExpansionMode {
                key: key.to_string(),
                supported_modes: self.supported_modes.join("|"),
            })
        }
    }

    fn get_env(&self, name: &str) -> Result<String, env::VarError> {
        #[cfg(test)]
        if let Some(value) = self.mocked_env_vars.get(name) {
            return Ok(value.clone());
        }
        env::var(name)
    }

    pub(crate) fn expand(&self, configuration: &Value) -> Result<Value, ConfigurationError> {
        let mut configuration = configuration.clone();
        self.visit(&mut configuration)?;
        self.overrides(&mut configuration)?;
        Ok(configuration)
    }

    fn overrides(&self, config: &mut Value) -> Result<(), ConfigurationError> {
        // Copy the whole document first, then set each overridden leaf
        let mut transformer_builder =
            TransformBuilder::default().add_action(Parser::parse("", "").map_err(invalid_override)?);
        for override_config in &self.override_configs {
            if let Some(value) = override_config.value() {
                transformer_builder = transformer_builder.add_action(
                    Parser::parse(&format!("const({value})"), &override_config.config_path)
                        .map_err(invalid_override)?,
                );
            }
        }
        *config = transformer_builder
            .build()
            .map_err(invalid_override)?
            .apply(config)
            .map_err(|e| ConfigurationError::InvalidConfiguration {
                message: "could not apply configuration overrides as the source configuration had an invalid structure",
                error: e.to_string(),
            })?;
        Ok(())
    }

    fn visit(&self, value: &mut Value) -> Result<(), ConfigurationError> {
        let mut expanded: Option<String> = None;
        match value {
            Value::String(value) => {
                let new_value =
                    shellexpand::env_with_context(value, self.context_fn()).map_err(|e| e.cause)?;
                if &new_value != value {
                    expanded = Some(new_value.to_string());
                }
            }
            Value::Array(a) => {
                for v in a {
                    self.visit(v)?
                }
            }
            Value::Object(o) => {
                for v in o.values_mut() {
                    self.visit(v)?
                }
            }
            _ => {}
        }
        // The expansion may have resulted in a primitive, reparse and replace
        if let Some(expanded) = expanded {
            *value = coerce(&expanded)
        }
        Ok(())
    }
}

fn invalid_override(e: impl std::fmt::Display) -> ConfigurationError {
    ConfigurationError::InvalidConfiguration {
        message: "invalid configuration override",
        error: e.to_string(),
    }
}

pub(crate) fn coerce(expanded: &str) -> Value {
    match serde_yaml::from_str(expanded) {
        Ok(Value::Bool(b)) => Value::Bool(b),
        Ok(Value::Number(n)) => Value::Number(n),
        Ok(Value::Null) => Value::Null,
        _ => Value::String(expanded.to_string()),
    }
}

#[cfg(test)]
mod test {
    use serde_json::Value;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_override_precedence() {
        assert_eq!(
            None,
            Override::builder()
                .mocked_env_var("TEST_OVERRIDE", "env_override")
                .config_path("")
                .value_type(ValueType::String)
                .build()
                .value()
        );
        assert_eq!(
            Some(Value::String("override".to_string())),
            Override::builder()
                .mocked_env_var("TEST_OVERRIDE", "env_override")
                .config_path("")
                .env_name("PORTFOLIO_NON_EXISTENT")
                .value("override")
                .value_type(ValueType::String)
                .build()
                .value()
        );
        assert_eq!(
            Some(Value::String("env_override".to_string())),
            Override::builder()
                .mocked_env_var("TEST_OVERRIDE", "env_override")
                .config_path("")
                .env_name("TEST_OVERRIDE")
                .value("override")
                .value_type(ValueType::String)
                .build()
                .value()
        );
    }

    #[test]
    fn test_override_coercion() {
        let value = |value_type: ValueType, raw: &str| {
            Override::builder()
                .mocked_env_var("TEST_OVERRIDE", raw)
                .config_path("")
                .env_name("TEST_OVERRIDE")
                .value_type(value_type)
                .build()
                .value()
        };
        assert_eq!(value(ValueType::Number, "12"), Some(json!(12)));
        assert_eq!(value(ValueType::Number, "twelve"), Some(json!("twelve")));
        assert_eq!(value(ValueType::Bool, "true"), Some(json!(true)));
        assert_eq!(value(ValueType::String, "12"), Some(json!("12")));
    }

    #[test]
    fn test_env_expansion() {
        let expansion = Expansion::builder()
            .supported_mode("env")
            .mocked_env_var("PORTFOLIO_TEST_DEPTH", "12")
            .build();
        let expanded = expansion
            .expand(&json!({
                "limits": {
                    "max_query_depth": "${env.PORTFOLIO_TEST_DEPTH}",
                    "max_query_length": "${env.PORTFOLIO_TEST_UNSET:-500}"
                }
            }))
            .unwrap();
        assert_eq!(
            expanded,
            json!({ "limits": { "max_query_depth": 12, "max_query_length": 500 } })
        );
    }

    #[test]
    fn test_unknown_expansion_mode() {
        let expansion = Expansion::builder().supported_mode("env").build();
        let error = expansion
            .expand(&json!({ "limits": { "max_query_depth": "${secret.DEPTH}" } }))
            .unwrap_err();
        assert!(matches!(
            error,
            ConfigurationError::UnknownExpansionMode { .. }
        ));
    }

    #[test]
    fn test_overrides_create_missing_sections() {
        let expansion = Expansion::default_builder()
            .mocked_env_var("PORTFOLIO_MAX_QUERY_COST", "1000")
            .mocked_env_var("PORTFOLIO_DEMAND_CONTROL_MODE", "measure")
            .build();
        let expanded = expansion
            .expand(&json!({ "limits": { "max_query_depth": 5 } }))
            .unwrap();
        assert_eq!(
            expanded,
            json!({
                "limits": { "max_query_depth": 5 },
                "demand_control": { "max_query_cost": 1000, "mode": "measure" }
            })
        );
    }

    #[test]
    fn test_override_into_scalar_never_keeps_the_scalar() {
        let expansion = Expansion::default_builder()
            .mocked_env_var("PORTFOLIO_MAX_QUERY_DEPTH", "5")
            .build();
        // Either the override wins or the document is refused
        match expansion.expand(&json!({ "limits": 3 })) {
            Ok(expanded) => assert_eq!(expanded["limits"]["max_query_depth"], json!(5)),
            Err(error) => assert!(matches!(
                error,
                ConfigurationError::InvalidConfiguration { .. }
            )),
        }
    }

    #[test]
    fn test_string_override_is_quoted() {
        let expansion = Expansion::default_builder()
            .mocked_env_var("PORTFOLIO_DEMAND_CONTROL_MODE", "measure")
            .mocked_env_var("PORTFOLIO_PARTITION_BY_ARGUMENTS", "true")
            .build();
        let expanded = expansion.expand(&json!({})).unwrap();
        assert_eq!(expanded["demand_control"]["mode"], json!("measure"));
        assert_eq!(expanded["batching"]["partition_by_arguments"], json!(true));
    }

    #[test]
    fn test_coerce() {
        assert_eq!(coerce("true"), json!(true));
        assert_eq!(coerce("42"), json!(42));
        assert_eq!(coerce("~"), Value::Null);
        assert_eq!(coerce("measure"), json!("measure"));
    }
}
