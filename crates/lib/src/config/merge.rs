//! Layered configuration merge and per-function resolution.
//!
//! Layers are applied lowest precedence first. Each layer replaces whole
//! top-level keys of the layers below it; keys set to null are ignored.

use serde_json::{Map, Value};

use super::ConfigError;
use super::types::{BuildConfiguration, FunctionBuildSpec, FunctionDefinition};

/// One source of configuration values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigLayer {
  /// Where the values came from, for error messages.
  pub source: String,
  pub values: Map<String, Value>,
}

impl ConfigLayer {
  pub fn new(source: impl Into<String>, values: Map<String, Value>) -> Self {
    Self {
      source: source.into(),
      values,
    }
  }

  /// Build a layer from an arbitrary value. Null is an empty layer; anything
  /// other than a mapping is rejected.
  pub fn from_value(source: impl Into<String>, value: Value) -> Result<Self, ConfigError> {
    let source = source.into();
    match value {
      Value::Null => Ok(Self::new(source, Map::new())),
      Value::Object(values) => Ok(Self::new(source, values)),
      _ => Err(ConfigError::InvalidLayer { source_name: source }),
    }
  }

  pub fn from_yaml(source: impl Into<String>, value: serde_yaml::Value) -> Result<Self, ConfigError> {
    let source = source.into();
    let value = serde_json::to_value(value).map_err(|e| ConfigError::Invalid {
      source_name: source.clone(),
      source: e,
    })?;
    Self::from_value(source, value)
  }
}

/// Merge layers on top of the built-in defaults.
pub fn merge_layers<I>(layers: I) -> Result<BuildConfiguration, ConfigError>
where
  I: IntoIterator<Item = ConfigLayer>,
{
  let mut merged = default_values()?;
  for layer in layers {
    for (key, value) in layer.values {
      if value.is_null() {
        continue;
      }
      merged.insert(key, value);
    }
  }

  serde_json::from_value(Value::Object(merged)).map_err(|e| ConfigError::Invalid {
    source_name: "merged configuration".to_string(),
    source: e,
  })
}

fn default_values() -> Result<Map<String, Value>, ConfigError> {
  match serde_json::to_value(BuildConfiguration::default()) {
    Ok(Value::Object(map)) => Ok(map),
    Ok(_) => Ok(Map::new()),
    Err(e) => Err(ConfigError::Invalid {
      source_name: "defaults".to_string(),
      source: e,
    }),
  }
}

/// Resolve the units to build from the declared functions.
///
/// `config.function` selects functions by name; unknown names are dropped and
/// an empty selection means every function in declaration order.
pub fn resolve_units(config: &BuildConfiguration, functions: &[(String, FunctionDefinition)]) -> Vec<FunctionBuildSpec> {
  let selected: Vec<&(String, FunctionDefinition)> = functions
    .iter()
    .filter(|(name, _)| config.function.contains(name))
    .collect();

  let selected = if selected.is_empty() {
    functions.iter().collect()
  } else {
    selected
  };

  selected
    .into_iter()
    .map(|(name, definition)| {
      let overrides = config.functions.get(name).cloned().unwrap_or_default();

      let include = config
        .include
        .iter()
        .chain(&definition.package.include)
        .chain(&overrides.include)
        .cloned()
        .collect();

      let exclude = config
        .base_exclude
        .iter()
        .chain(&config.exclude)
        .chain(&definition.package.exclude)
        .chain(&overrides.exclude)
        .cloned()
        .collect();

      FunctionBuildSpec {
        name: name.clone(),
        include,
        exclude,
      }
    })
    .collect()
}
