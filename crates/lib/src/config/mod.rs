//! Project configuration.
//!
//! A project is a service directory containing `serverless.yml` and,
//! optionally, `serverless.build.yml`. Loading merges, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. `custom.build` from `serverless.yml`
//! 3. `serverless.build.yml`
//! 4. per-invocation overrides (CLI flags)
//!
//! Per-function include/exclude lists are then resolved from the merged
//! configuration and each function's `package` section.

pub mod merge;
pub mod types;

pub use merge::{ConfigLayer, merge_layers, resolve_units};
pub use types::*;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::consts::{BUILD_CONFIG_FILE, SERVICE_FILE};

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read {path}: {source}")]
  Read { path: PathBuf, source: io::Error },

  #[error("failed to parse {path}: {source}")]
  Parse { path: PathBuf, source: serde_yaml::Error },

  #[error("{source_name} must be a mapping")]
  InvalidLayer { source_name: String },

  #[error("invalid configuration in {source_name}: {source}")]
  Invalid {
    source_name: String,
    source: serde_json::Error,
  },

  #[error("{path} does not declare a service name")]
  MissingService { path: PathBuf },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServiceName {
  Name(String),
  Table { name: String },
}

#[derive(Debug, Deserialize)]
struct ServiceFile {
  service: Option<ServiceName>,
  #[serde(default)]
  custom: serde_yaml::Mapping,
  #[serde(default)]
  functions: serde_yaml::Mapping,
}

/// The parts of `serverless.yml` the build consumes.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
  pub service: String,
  /// The `custom.build` section, if any.
  pub custom_build: serde_yaml::Value,
  /// Declared functions, in declaration order.
  pub functions: Vec<(String, FunctionDefinition)>,
}

impl ServiceDefinition {
  /// Parse a service definition from YAML text.
  pub fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
    let parse_err = |source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    };

    let file: ServiceFile = serde_yaml::from_str(content).map_err(parse_err)?;

    let service = match file.service {
      Some(ServiceName::Name(name)) | Some(ServiceName::Table { name }) => name,
      None => return Err(ConfigError::MissingService { path: path.to_path_buf() }),
    };

    let custom_build = file.custom.get("build").cloned().unwrap_or(serde_yaml::Value::Null);

    let mut functions = Vec::with_capacity(file.functions.len());
    for (key, value) in file.functions {
      let Some(name) = key.as_str().map(str::to_string) else {
        continue;
      };
      let definition = if value.is_null() {
        FunctionDefinition::default()
      } else {
        serde_yaml::from_value(value).map_err(parse_err)?
      };
      functions.push((name, definition));
    }

    Ok(Self {
      service,
      custom_build,
      functions,
    })
  }

  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::parse(path, &content)
  }
}

/// A loaded project: service identity, merged configuration and units.
#[derive(Debug, Clone)]
pub struct Project {
  pub service_path: PathBuf,
  pub service: String,
  pub config: BuildConfiguration,
  pub units: Vec<FunctionBuildSpec>,
}

impl Project {
  /// Load the project rooted at `service_path`, applying `overrides` last.
  pub fn load(service_path: &Path, overrides: ConfigLayer) -> Result<Self, ConfigError> {
    let service_path = dunce::canonicalize(service_path).map_err(|source| ConfigError::Read {
      path: service_path.to_path_buf(),
      source,
    })?;

    let definition = ServiceDefinition::load(&service_path.join(SERVICE_FILE))?;

    let mut layers = vec![ConfigLayer::from_yaml(
      "custom.build",
      definition.custom_build.clone(),
    )?];

    let build_config_path = service_path.join(BUILD_CONFIG_FILE);
    match fs::read_to_string(&build_config_path) {
      Ok(content) => {
        let value: serde_yaml::Value = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
          path: build_config_path.clone(),
          source,
        })?;
        layers.push(ConfigLayer::from_yaml(BUILD_CONFIG_FILE, value)?);
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %build_config_path.display(), "no build config file");
      }
      Err(source) => {
        return Err(ConfigError::Read {
          path: build_config_path,
          source,
        });
      }
    }

    layers.push(overrides);

    let config = merge_layers(layers)?;
    let units = resolve_units(&config, &definition.functions);

    Ok(Self {
      service_path,
      service: definition.service,
      config,
      units,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use tempfile::TempDir;

  const SERVICE_YML: &str = r#"
service: shop
custom:
  build:
    method: file
    keep: true
    tryFiles:
      - custom.lua
functions:
  checkout:
    handler: handler.checkout
    package:
      include:
        - src/checkout/**
  refund:
    handler: handler.refund
"#;

  fn project_dir(build_yml: Option<&str>) -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join(SERVICE_FILE), SERVICE_YML).unwrap();
    if let Some(content) = build_yml {
      fs::write(temp.path().join(BUILD_CONFIG_FILE), content).unwrap();
    }
    temp
  }

  #[test]
  fn parses_service_definition() {
    let definition = ServiceDefinition::parse(Path::new(SERVICE_FILE), SERVICE_YML).unwrap();
    assert_eq!(definition.service, "shop");
    let names: Vec<_> = definition.functions.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["checkout", "refund"]);
    assert_eq!(definition.functions[0].1.package.include, vec!["src/checkout/**"]);
  }

  #[test]
  fn accepts_service_table_syntax() {
    let definition = ServiceDefinition::parse(Path::new(SERVICE_FILE), "service:\n  name: shop\n").unwrap();
    assert_eq!(definition.service, "shop");
    assert!(definition.functions.is_empty());
  }

  #[test]
  fn missing_service_name_is_an_error() {
    let err = ServiceDefinition::parse(Path::new(SERVICE_FILE), "functions: {}\n").unwrap_err();
    assert!(matches!(err, ConfigError::MissingService { .. }));
  }

  #[test]
  fn build_file_overrides_custom_section() {
    let temp = project_dir(Some("tryFiles:\n  - file.lua\n"));
    let project = Project::load(temp.path(), ConfigLayer::default()).unwrap();

    assert_eq!(project.service, "shop");
    assert_eq!(project.config.method, "file");
    assert!(project.config.keep);
    assert_eq!(project.config.try_files, vec!["file.lua"]);
    assert_eq!(project.units.len(), 2);
  }

  #[test]
  fn overrides_apply_last() {
    let temp = project_dir(Some("keep: true\n"));
    let overrides = ConfigLayer::from_value("cli", json!({ "keep": false, "function": "refund" })).unwrap();
    let project = Project::load(temp.path(), overrides).unwrap();

    assert!(!project.config.keep);
    assert_eq!(project.units.len(), 1);
    assert_eq!(project.units[0].name, "refund");
  }

  #[test]
  fn missing_build_file_is_fine() {
    let temp = project_dir(None);
    let project = Project::load(temp.path(), ConfigLayer::default()).unwrap();
    assert_eq!(project.config.try_files, vec!["custom.lua"]);
  }

  #[test]
  fn malformed_build_file_is_reported() {
    let temp = project_dir(Some("tryFiles: [unclosed\n"));
    let err = Project::load(temp.path(), ConfigLayer::default()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
  }
}
