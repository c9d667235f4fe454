//! Configuration types.
//!
//! `BuildConfiguration` is produced once per invocation by merging every
//! configuration layer (see [`super::merge`]) and is read-only afterwards.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_BUILD_SCRIPT, NODE_MODULES};

/// Fully merged settings for one build run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuildConfiguration {
  /// Build script candidates, probed in order relative to the service root.
  pub try_files: Vec<String>,
  /// Patterns excluded from every unit before any other exclude.
  pub base_exclude: Vec<String>,
  pub include: Vec<String>,
  pub exclude: Vec<String>,
  pub modules: ModulesConfig,
  pub zip: ZipOptions,
  /// Build method name; validated by the orchestrator.
  pub method: String,
  /// Keep the build and artifact directories after completion.
  pub keep: bool,
  /// Abort with a debug error after a fully successful build.
  pub test: bool,
  pub local_execution: bool,
  /// Restrict the build to these functions. Empty means every function.
  #[serde(deserialize_with = "one_or_many")]
  pub function: Vec<String>,
  /// Per-function overrides, keyed by function name.
  pub functions: BTreeMap<String, FunctionOverrides>,
}

impl Default for BuildConfiguration {
  fn default() -> Self {
    Self {
      try_files: vec![DEFAULT_BUILD_SCRIPT.to_string()],
      base_exclude: vec![NODE_MODULES.to_string()],
      include: Vec::new(),
      exclude: Vec::new(),
      modules: ModulesConfig::default(),
      zip: ZipOptions::default(),
      method: "bundle".to_string(),
      keep: false,
      test: false,
      local_execution: false,
      function: Vec::new(),
      functions: BTreeMap::new(),
    }
  }
}

/// Module bundling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModulesConfig {
  /// Modules always packaged, in addition to discovered externals.
  pub include: Vec<String>,
  /// Root modules never packaged.
  pub exclude: Vec<String>,
  /// Transitive modules never packaged.
  pub deep_exclude: Vec<String>,
}

impl Default for ModulesConfig {
  fn default() -> Self {
    Self {
      include: Vec::new(),
      exclude: vec!["aws-sdk".to_string()],
      deep_exclude: vec!["aws-sdk".to_string()],
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZipOptions {
  pub compress: bool,
}

impl Default for ZipOptions {
  fn default() -> Self {
    Self { compress: true }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionOverrides {
  pub include: Vec<String>,
  pub exclude: Vec<String>,
}

/// A single deployable unit with its resolved path lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionBuildSpec {
  pub name: String,
  pub include: Vec<String>,
  pub exclude: Vec<String>,
}

/// The `package` section of a function in `serverless.yml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PackageSpec {
  pub include: Vec<String>,
  pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FunctionDefinition {
  pub package: PackageSpec,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
  One(String),
  Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
    Some(OneOrMany::One(name)) => vec![name],
    Some(OneOrMany::Many(names)) => names,
    None => Vec::new(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_plugin_defaults() {
    let config = BuildConfiguration::default();
    assert_eq!(config.try_files, vec!["build.lua"]);
    assert_eq!(config.method, "bundle");
    assert!(config.zip.compress);
    assert_eq!(config.modules.exclude, vec!["aws-sdk"]);
    assert!(!config.keep);
  }

  #[test]
  fn function_accepts_string_or_list() {
    let single: BuildConfiguration = serde_json::from_str(r#"{ "function": "hello" }"#).unwrap();
    assert_eq!(single.function, vec!["hello"]);

    let many: BuildConfiguration = serde_json::from_str(r#"{ "function": ["a", "b"] }"#).unwrap();
    assert_eq!(many.function, vec!["a", "b"]);

    let none: BuildConfiguration = serde_json::from_str(r#"{ "function": null }"#).unwrap();
    assert!(none.function.is_empty());
  }

  #[test]
  fn camel_case_keys() {
    let config: BuildConfiguration =
      serde_json::from_str(r#"{ "tryFiles": ["a.lua"], "modules": { "deepExclude": [] }, "localExecution": true }"#)
        .unwrap();
    assert_eq!(config.try_files, vec!["a.lua"]);
    assert!(config.modules.deep_exclude.is_empty());
    assert_eq!(config.modules.exclude, vec!["aws-sdk"]);
    assert!(config.local_execution);
  }
}
