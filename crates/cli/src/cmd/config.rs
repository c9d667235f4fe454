//! Implementation of the `fnpack config` command.
//!
//! Prints the fully merged configuration and the resolved functions as JSON.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use fnpack_lib::config::{ConfigLayer, Project};

use crate::output::print_document;

pub fn cmd_config(path: &Path) -> Result<()> {
  let project = Project::load(path, ConfigLayer::default())
    .with_context(|| format!("Failed to load project: {}", path.display()))?;

  print_document(&json!({
    "service": project.service,
    "servicePath": project.service_path,
    "config": project.config,
    "functions": project.units,
  }))
}
