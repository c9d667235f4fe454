//! Implementation of the `fnpack build` command.
//!
//! Loads the project, applies command-line overrides as the highest
//! configuration layer and runs a build.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{Map, Value};
use tracing::debug;

use fnpack_lib::build::{BuildError, BuildOrchestrator};
use fnpack_lib::config::{ConfigLayer, Project};

use crate::output::{Status, print_result, status};

/// Exit code of a run stopped by `--test`.
const DEBUG_ABORT_EXIT: u8 = 2;

#[derive(Debug, Clone, Args)]
pub struct BuildArgs {
  /// Service directory containing serverless.yml
  #[arg(default_value = ".")]
  pub path: PathBuf,

  /// Build into the build directory instead of writing an archive
  #[arg(long)]
  pub local: bool,

  /// Keep the build and artifact directories
  #[arg(long)]
  pub keep: bool,

  /// Stop with a debug error after a successful build
  #[arg(long)]
  pub test: bool,

  /// Build method: bundle or file
  #[arg(long)]
  pub method: Option<String>,

  /// Only build these functions
  #[arg(short, long = "function")]
  pub functions: Vec<String>,
}

impl BuildArgs {
  /// The configuration layer for flags given on the command line.
  fn overrides(&self) -> ConfigLayer {
    let mut values = Map::new();
    if self.local {
      values.insert("localExecution".to_string(), Value::Bool(true));
    }
    if self.keep {
      values.insert("keep".to_string(), Value::Bool(true));
    }
    if self.test {
      values.insert("test".to_string(), Value::Bool(true));
    }
    if let Some(method) = &self.method {
      values.insert("method".to_string(), Value::String(method.clone()));
    }
    if !self.functions.is_empty() {
      values.insert("function".to_string(), Value::from(self.functions.clone()));
    }
    ConfigLayer::new("command line", values)
  }
}

pub fn cmd_build(args: &BuildArgs) -> Result<ExitCode> {
  let project = Project::load(&args.path, args.overrides())
    .with_context(|| format!("Failed to load project: {}", args.path.display()))?;
  debug!(config = ?project.config, "merged configuration");

  let summary = format!(
    "Building {} ({} method, {} function(s))",
    project.service,
    project.config.method,
    project.units.len()
  );
  status(Status::Building, &summary);

  let started = Instant::now();
  let orchestrator = BuildOrchestrator::for_project(&project);
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let outcome = rt.block_on(orchestrator.run(&project.config, &project.units));

  match outcome {
    Ok(result) => {
      let elapsed = started.elapsed().as_secs_f64();
      status(Status::Built, &format!("Build finished in {:.2}s", elapsed));
      print_result(&result);
      Ok(ExitCode::SUCCESS)
    }
    Err(BuildError::DebugAbort { result }) => {
      status(Status::Stopped, "Debug stop requested, build output kept");
      print_result(&result);
      Ok(ExitCode::from(DEBUG_ABORT_EXIT))
    }
    Err(e) => Err(failure(e)),
  }
}

/// Wrap a build error so that `{:#}` shows the phase and every cause.
fn failure(e: BuildError) -> anyhow::Error {
  let phase = e.phase();
  anyhow::Error::new(e).context(format!("Build failed during {}", phase))
}
