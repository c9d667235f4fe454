//! Shell command execution and the command-driven description bundler.
//!
//! A build description handled by [`CommandBundler`] looks like:
//!
//! ```lua
//! return {
//!   command = "esbuild src/handler.js --bundle --sourcemap --outfile=$out/handler.js",
//!   env = { NODE_ENV = "production" },
//!   externals = { "left-pad", "uuid" },
//! }
//! ```
//!
//! The command runs in the service directory with `out` pointing at the build
//! directory. `externals` is reported back verbatim.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use super::DescriptionBundler;
use crate::build::{BuildDescription, BuildError, Phase};
use crate::workspace::Workspace;

#[derive(Debug, Error)]
pub enum CommandError {
  #[error("failed to spawn '{cmd}': {source}")]
  Spawn { cmd: String, source: io::Error },

  #[error("command failed with exit code {code:?}: {cmd}")]
  Failed { cmd: String, code: Option<i32> },
}

/// Run `cmd` through the platform shell.
///
/// The process inherits the environment, runs in `cwd`, and additionally sees
/// `out` set to `out_dir` plus any `env` entries.
///
/// # Returns
///
/// The trimmed stdout of the command.
pub async fn run_shell(
  cmd: &str,
  cwd: &Path,
  out_dir: &Path,
  env: Option<&BTreeMap<String, String>>,
) -> Result<String, CommandError> {
  info!(cmd = %cmd, "executing command");

  let (shell, shell_args) = get_shell();

  let mut command = Command::new(shell);
  command.args(shell_args).arg(cmd).current_dir(cwd).env("out", out_dir);

  if let Some(env) = env {
    for (key, value) in env {
      command.env(key, value);
    }
  }

  debug!(shell = %shell, cwd = ?cwd, "spawning process");

  let output = command.output().await.map_err(|source| CommandError::Spawn {
    cmd: cmd.to_string(),
    source,
  })?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
      debug!(stderr = %stderr, "command stderr");
    }
    return Err(CommandError::Failed {
      cmd: cmd.to_string(),
      code: output.status.code(),
    });
  }

  let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
  if !stdout.is_empty() {
    debug!(stdout = %stdout, "command output");
  }

  Ok(stdout)
}

#[cfg(unix)]
fn get_shell() -> (&'static str, &'static [&'static str]) {
  ("/bin/sh", &["-c"])
}

#[cfg(windows)]
fn get_shell() -> (&'static str, &'static [&'static str]) {
  ("powershell.exe", &["-NoProfile", "-ExecutionPolicy", "Bypass", "-Command"])
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommandDescription {
  command: Option<String>,
  /// Working directory, relative to the service root.
  cwd: Option<String>,
  env: BTreeMap<String, String>,
  externals: Vec<String>,
}

/// Description bundler that runs the description's `command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandBundler;

#[async_trait(?Send)]
impl DescriptionBundler for CommandBundler {
  async fn bundle(&self, description: &BuildDescription, workspace: &Workspace) -> Result<Vec<String>, BuildError> {
    let parsed: CommandDescription = description
      .parse()
      .map_err(|e| BuildError::bundle(Phase::Description, format!("invalid build description: {}", e)))?;

    if let Some(cmd) = &parsed.command {
      let cwd = match &parsed.cwd {
        Some(dir) => workspace.service_path().join(dir),
        None => workspace.service_path().to_path_buf(),
      };
      run_shell(cmd, &cwd, workspace.build_dir(), Some(&parsed.env))
        .await
        .map_err(|e| BuildError::bundle(Phase::Description, e))?;
    } else {
      debug!("build description has no command");
    }

    Ok(parsed.externals)
  }
}
