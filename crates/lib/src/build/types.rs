//! Types shared by the build pipeline: methods, results and errors.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

use mlua::prelude::LuaError;
use thiserror::Error;

/// How the primary build phase produces its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMethod {
  /// Package the source tree once per function.
  Bundle,
  /// Run a build script once for all functions.
  File,
}

impl BuildMethod {
  pub fn as_str(&self) -> &'static str {
    match self {
      BuildMethod::Bundle => "bundle",
      BuildMethod::File => "file",
    }
  }
}

impl FromStr for BuildMethod {
  type Err = BuildError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "bundle" => Ok(BuildMethod::Bundle),
      "file" => Ok(BuildMethod::File),
      other => Err(BuildError::Configuration(format!(
        "unknown build method '{}' (expected 'bundle' or 'file')",
        other
      ))),
    }
  }
}

/// Terminal value of a build run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildResult {
  /// A persisted archive.
  Archive { path: PathBuf },
  /// Local execution: the build directory is now the execution root.
  Local { execution_root: PathBuf },
}

impl BuildResult {
  pub fn archive_path(&self) -> Option<&PathBuf> {
    match self {
      BuildResult::Archive { path } => Some(path),
      BuildResult::Local { .. } => None,
    }
  }

  pub fn execution_root(&self) -> Option<&PathBuf> {
    match self {
      BuildResult::Archive { .. } => None,
      BuildResult::Local { execution_root } => Some(execution_root),
    }
  }
}

impl fmt::Display for BuildResult {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildResult::Archive { path } => write!(f, "archive {}", path.display()),
      BuildResult::Local { execution_root } => write!(f, "execution root {}", execution_root.display()),
    }
  }
}

/// The pipeline phase an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  Configuration,
  EntryResolution,
  Script,
  Classification,
  Description,
  Source,
  Modules,
  Workspace,
  Write,
  Debug,
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Phase::Configuration => "configuration",
      Phase::EntryResolution => "entry resolution",
      Phase::Script => "build script",
      Phase::Classification => "output classification",
      Phase::Description => "description bundling",
      Phase::Source => "source bundling",
      Phase::Modules => "module bundling",
      Phase::Workspace => "workspace",
      Phase::Write => "archive write",
      Phase::Debug => "debug stop",
    };
    f.write_str(name)
  }
}

/// Errors that abort a build run. None of them are retried.
#[derive(Debug, Error)]
pub enum BuildError {
  /// Invalid configuration, detected before any filesystem mutation.
  #[error("configuration error: {0}")]
  Configuration(String),

  /// None of the build script candidates exist.
  #[error("no resolvable build entry: none of [{}] is a file", .candidates.join(", "))]
  EntryResolution { candidates: Vec<String> },

  /// The build script returned a value of an unsupported shape.
  #[error("unrecognized build output: {found}")]
  OutputClassification { found: String },

  /// Loading or running the build script failed.
  #[error("build script failed: {0}")]
  Script(#[from] LuaError),

  /// A bundling collaborator failed.
  #[error("{phase} failed: {message}")]
  Bundle { phase: Phase, message: String },

  /// Underlying filesystem failure, passed through unchanged.
  #[error("io error: {0}")]
  Io(#[from] io::Error),

  /// Writing the archive failed.
  #[error("failed to write archive {}: {source}", .path.display())]
  ArchiveWrite {
    path: PathBuf,
    source: zip::result::ZipError,
  },

  /// Deliberate stop after a successful build (`test` flag).
  #[error("--test mode, debugging stop after building {result}")]
  DebugAbort { result: BuildResult },
}

impl BuildError {
  pub fn bundle(phase: Phase, message: impl fmt::Display) -> Self {
    BuildError::Bundle {
      phase,
      message: message.to_string(),
    }
  }

  /// The phase the error originated from.
  pub fn phase(&self) -> Phase {
    match self {
      BuildError::Configuration(_) => Phase::Configuration,
      BuildError::EntryResolution { .. } => Phase::EntryResolution,
      BuildError::OutputClassification { .. } => Phase::Classification,
      BuildError::Script(_) => Phase::Script,
      BuildError::Bundle { phase, .. } => *phase,
      BuildError::Io(_) => Phase::Workspace,
      BuildError::ArchiveWrite { .. } => Phase::Write,
      BuildError::DebugAbort { .. } => Phase::Debug,
    }
  }

  /// Whether this is the deliberate post-success stop rather than a failure.
  pub fn is_debug_abort(&self) -> bool {
    matches!(self, BuildError::DebugAbort { .. })
  }
}
