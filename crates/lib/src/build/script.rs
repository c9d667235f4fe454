//! Build script loading.
//!
//! The file strategy does not know how scripts are evaluated; it hands a
//! [`BuildCtx`] to a [`ScriptLoader`] and classifies whatever comes back. The
//! default loader evaluates Lua (see [`crate::lua::loader`]).

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::output::ScriptValue;
use super::types::BuildError;
use crate::artifact::{ArtifactEntry, Payload, check_entry_name};
use crate::config::{BuildConfiguration, FunctionBuildSpec};
use crate::workspace::Workspace;

/// Evaluates a build script entry point.
#[async_trait(?Send)]
pub trait ScriptLoader {
  /// Load `entry`. If it evaluates to a callable, call it with `ctx` and wait
  /// for its result; otherwise the evaluated value is the result.
  async fn load(&self, entry: &Path, ctx: BuildCtx) -> Result<ScriptRun, BuildError>;
}

/// The outcome of running a build script.
#[derive(Debug)]
pub struct ScriptRun {
  pub value: ScriptValue,
  /// The context, carrying whatever the script recorded.
  pub ctx: BuildCtx,
}

/// The orchestration context handed to build scripts.
///
/// Scripts record archive entries and external modules here; they are merged
/// into the run's sink and external set once the script has returned.
#[derive(Debug)]
pub struct BuildCtx {
  service_path: PathBuf,
  build_dir: PathBuf,
  functions: Vec<String>,
  local_execution: bool,
  compress: bool,
  entries: Vec<ArtifactEntry>,
  externals: Vec<String>,
}

impl BuildCtx {
  pub fn new(workspace: &Workspace, config: &BuildConfiguration, units: &[FunctionBuildSpec]) -> Self {
    Self {
      service_path: workspace.service_path().to_path_buf(),
      build_dir: workspace.build_dir().to_path_buf(),
      functions: units.iter().map(|u| u.name.clone()).collect(),
      local_execution: config.local_execution,
      compress: config.zip.compress,
      entries: Vec::new(),
      externals: Vec::new(),
    }
  }

  pub fn service_path(&self) -> &Path {
    &self.service_path
  }

  pub fn build_dir(&self) -> &Path {
    &self.build_dir
  }

  pub fn functions(&self) -> &[String] {
    &self.functions
  }

  pub fn local_execution(&self) -> bool {
    self.local_execution
  }

  /// Resolve a script-relative path against the service root.
  pub fn resolve(&self, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
      path.to_path_buf()
    } else {
      self.service_path.join(path)
    }
  }

  pub fn add_external(&mut self, id: impl Into<String>) {
    self.externals.push(id.into());
  }

  /// Record a file entry. `name` defaults to the file name.
  ///
  /// Fails when no name is given and `path` has none, or when the name would
  /// escape the archive root (see [`check_entry_name`]).
  pub fn add_file(&mut self, path: PathBuf, name: Option<String>) -> io::Result<String> {
    let name = match name {
      Some(name) => name,
      None => path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
          io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("'{}' has no file name, pass one explicitly", path.display()),
          )
        })?,
    };
    self.record(name.clone(), Payload::File(path))?;
    Ok(name)
  }

  pub fn add_buffer(&mut self, bytes: Vec<u8>, name: impl Into<String>) -> io::Result<()> {
    self.record(name.into(), Payload::Buffer(bytes))
  }

  pub fn add_stream(&mut self, stream: Box<dyn Read + Send>, name: impl Into<String>) -> io::Result<()> {
    self.record(name.into(), Payload::Stream(stream))
  }

  fn record(&mut self, name: String, payload: Payload) -> io::Result<()> {
    check_entry_name(&name)?;
    self.entries.push(ArtifactEntry {
      name,
      payload,
      compress: self.compress,
    });
    Ok(())
  }

  /// Consume the context, returning recorded entries and externals.
  pub fn into_records(self) -> (Vec<ArtifactEntry>, Vec<String>) {
    (self.entries, self.externals)
  }
}
