//! Bundling collaborators.
//!
//! The pipeline depends on three bundlers only through these traits:
//!
//! - [`DescriptionBundler`] turns a structured build description into files
//!   in the build directory and reports external modules
//! - [`SourceBundler`] packages a unit's source tree
//! - [`ModuleBundler`] packages runtime modules and their dependencies
//!
//! Default implementations live in the submodules. The source and module
//! bundlers walk directories on the blocking pool and only touch the sink
//! once the walk has finished.

pub mod command;
pub mod modules;
pub mod source;

pub use command::CommandBundler;
pub use modules::NodeModuleBundler;
pub use source::TreeBundler;

use std::io;
use std::path::Path;

use async_trait::async_trait;

use crate::artifact::{ArtifactEntry, ArtifactSink, Payload, stage_entry};
use crate::build::{BuildDescription, BuildError, Phase};
use crate::config::FunctionBuildSpec;
use crate::externals::ExternalDependencySet;
use crate::workspace::Workspace;

/// Executes a structured build description.
#[async_trait(?Send)]
pub trait DescriptionBundler {
  /// Build `description` into the workspace's build directory and return the
  /// identifiers of modules left external.
  async fn bundle(&self, description: &BuildDescription, workspace: &Workspace) -> Result<Vec<String>, BuildError>;
}

/// Input for one source bundling run.
#[derive(Debug, Clone, Copy)]
pub struct SourceRequest<'a> {
  pub unit: &'a FunctionBuildSpec,
  pub workspace: &'a Workspace,
  pub compress: bool,
  pub local_execution: bool,
}

/// Packages a unit's source files.
#[async_trait(?Send)]
pub trait SourceBundler {
  async fn bundle(&self, request: &SourceRequest<'_>, sink: &mut ArtifactSink) -> Result<(), BuildError>;
}

/// Input for the module bundling phase.
#[derive(Debug, Clone, Copy)]
pub struct ModuleRequest<'a> {
  /// Root modules to package.
  pub include: &'a ExternalDependencySet,
  /// Root modules never packaged.
  pub exclude: &'a [String],
  /// Transitive modules never packaged.
  pub deep_exclude: &'a [String],
  pub workspace: &'a Workspace,
  pub compress: bool,
  pub local_execution: bool,
}

/// Packages runtime modules.
#[async_trait(?Send)]
pub trait ModuleBundler {
  async fn bundle(&self, request: &ModuleRequest<'_>, sink: &mut ArtifactSink) -> Result<(), BuildError>;
}

/// Run directory walks and file copies on the blocking pool.
pub(crate) async fn on_blocking_pool<T, F>(phase: Phase, work: F) -> Result<T, BuildError>
where
  T: Send + 'static,
  F: FnOnce() -> Result<T, BuildError> + Send + 'static,
{
  tokio::task::spawn_blocking(work)
    .await
    .map_err(|e| BuildError::bundle(phase, e))?
}

/// Entry for the file at `path`, archived as `name`.
///
/// With `stage_into` set (local execution), the file is first copied to
/// `<stage_into>/<name>` and the entry refers to the copy.
pub(crate) fn output_entry(
  path: &Path,
  name: String,
  compress: bool,
  stage_into: Option<&Path>,
) -> io::Result<ArtifactEntry> {
  let entry = ArtifactEntry {
    name,
    payload: Payload::File(path.to_path_buf()),
    compress,
  };

  match stage_into {
    Some(dir) => stage_entry(entry, dir),
    None => Ok(entry),
  }
}

/// Archive name for a path relative to a bundling root, always `/`-separated.
pub(crate) fn archive_name(relative: &Path) -> String {
  relative
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}
