//! Build orchestration.
//!
//! A build run selects a strategy, lets it fill an [`ArtifactSink`] and an
//! [`ExternalDependencySet`], packages the external modules, and completes the
//! run as an archive or as a local execution root.
//!
//! ```text
//! method ─┬─ bundle ─> SourceBundler per unit ─┐
//!         └─ file ───> FileBuild (script) ─────┴─> ModuleBundler ─> complete
//! ```
//!
//! # Submodules
//!
//! - [`file`] - build script strategy
//! - [`output`] - classification of script results
//! - [`script`] - script loader capability and the context handed to scripts
//! - [`complete`] - archive persistence and cleanup

pub mod complete;
pub mod file;
pub mod output;
pub mod script;
mod types;

pub use complete::complete;
pub use file::FileBuild;
pub use output::{BuildDescription, BuildOutput, ScriptValue, classify};
pub use script::{BuildCtx, ScriptLoader, ScriptRun};
pub use types::*;

use tracing::info;

use crate::artifact::ArtifactSink;
use crate::bundle::{
  CommandBundler, DescriptionBundler, ModuleBundler, ModuleRequest, NodeModuleBundler, SourceBundler, SourceRequest,
  TreeBundler,
};
use crate::config::{BuildConfiguration, FunctionBuildSpec, Project};
use crate::externals::ExternalDependencySet;
use crate::lua::LuaScriptLoader;
use crate::workspace::Workspace;

/// Drives one build run over a workspace.
///
/// The orchestrator owns the sink and the external set for the duration of a
/// run; phases only append to them.
pub struct BuildOrchestrator {
  workspace: Workspace,
  service: String,
  loader: Box<dyn ScriptLoader>,
  description_bundler: Box<dyn DescriptionBundler>,
  source_bundler: Box<dyn SourceBundler>,
  module_bundler: Box<dyn ModuleBundler>,
}

impl BuildOrchestrator {
  /// Orchestrator with the default Lua loader and bundlers.
  pub fn new(workspace: Workspace, service: impl Into<String>) -> Self {
    Self {
      workspace,
      service: service.into(),
      loader: Box::new(LuaScriptLoader::new()),
      description_bundler: Box::new(CommandBundler),
      source_bundler: Box::new(TreeBundler),
      module_bundler: Box::new(NodeModuleBundler),
    }
  }

  pub fn for_project(project: &Project) -> Self {
    Self::new(Workspace::new(&project.service_path), project.service.clone())
  }

  pub fn with_loader(mut self, loader: impl ScriptLoader + 'static) -> Self {
    self.loader = Box::new(loader);
    self
  }

  pub fn with_description_bundler(mut self, bundler: impl DescriptionBundler + 'static) -> Self {
    self.description_bundler = Box::new(bundler);
    self
  }

  pub fn with_source_bundler(mut self, bundler: impl SourceBundler + 'static) -> Self {
    self.source_bundler = Box::new(bundler);
    self
  }

  pub fn with_module_bundler(mut self, bundler: impl ModuleBundler + 'static) -> Self {
    self.module_bundler = Box::new(bundler);
    self
  }

  pub fn workspace(&self) -> &Workspace {
    &self.workspace
  }

  /// Run a build of `units` with `config`.
  ///
  /// # Errors
  ///
  /// Fails with the first phase error. With `config.test` set, a successful
  /// run ends in [`BuildError::DebugAbort`] carrying the result; the archive
  /// stays on disk.
  pub async fn run(&self, config: &BuildConfiguration, units: &[FunctionBuildSpec]) -> Result<BuildResult, BuildError> {
    let method: BuildMethod = config.method.parse()?;
    info!(method = %method.as_str(), service = %self.service, functions = units.len(), "starting build");

    let entry = match method {
      BuildMethod::File => Some(file::resolve_entry(self.workspace.service_path(), &config.try_files).await?),
      BuildMethod::Bundle => None,
    };

    self.workspace.ensure().await?;

    let mut sink = ArtifactSink::new();
    let mut externals = ExternalDependencySet::new();

    match entry {
      Some(entry) => {
        FileBuild::new(self.loader.as_ref(), self.description_bundler.as_ref())
          .build(&entry, config, units, &self.workspace, &mut sink, &mut externals)
          .await?;
      }
      None => {
        for unit in units {
          info!(function = %unit.name, "bundle phase");
          let request = SourceRequest {
            unit,
            workspace: &self.workspace,
            compress: config.zip.compress,
            local_execution: config.local_execution,
          };
          self.source_bundler.bundle(&request, &mut sink).await?;
        }
      }
    }

    externals.extend(config.modules.include.iter().cloned());
    info!(externals = ?externals.to_vec(), "module phase");
    let request = ModuleRequest {
      include: &externals,
      exclude: &config.modules.exclude,
      deep_exclude: &config.modules.deep_exclude,
      workspace: &self.workspace,
      compress: config.zip.compress,
      local_execution: config.local_execution,
    };
    self.module_bundler.bundle(&request, &mut sink).await?;

    info!(entries = sink.len(), "completion phase");
    let result = complete(sink, &self.workspace, &self.service, config).await?;
    info!(result = %result, "build finished");

    if config.test {
      return Err(BuildError::DebugAbort { result });
    }
    Ok(result)
  }
}
