//! The build script strategy.
//!
//! Resolves a script from the configured candidates, runs it through a
//! [`ScriptLoader`], classifies the result and routes it into the sink:
//!
//! - a description goes to the [`DescriptionBundler`]; its externals are
//!   recorded and the derived `handler.js` / `handler.js.map` files are picked
//!   up from the build directory
//! - raw content and streams become the `handler.js` entry

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use super::output::{BuildOutput, classify};
use super::script::{BuildCtx, ScriptLoader, ScriptRun};
use super::types::{BuildError, Phase};
use crate::artifact::{ArtifactEntry, ArtifactSink, Payload, stage_entry};
use crate::bundle::DescriptionBundler;
use crate::config::{BuildConfiguration, FunctionBuildSpec};
use crate::consts::{DEBUG_MAP, PRIMARY_PAYLOAD};
use crate::externals::ExternalDependencySet;
use crate::workspace::Workspace;

/// Find the first candidate that is a regular file below `service_path`.
pub async fn resolve_entry(service_path: &Path, candidates: &[String]) -> Result<PathBuf, BuildError> {
  for candidate in candidates {
    let path = service_path.join(candidate);
    match fs::metadata(&path).await {
      Ok(meta) if meta.is_file() => {
        debug!(entry = %path.display(), "resolved build script");
        return Ok(path);
      }
      Ok(_) => debug!(candidate = %candidate, "build script candidate is not a file"),
      Err(e) if e.kind() == io::ErrorKind::NotFound => debug!(candidate = %candidate, "build script candidate missing"),
      Err(e) => {
        return Err(BuildError::bundle(
          Phase::EntryResolution,
          format!("cannot stat '{}': {}", path.display(), e),
        ));
      }
    }
  }

  Err(BuildError::EntryResolution {
    candidates: candidates.to_vec(),
  })
}

pub struct FileBuild<'a> {
  loader: &'a dyn ScriptLoader,
  bundler: &'a dyn DescriptionBundler,
}

impl<'a> FileBuild<'a> {
  pub fn new(loader: &'a dyn ScriptLoader, bundler: &'a dyn DescriptionBundler) -> Self {
    Self { loader, bundler }
  }

  /// Run the script at `entry` for all `units`.
  ///
  /// Returns once every entry the script produced is registered in `sink`
  /// (or confirmed absent) and every external module is in `externals`.
  pub async fn build(
    &self,
    entry: &Path,
    config: &BuildConfiguration,
    units: &[FunctionBuildSpec],
    workspace: &Workspace,
    sink: &mut ArtifactSink,
    externals: &mut ExternalDependencySet,
  ) -> Result<(), BuildError> {
    info!(entry = %entry.display(), functions = units.len(), "running build script");

    let ctx = BuildCtx::new(workspace, config, units);
    let ScriptRun { value, ctx } = self.loader.load(entry, ctx).await?;

    let (recorded, recorded_externals) = ctx.into_records();
    for entry in recorded {
      register(entry, config, workspace, sink).await?;
    }
    externals.extend(recorded_externals);

    let output = classify(value)?;
    debug!(output = ?output, "classified build output");

    let compress = config.zip.compress;
    match output {
      BuildOutput::StructuredDescription(description) => {
        let found = self.bundler.bundle(&description, workspace).await?;
        info!(externals = ?found, "description bundled");
        externals.extend(found);

        let derived = probe_derived_outputs(workspace.build_dir())
          .await
          .map_err(|e| BuildError::bundle(Phase::Description, format!("cannot inspect build output: {}", e)))?;
        for (name, path) in derived {
          sink.add_file(path, name, compress);
        }
      }
      BuildOutput::RawContent(bytes) => {
        let entry = ArtifactEntry {
          name: PRIMARY_PAYLOAD.to_string(),
          payload: Payload::Buffer(bytes),
          compress,
        };
        register(entry, config, workspace, sink).await?;
      }
      BuildOutput::Stream(stream) => {
        let entry = ArtifactEntry {
          name: PRIMARY_PAYLOAD.to_string(),
          payload: Payload::Stream(stream),
          compress,
        };
        register(entry, config, workspace, sink).await?;
      }
    }

    Ok(())
  }
}

/// Register an entry, staging it in the build directory first in local mode.
///
/// Staging failures are reported against the build script, which produced
/// the entry.
async fn register(
  entry: ArtifactEntry,
  config: &BuildConfiguration,
  workspace: &Workspace,
  sink: &mut ArtifactSink,
) -> Result<(), BuildError> {
  if !config.local_execution {
    sink.push(entry);
    return Ok(());
  }

  let build_dir = workspace.build_dir().to_path_buf();
  let name = entry.name.clone();
  let staged = tokio::task::spawn_blocking(move || stage_entry(entry, &build_dir))
    .await
    .map_err(io::Error::other)
    .and_then(|staged| staged)
    .map_err(|e| BuildError::bundle(Phase::Script, format!("cannot stage '{}': {}", name, e)))?;
  sink.push(staged);
  Ok(())
}

/// Check the build directory for the primary payload and its debug map.
///
/// Both checks run concurrently and both complete before this returns.
/// Missing files are skipped; any other I/O error is returned.
pub async fn probe_derived_outputs(build_dir: &Path) -> io::Result<Vec<(&'static str, PathBuf)>> {
  let (primary, debug_map) = tokio::join!(
    probe_file(build_dir.join(PRIMARY_PAYLOAD)),
    probe_file(build_dir.join(DEBUG_MAP)),
  );

  let mut found = Vec::with_capacity(2);
  for (name, probed) in [(PRIMARY_PAYLOAD, primary?), (DEBUG_MAP, debug_map?)] {
    match probed {
      Some(path) => found.push((name, path)),
      None => debug!(name, "derived output absent"),
    }
  }
  Ok(found)
}

async fn probe_file(path: PathBuf) -> io::Result<Option<PathBuf>> {
  match fs::metadata(&path).await {
    Ok(meta) if meta.is_file() => Ok(Some(path)),
    Ok(_) => Ok(None),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(e),
  }
}
