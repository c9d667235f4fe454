//! Source tree bundler.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use glob::{MatchOptions, Pattern};
use tracing::{debug, info, trace};
use walkdir::{DirEntry, WalkDir};

use super::{SourceBundler, SourceRequest, archive_name, on_blocking_pool, output_entry};
use crate::artifact::{ArtifactEntry, ArtifactSink};
use crate::build::{BuildError, Phase};
use crate::consts::TMP_DIR;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
  case_sensitive: true,
  require_literal_separator: false,
  require_literal_leading_dot: false,
};

/// Walks the service directory and packages every file selected by the unit's
/// include and exclude globs.
///
/// A file is selected when it matches at least one include glob (or the unit
/// has none) and no exclude glob. Exclude globs also match single path
/// components, so `node_modules` prunes that directory at any depth.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeBundler;

#[async_trait(?Send)]
impl SourceBundler for TreeBundler {
  async fn bundle(&self, request: &SourceRequest<'_>, sink: &mut ArtifactSink) -> Result<(), BuildError> {
    let unit = request.unit;
    let include = compile(&unit.include)?;
    let exclude = compile(&unit.exclude)?;

    info!(function = %unit.name, include = unit.include.len(), exclude = unit.exclude.len(), "bundling sources");

    let walk = SourceWalk {
      root: request.workspace.service_path().to_path_buf(),
      include,
      exclude,
      compress: request.compress,
      stage_into: request
        .local_execution
        .then(|| request.workspace.build_dir().to_path_buf()),
    };
    let entries = on_blocking_pool(Phase::Source, move || walk.collect()).await?;

    debug!(function = %unit.name, files = entries.len(), "sources bundled");
    for entry in entries {
      sink.push(entry);
    }
    Ok(())
  }
}

/// Owned inputs of one source walk, moved onto the blocking pool.
struct SourceWalk {
  root: PathBuf,
  include: Vec<Pattern>,
  exclude: Vec<Pattern>,
  compress: bool,
  stage_into: Option<PathBuf>,
}

impl SourceWalk {
  fn collect(self) -> Result<Vec<ArtifactEntry>, BuildError> {
    let root = self.root.as_path();
    let walker = WalkDir::new(root)
      .sort_by_file_name()
      .into_iter()
      .filter_entry(|e| keep_entry(e, root, &self.exclude));

    let mut entries = Vec::new();
    for entry in walker {
      let entry = entry.map_err(|e| BuildError::bundle(Phase::Source, e))?;
      if !entry.file_type().is_file() {
        continue;
      }

      let Ok(relative) = entry.path().strip_prefix(root) else {
        continue;
      };
      let name = archive_name(relative);
      if !self.include.is_empty() && !self.include.iter().any(|p| p.matches_with(&name, MATCH_OPTIONS)) {
        trace!(file = %name, "not included");
        continue;
      }

      let output = output_entry(entry.path(), name, self.compress, self.stage_into.as_deref())
        .map_err(|e| BuildError::bundle(Phase::Source, e))?;
      entries.push(output);
    }
    Ok(entries)
  }
}

fn compile(globs: &[String]) -> Result<Vec<Pattern>, BuildError> {
  globs
    .iter()
    .map(|g| Pattern::new(g).map_err(|e| BuildError::bundle(Phase::Source, format!("invalid glob '{}': {}", g, e))))
    .collect()
}

/// Whether the walker should descend into or yield `entry`.
fn keep_entry(entry: &DirEntry, root: &Path, exclude: &[Pattern]) -> bool {
  let Ok(relative) = entry.path().strip_prefix(root) else {
    return true;
  };
  if relative.as_os_str().is_empty() {
    return true;
  }
  if relative.starts_with(TMP_DIR) {
    return false;
  }

  let name = archive_name(relative);
  let file_name = entry.file_name().to_string_lossy();
  !exclude
    .iter()
    .any(|p| p.matches_with(&name, MATCH_OPTIONS) || p.matches_with(&file_name, MATCH_OPTIONS))
}
