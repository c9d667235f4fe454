//! Build completion: persist the archive or hand over the build directory.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};
use zip::result::{ZipError, ZipResult};

use super::types::{BuildError, BuildResult};
use crate::artifact::ArtifactSink;
use crate::config::BuildConfiguration;
use crate::consts::ARCHIVE_EXT;
use crate::workspace::Workspace;

/// Finish a build run.
///
/// In local execution mode nothing is written or removed; the build directory
/// becomes the execution root. Otherwise the archive is written to
/// `<artifact_dir>/<service>-<epoch-millis>.zip`. Unless `keep` is set, the
/// artifact directory is emptied before the write and the build directory is
/// emptied after it succeeded. A failed write leaves the build directory as is.
pub async fn complete(
  sink: ArtifactSink,
  workspace: &Workspace,
  service: &str,
  config: &BuildConfiguration,
) -> Result<BuildResult, BuildError> {
  if config.local_execution {
    let execution_root = workspace.build_dir().to_path_buf();
    info!(execution_root = %execution_root.display(), "local execution, skipping archive");
    return Ok(BuildResult::Local { execution_root });
  }

  if !config.keep {
    workspace.empty_artifact_dir().await?;
  }

  let path = archive_path(workspace.artifact_dir(), service, epoch_millis());
  info!(path = %path.display(), entries = sink.len(), "writing archive");

  write_archive(sink, path.clone()).await?;

  if !config.keep {
    workspace.empty_build_dir().await?;
  }

  Ok(BuildResult::Archive { path })
}

/// `<dir>/<service>-<millis>.zip`
pub fn archive_path(dir: &Path, service: &str, millis: u128) -> PathBuf {
  dir.join(format!("{}-{}.{}", service, millis, ARCHIVE_EXT))
}

fn epoch_millis() -> u128 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_millis())
    .unwrap_or_default()
}

/// Stream the sink into `<path>.part` on a blocking thread and move it to
/// `path` once complete. A failed write removes the partial file.
async fn write_archive(sink: ArtifactSink, path: PathBuf) -> Result<(), BuildError> {
  let target = path.clone();
  let written = tokio::task::spawn_blocking(move || {
    let partial = partial_path(&target);
    let result = write_partial(sink, &partial).and_then(|()| Ok(fs::rename(&partial, &target)?));
    if result.is_err() {
      if let Err(e) = fs::remove_file(&partial) {
        if e.kind() != io::ErrorKind::NotFound {
          warn!(path = %partial.display(), error = %e, "could not remove partial archive");
        }
      }
    }
    result
  })
  .await
  .map_err(|e| ZipError::Io(io::Error::other(e)))
  .and_then(|result| result);

  match written {
    Ok(()) => {
      debug!(path = %path.display(), "archive written");
      Ok(())
    }
    Err(source) => Err(BuildError::ArchiveWrite { path, source }),
  }
}

fn write_partial(sink: ArtifactSink, partial: &Path) -> ZipResult<()> {
  let file = File::create(partial)?;
  let file = sink.finalize_into(file)?;
  file.sync_all()?;
  Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
  let mut name = path.as_os_str().to_owned();
  name.push(".part");
  PathBuf::from(name)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Read;
  use tempfile::TempDir;
  use zip::ZipArchive;

  async fn workspace_with_build_output() -> (TempDir, Workspace) {
    let temp = TempDir::new().unwrap();
    let workspace = Workspace::new(temp.path());
    workspace.ensure().await.unwrap();
    std::fs::write(workspace.build_dir().join("handler.js"), "built").unwrap();
    std::fs::write(workspace.artifact_dir().join("old-1.zip"), "stale").unwrap();
    (temp, workspace)
  }

  fn sink_for(workspace: &Workspace) -> ArtifactSink {
    let mut sink = ArtifactSink::new();
    sink.add_file(workspace.build_dir().join("handler.js"), "handler.js", true);
    sink
  }

  fn dir_entries(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
      .unwrap()
      .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
      .collect()
  }

  #[test]
  fn archive_path_pattern() {
    let path = archive_path(Path::new("/tmp/artifacts"), "shop", 1_700_000_000_000);
    assert_eq!(path, PathBuf::from("/tmp/artifacts/shop-1700000000000.zip"));
  }

  #[tokio::test]
  async fn persisted_mode_writes_archive_and_cleans_up() {
    let (_temp, workspace) = workspace_with_build_output().await;
    let sink = sink_for(&workspace);

    let result = complete(sink, &workspace, "shop", &BuildConfiguration::default())
      .await
      .unwrap();

    let path = result.archive_path().unwrap().clone();
    let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(file_name.starts_with("shop-") && file_name.ends_with(".zip"));
    assert_eq!(dir_entries(workspace.artifact_dir()), vec![file_name]);
    assert!(dir_entries(workspace.build_dir()).is_empty());

    let mut archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();
    let mut content = String::new();
    archive.by_name("handler.js").unwrap().read_to_string(&mut content).unwrap();
    assert_eq!(content, "built");
  }

  #[tokio::test]
  async fn keep_retains_directories() {
    let (_temp, workspace) = workspace_with_build_output().await;
    let config = BuildConfiguration {
      keep: true,
      ..Default::default()
    };

    complete(sink_for(&workspace), &workspace, "shop", &config).await.unwrap();

    assert!(workspace.build_dir().join("handler.js").exists());
    assert!(workspace.artifact_dir().join("old-1.zip").exists());
    assert_eq!(dir_entries(workspace.artifact_dir()).len(), 2);
  }

  #[tokio::test]
  async fn local_mode_leaves_workspace_untouched() {
    let (_temp, workspace) = workspace_with_build_output().await;
    let config = BuildConfiguration {
      local_execution: true,
      ..Default::default()
    };

    let result = complete(sink_for(&workspace), &workspace, "shop", &config).await.unwrap();

    assert_eq!(
      result,
      BuildResult::Local {
        execution_root: workspace.build_dir().to_path_buf()
      }
    );
    assert!(result.archive_path().is_none());
    assert_eq!(dir_entries(workspace.build_dir()), vec!["handler.js"]);
    assert_eq!(dir_entries(workspace.artifact_dir()), vec!["old-1.zip"]);
  }

  #[tokio::test]
  async fn failed_write_keeps_build_dir() {
    let (_temp, workspace) = workspace_with_build_output().await;
    let mut sink = sink_for(&workspace);
    sink.add_file(workspace.build_dir().join("missing.js"), "missing.js", true);

    let err = complete(sink, &workspace, "shop", &BuildConfiguration::default())
      .await
      .unwrap_err();

    assert!(matches!(err, BuildError::ArchiveWrite { .. }));
    assert_eq!(dir_entries(workspace.build_dir()), vec!["handler.js"]);
    assert!(dir_entries(workspace.artifact_dir()).is_empty());
  }

  #[tokio::test]
  async fn failed_write_error_names_the_unreadable_entry() {
    let (_temp, workspace) = workspace_with_build_output().await;
    let mut sink = sink_for(&workspace);
    sink.add_file(workspace.build_dir().join("missing.js"), "missing.js", true);

    let err = complete(sink, &workspace, "shop", &BuildConfiguration::default())
      .await
      .unwrap_err();

    let mut causes = Vec::new();
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
      causes.push(cause.to_string());
      source = cause.source();
    }
    assert!(causes.iter().any(|c| c.contains("cannot open") && c.contains("missing.js")));
  }

  #[tokio::test]
  async fn failed_write_with_keep_leaves_only_old_archives() {
    let (_temp, workspace) = workspace_with_build_output().await;
    let mut sink = sink_for(&workspace);
    sink.add_file(workspace.build_dir().join("missing.js"), "missing.js", true);
    let config = BuildConfiguration {
      keep: true,
      ..Default::default()
    };

    let err = complete(sink, &workspace, "shop", &config).await.unwrap_err();

    assert!(matches!(err, BuildError::ArchiveWrite { .. }));
    assert_eq!(dir_entries(workspace.artifact_dir()), vec!["old-1.zip"]);
  }

  #[test]
  fn partial_path_appends_suffix() {
    assert_eq!(
      partial_path(Path::new("/tmp/artifacts/shop-1.zip")),
      PathBuf::from("/tmp/artifacts/shop-1.zip.part")
    );
  }
}
