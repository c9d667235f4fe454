//! Transient build workspace.
//!
//! Every build writes into two directories below the service root:
//!
//! ```text
//! {service}/.fnpack/
//! ├── build/       # intermediate output, execution root in local mode
//! └── artifacts/   # finished archives
//! ```

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::consts::{ARTIFACTS_DIR, BUILD_DIR, TMP_DIR};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
  service_path: PathBuf,
  build_dir: PathBuf,
  artifact_dir: PathBuf,
}

impl Workspace {
  /// Workspace with the default layout below `service_path`.
  pub fn new(service_path: impl Into<PathBuf>) -> Self {
    let service_path = service_path.into();
    let tmp_dir = service_path.join(TMP_DIR);
    Self {
      build_dir: tmp_dir.join(BUILD_DIR),
      artifact_dir: tmp_dir.join(ARTIFACTS_DIR),
      service_path,
    }
  }

  pub fn service_path(&self) -> &Path {
    &self.service_path
  }

  pub fn build_dir(&self) -> &Path {
    &self.build_dir
  }

  pub fn artifact_dir(&self) -> &Path {
    &self.artifact_dir
  }

  /// Create both directories. Safe to call when they already exist.
  pub async fn ensure(&self) -> io::Result<()> {
    fs::create_dir_all(&self.build_dir).await?;
    fs::create_dir_all(&self.artifact_dir).await?;
    debug!(build_dir = %self.build_dir.display(), artifact_dir = %self.artifact_dir.display(), "workspace ready");
    Ok(())
  }

  pub async fn empty_build_dir(&self) -> io::Result<()> {
    empty_dir(&self.build_dir).await
  }

  pub async fn empty_artifact_dir(&self) -> io::Result<()> {
    empty_dir(&self.artifact_dir).await
  }
}

/// Remove everything inside `dir`, creating it if it does not exist.
pub async fn empty_dir(dir: &Path) -> io::Result<()> {
  fs::create_dir_all(dir).await?;

  let mut entries = fs::read_dir(dir).await?;
  while let Some(entry) = entries.next_entry().await? {
    let path = entry.path();
    if entry.file_type().await?.is_dir() {
      fs::remove_dir_all(&path).await?;
    } else {
      fs::remove_file(&path).await?;
    }
  }

  debug!(dir = %dir.display(), "emptied directory");
  Ok(())
}
