//! Runtime module bundler for `node_modules` layouts.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{ModuleBundler, ModuleRequest, archive_name, on_blocking_pool, output_entry};
use crate::artifact::{ArtifactEntry, ArtifactSink};
use crate::build::{BuildError, Phase};
use crate::consts::NODE_MODULES;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PackageManifest {
  dependencies: BTreeMap<String, String>,
}

/// Packages each included module from `<service>/node_modules/<id>` along with
/// the modules listed in its `package.json` `dependencies`, recursively.
///
/// Every module is packaged at most once. Root modules in `exclude` and
/// transitive modules in `deep_exclude` are skipped. Ids must be `name` or
/// `@scope/name`; anything else fails the phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeModuleBundler;

#[async_trait(?Send)]
impl ModuleBundler for NodeModuleBundler {
  async fn bundle(&self, request: &ModuleRequest<'_>, sink: &mut ArtifactSink) -> Result<(), BuildError> {
    let roots: Vec<String> = request
      .include
      .iter()
      .filter(|id| !request.exclude.iter().any(|e| e == id))
      .map(str::to_string)
      .collect();

    if roots.is_empty() {
      debug!("no modules to bundle");
      return Ok(());
    }
    info!(modules = ?roots, "bundling modules");

    let walk = ModuleWalk {
      service_root: request.workspace.service_path().to_path_buf(),
      modules_dir: request.workspace.service_path().join(NODE_MODULES),
      deep_exclude: request.deep_exclude.to_vec(),
      compress: request.compress,
      stage_into: request
        .local_execution
        .then(|| request.workspace.build_dir().to_path_buf()),
    };
    let entries = on_blocking_pool(Phase::Modules, move || walk.collect(roots)).await?;

    for entry in entries {
      sink.push(entry);
    }
    Ok(())
  }
}

/// Owned inputs of one dependency walk, moved onto the blocking pool.
struct ModuleWalk {
  service_root: PathBuf,
  modules_dir: PathBuf,
  deep_exclude: Vec<String>,
  compress: bool,
  stage_into: Option<PathBuf>,
}

impl ModuleWalk {
  fn collect(self, roots: Vec<String>) -> Result<Vec<ArtifactEntry>, BuildError> {
    let mut pending = roots;
    pending.reverse();

    let mut entries = Vec::new();
    let mut visited = BTreeSet::new();
    while let Some(id) = pending.pop() {
      if !visited.insert(id.clone()) {
        continue;
      }

      check_module_id(&id)?;
      let module_dir = self.modules_dir.join(&id);
      if !module_dir.is_dir() {
        return Err(BuildError::bundle(
          Phase::Modules,
          format!("module '{}' not found in {}", id, self.modules_dir.display()),
        ));
      }

      self.package(&module_dir, &mut entries)?;

      let mut deps: Vec<String> = read_dependencies(&module_dir)
        .map_err(|e| BuildError::bundle(Phase::Modules, format!("module '{}': {}", id, e)))?
        .into_iter()
        .filter(|dep| {
          let skip = self.deep_exclude.iter().any(|e| e == dep);
          if skip {
            debug!(module = %id, dependency = %dep, "dependency excluded");
          }
          !skip && !visited.contains(dep)
        })
        .collect();
      deps.reverse();
      pending.extend(deps);
    }

    debug!(modules = visited.len(), files = entries.len(), "modules bundled");
    Ok(entries)
  }

  /// Add every file below `module_dir` as `node_modules/<id>/...`.
  fn package(&self, module_dir: &Path, entries: &mut Vec<ArtifactEntry>) -> Result<(), BuildError> {
    for entry in WalkDir::new(module_dir).sort_by_file_name() {
      let entry = entry.map_err(|e| BuildError::bundle(Phase::Modules, e))?;
      if !entry.file_type().is_file() {
        continue;
      }

      let Ok(relative) = entry.path().strip_prefix(&self.service_root) else {
        warn!(path = %entry.path().display(), "module file outside service directory");
        continue;
      };
      let output = output_entry(entry.path(), archive_name(relative), self.compress, self.stage_into.as_deref())
        .map_err(|e| BuildError::bundle(Phase::Modules, e))?;
      entries.push(output);
    }
    Ok(())
  }
}

/// Accept `name` and `@scope/name`, where no segment is empty, `.` or `..`.
fn check_module_id(id: &str) -> Result<(), BuildError> {
  let segments: Vec<&str> = id.split('/').collect();
  let shape_ok = match segments.as_slice() {
    [name] => !name.starts_with('@'),
    [scope, _] => scope.len() > 1 && scope.starts_with('@'),
    _ => false,
  };
  let segments_ok = segments
    .iter()
    .all(|s| !s.is_empty() && *s != "." && *s != ".." && !s.contains(['\\', ':']));

  if shape_ok && segments_ok {
    Ok(())
  } else {
    Err(BuildError::bundle(
      Phase::Modules,
      format!("invalid module id '{}': expected 'name' or '@scope/name'", id),
    ))
  }
}

/// Names from the module's `package.json` `dependencies`, empty when the
/// module has no manifest.
fn read_dependencies(module_dir: &Path) -> io::Result<Vec<String>> {
  let manifest = module_dir.join("package.json");
  let content = match fs::read_to_string(&manifest) {
    Ok(c) => c,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(e) => return Err(e),
  };

  let parsed: PackageManifest = serde_json::from_str(&content)
    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{}: {}", manifest.display(), e)))?;
  Ok(parsed.dependencies.into_keys().collect())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::externals::ExternalDependencySet;
  use crate::workspace::Workspace;
  use tempfile::TempDir;

  fn module(root: &Path, id: &str, deps: &[&str]) {
    let dir = root.join(NODE_MODULES).join(id);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("index.js"), format!("// {}", id)).unwrap();
    let deps: BTreeMap<&str, &str> = deps.iter().map(|d| (*d, "*")).collect();
    let manifest = serde_json::json!({ "name": id, "dependencies": deps });
    fs::write(dir.join("package.json"), manifest.to_string()).unwrap();
  }

  async fn run(
    temp: &TempDir,
    include: &[&str],
    exclude: &[&str],
    deep_exclude: &[&str],
  ) -> Result<ArtifactSink, BuildError> {
    let workspace = Workspace::new(temp.path());
    let include: ExternalDependencySet = include.iter().copied().collect();
    let exclude: Vec<String> = exclude.iter().map(|s| s.to_string()).collect();
    let deep_exclude: Vec<String> = deep_exclude.iter().map(|s| s.to_string()).collect();
    let request = ModuleRequest {
      include: &include,
      exclude: &exclude,
      deep_exclude: &deep_exclude,
      workspace: &workspace,
      compress: true,
      local_execution: false,
    };
    let mut sink = ArtifactSink::new();
    NodeModuleBundler.bundle(&request, &mut sink).await?;
    Ok(sink)
  }

  #[tokio::test]
  async fn packages_transitive_dependencies_once() {
    let temp = TempDir::new().unwrap();
    module(temp.path(), "a", &["b", "c"]);
    module(temp.path(), "b", &["c"]);
    module(temp.path(), "c", &[]);

    let sink = run(&temp, &["a", "b"], &[], &[]).await.unwrap();
    let names = sink.names();
    assert_eq!(sink.len(), 6);
    assert!(names.contains(&"node_modules/c/index.js"));
    assert_eq!(names.iter().filter(|n| **n == "node_modules/c/index.js").count(), 1);
  }

  #[tokio::test]
  async fn exclusions_apply_at_their_level() {
    let temp = TempDir::new().unwrap();
    module(temp.path(), "app-lib", &["aws-sdk"]);
    module(temp.path(), "aws-sdk", &[]);
    module(temp.path(), "uuid", &[]);

    let sink = run(&temp, &["app-lib", "uuid"], &["uuid"], &["aws-sdk"]).await.unwrap();
    assert_eq!(
      sink.names(),
      vec!["node_modules/app-lib/index.js", "node_modules/app-lib/package.json"]
    );
  }

  #[tokio::test]
  async fn scoped_modules_keep_their_scope() {
    let temp = TempDir::new().unwrap();
    module(temp.path(), "@acme/log", &[]);

    let sink = run(&temp, &["@acme/log"], &[], &[]).await.unwrap();
    assert!(sink.get("node_modules/@acme/log/index.js").is_some());
  }

  #[tokio::test]
  async fn empty_include_packages_nothing() {
    let temp = TempDir::new().unwrap();
    module(temp.path(), "uuid", &[]);
    assert!(run(&temp, &[], &[], &[]).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn missing_module_is_a_module_error() {
    let temp = TempDir::new().unwrap();
    let err = run(&temp, &["ghost"], &[], &[]).await.unwrap_err();
    assert_eq!(err.phase(), Phase::Modules);
    assert!(err.to_string().contains("ghost"));
  }

  #[tokio::test]
  async fn ids_leaving_node_modules_are_rejected() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("secret.txt"), "service file").unwrap();
    module(temp.path(), "uuid", &[]);

    for id in ["..", "../secret", "/etc", "@acme/../..", "a/b", "@acme", "./uuid"] {
      let err = run(&temp, &[id], &[], &[]).await.unwrap_err();
      assert_eq!(err.phase(), Phase::Modules, "{id}");
      assert!(err.to_string().contains("invalid module id"), "{id}");
    }
  }

  #[tokio::test]
  async fn manifest_dependencies_are_checked_too() {
    let temp = TempDir::new().unwrap();
    module(temp.path(), "app-lib", &["../.."]);

    let err = run(&temp, &["app-lib"], &[], &[]).await.unwrap_err();
    assert!(err.to_string().contains("invalid module id '../..'"));
  }

  #[tokio::test]
  async fn local_mode_stages_module_files() {
    let temp = TempDir::new().unwrap();
    module(temp.path(), "uuid", &[]);
    let workspace = Workspace::new(temp.path());
    let include: ExternalDependencySet = ["uuid"].into_iter().collect();
    let request = ModuleRequest {
      include: &include,
      exclude: &[],
      deep_exclude: &[],
      workspace: &workspace,
      compress: true,
      local_execution: true,
    };

    let mut sink = ArtifactSink::new();
    NodeModuleBundler.bundle(&request, &mut sink).await.unwrap();

    let staged = workspace.build_dir().join("node_modules/uuid/index.js");
    assert_eq!(fs::read_to_string(&staged).unwrap(), "// uuid");
    assert_eq!(sink.len(), 2);
  }
}
