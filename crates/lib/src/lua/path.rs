//! `fnpack.path`: path helpers for build scripts.

use std::path::{Component, Path, PathBuf};

use mlua::prelude::*;

/// Lexically resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        out.pop();
      }
      other => out.push(other),
    }
  }
  out
}

fn lossy(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

pub fn create_path_table(lua: &Lua) -> LuaResult<LuaTable> {
  let path = lua.create_table()?;

  path.set(
    "join",
    lua.create_function(|_, segments: LuaVariadic<String>| {
      let joined: PathBuf = segments.iter().collect();
      Ok(lossy(&joined))
    })?,
  )?;

  path.set(
    "dirname",
    lua.create_function(|_, p: String| Ok(Path::new(&p).parent().map(lossy).unwrap_or_default()))?,
  )?;

  path.set(
    "basename",
    lua.create_function(|_, p: String| {
      Ok(
        Path::new(&p)
          .file_name()
          .map(|n| n.to_string_lossy().into_owned())
          .unwrap_or_default(),
      )
    })?,
  )?;

  path.set(
    "extname",
    lua.create_function(|_, p: String| {
      Ok(
        Path::new(&p)
          .extension()
          .map(|e| format!(".{}", e.to_string_lossy()))
          .unwrap_or_default(),
      )
    })?,
  )?;

  path.set(
    "normalize",
    lua.create_function(|_, p: String| Ok(lossy(&normalize(Path::new(&p)))))?,
  )?;

  path.set(
    "is_absolute",
    lua.create_function(|_, p: String| Ok(Path::new(&p).is_absolute()))?,
  )?;

  Ok(path)
}
