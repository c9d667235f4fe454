//! Lua VM setup and script evaluation.

use std::path::Path;

use mlua::prelude::*;

use super::path::create_path_table;
use crate::consts::APP_NAME;

/// Create a Lua state with the `fnpack` global installed.
///
/// ```lua
/// fnpack.version            -- library version
/// fnpack.path.join(a, b)    -- see `fnpack.path`
/// ```
pub fn create_runtime() -> LuaResult<Lua> {
  let lua = Lua::new();

  let fnpack = lua.create_table()?;
  fnpack.set("version", env!("CARGO_PKG_VERSION"))?;
  fnpack.set("path", create_path_table(&lua)?)?;
  lua.globals().set(APP_NAME, fnpack)?;

  Ok(lua)
}

/// Evaluate the file at `path` and return its value.
///
/// The chunk runs in its own environment inheriting from `_G`, with `__dir`
/// set to the directory containing the file.
pub async fn load_file_with_dir(lua: &Lua, path: &Path) -> LuaResult<LuaValue> {
  let canonical = tokio::fs::canonicalize(path)
    .await
    .map_err(|e| LuaError::external(format!("cannot resolve '{}': {}", path.display(), e)))?;
  let canonical = dunce::simplified(&canonical);
  let content = tokio::fs::read_to_string(canonical)
    .await
    .map_err(|e| LuaError::external(format!("cannot read '{}': {}", canonical.display(), e)))?;

  let dir = canonical
    .parent()
    .unwrap_or(Path::new("."))
    .to_string_lossy()
    .into_owned();

  let env = lua.create_table()?;
  env.set("__dir", dir)?;
  let mt = lua.create_table()?;
  mt.set("__index", lua.globals())?;
  mt.set("__newindex", lua.globals())?;
  env.set_metatable(Some(mt))?;

  lua
    .load(&content)
    .set_name(format!("@{}", canonical.display()))
    .set_environment(env)
    .eval_async::<LuaValue>()
    .await
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::TempDir;

  #[test]
  fn exposes_fnpack_global() -> LuaResult<()> {
    let lua = create_runtime()?;
    let joined: String = lua.load("return fnpack.path.join('a', 'b')").eval()?;
    assert_eq!(joined, "a/b");
    let version: String = lua.load("return fnpack.version").eval()?;
    assert!(!version.is_empty());
    Ok(())
  }

  #[tokio::test]
  async fn injects_script_dir() -> LuaResult<()> {
    let temp = TempDir::new().unwrap();
    let script = temp.path().join("build.lua");
    fs::write(&script, "return __dir").unwrap();

    let lua = create_runtime()?;
    let dir: String = lua.unpack(load_file_with_dir(&lua, &script).await?)?;
    assert_eq!(dir, dunce::canonicalize(temp.path()).unwrap().to_string_lossy());
    Ok(())
  }

  #[tokio::test]
  async fn missing_file_is_an_error() {
    let lua = create_runtime().unwrap();
    let err = load_file_with_dir(&lua, Path::new("/nonexistent/build.lua")).await.unwrap_err();
    assert!(err.to_string().contains("cannot resolve"));
  }

  #[tokio::test]
  async fn syntax_errors_name_the_file() {
    let temp = TempDir::new().unwrap();
    let script = temp.path().join("build.lua");
    fs::write(&script, "return {").unwrap();

    let lua = create_runtime().unwrap();
    let err = load_file_with_dir(&lua, &script).await.unwrap_err();
    assert!(err.to_string().contains("build.lua"));
  }
}
