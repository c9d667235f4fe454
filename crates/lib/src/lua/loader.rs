//! Lua implementation of [`ScriptLoader`].

use std::path::Path;

use async_trait::async_trait;
use mlua::prelude::*;
use serde_json::Value;
use tracing::debug;

use super::ctx::BuildStream;
use super::runtime::{create_runtime, load_file_with_dir};
use crate::build::{BuildCtx, BuildError, ScriptLoader, ScriptRun, ScriptValue};

/// Evaluates build scripts in a fresh Lua state per run.
#[derive(Debug, Clone, Copy, Default)]
pub struct LuaScriptLoader;

impl LuaScriptLoader {
  pub fn new() -> Self {
    Self
  }
}

#[async_trait(?Send)]
impl ScriptLoader for LuaScriptLoader {
  async fn load(&self, entry: &Path, ctx: BuildCtx) -> Result<ScriptRun, BuildError> {
    let lua = create_runtime()?;
    let value = load_file_with_dir(&lua, entry).await?;
    let ctx_userdata = lua.create_userdata(ctx)?;

    let value = match value {
      LuaValue::Function(factory) => {
        debug!(entry = %entry.display(), "build script returned a factory");
        factory.call_async::<LuaValue>(&ctx_userdata).await?
      }
      other => other,
    };

    let value = to_script_value(&lua, value)?;
    let ctx = ctx_userdata.take::<BuildCtx>()?;
    Ok(ScriptRun { value, ctx })
  }
}

/// Convert a script result into a [`ScriptValue`] without interpreting it.
fn to_script_value(lua: &Lua, value: LuaValue) -> LuaResult<ScriptValue> {
  match value {
    LuaValue::Table(_) => {
      let options = LuaDeserializeOptions::new().deny_unsupported_types(false);
      match lua.from_value_with::<Value>(value, options)? {
        Value::Object(map) => Ok(ScriptValue::Map(map)),
        Value::Array(items) => Ok(ScriptValue::List(items)),
        other => Ok(ScriptValue::Other(format!("table ({})", other))),
      }
    }
    LuaValue::String(s) => {
      let bytes = s.as_bytes().to_vec();
      Ok(match String::from_utf8(bytes) {
        Ok(text) => ScriptValue::Text(text),
        Err(e) => ScriptValue::Bytes(e.into_bytes()),
      })
    }
    LuaValue::UserData(ud) if ud.is::<BuildStream>() => {
      let stream = ud.take::<BuildStream>()?;
      Ok(ScriptValue::Stream(stream.into_reader()))
    }
    other => Ok(ScriptValue::Other(other.type_name().to_string())),
  }
}
