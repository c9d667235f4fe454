//! Lua bindings for [`BuildCtx`].
//!
//! A build script returning a function receives the context as its argument:
//!
//! ```lua
//! return function(ctx)
//!   ctx:exec("npx esbuild src/handler.js --bundle --outfile=" .. ctx.build_dir .. "/handler.js")
//!   ctx:add_external("uuid")
//!   ctx:add_file("static/config.json")
//!   return ctx:open(ctx.build_dir .. "/handler.js")
//! end
//! ```

use std::io::Read;
use std::path::PathBuf;

use mlua::prelude::*;
use tracing::debug;

use crate::build::BuildCtx;
use crate::bundle::command::run_shell;

/// A readable file handed out by `ctx:open(path)`.
///
/// Returned from a script, it becomes the primary payload; passed to
/// `ctx:add_stream(stream, name)` it becomes an entry of its own.
pub struct BuildStream {
  path: PathBuf,
  reader: Box<dyn Read + Send>,
}

impl BuildStream {
  pub async fn open(path: PathBuf) -> std::io::Result<Self> {
    let file = tokio::fs::File::open(&path).await?.into_std().await;
    Ok(Self {
      path,
      reader: Box::new(file),
    })
  }

  pub fn into_reader(self) -> Box<dyn Read + Send> {
    self.reader
  }
}

impl LuaUserData for BuildStream {
  fn add_fields<F: LuaUserDataFields<Self>>(fields: &mut F) {
    fields.add_field_method_get("path", |_, this| Ok(this.path.to_string_lossy().into_owned()));
  }
}

impl LuaUserData for BuildCtx {
  fn add_fields<F: LuaUserDataFields<Self>>(fields: &mut F) {
    fields.add_field_method_get("build_dir", |_, this| {
      Ok(this.build_dir().to_string_lossy().into_owned())
    });
    fields.add_field_method_get("service_path", |_, this| {
      Ok(this.service_path().to_string_lossy().into_owned())
    });
    fields.add_field_method_get("functions", |lua, this| {
      lua.create_sequence_from(this.functions().iter().cloned())
    });
    fields.add_field_method_get("local_execution", |_, this| Ok(this.local_execution()));
  }

  fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
    methods.add_method_mut("add_external", |_, this, id: String| {
      this.add_external(id);
      Ok(())
    });

    methods.add_method_mut("add_file", |_, this, (path, name): (String, Option<String>)| {
      let resolved = this.resolve(&path);
      this
        .add_file(resolved, name)
        .map_err(|e| LuaError::external(format!("add_file: {}", e)))
    });

    methods.add_method_mut("add_buffer", |_, this, (content, name): (LuaString, String)| {
      this
        .add_buffer(content.as_bytes().to_vec(), name)
        .map_err(|e| LuaError::external(format!("add_buffer: {}", e)))
    });

    methods.add_method_mut("add_stream", |_, this, (stream, name): (LuaAnyUserData, String)| {
      let stream = stream.take::<BuildStream>()?;
      this
        .add_stream(stream.into_reader(), name)
        .map_err(|e| LuaError::external(format!("add_stream: {}", e)))
    });

    methods.add_async_method("open", |_, this, path: String| {
      let resolved = this.resolve(&path);
      drop(this);
      async move {
        BuildStream::open(resolved.clone())
          .await
          .map_err(|e| LuaError::external(format!("cannot open '{}': {}", resolved.display(), e)))
      }
    });

    methods.add_async_method("exec", |_, this, cmd: String| {
      let cwd = this.service_path().to_path_buf();
      let out = this.build_dir().to_path_buf();
      drop(this);
      async move {
        debug!(cmd = %cmd, "exec from build script");
        run_shell(&cmd, &cwd, &out, None).await.map_err(LuaError::external)
      }
    });
  }
}
