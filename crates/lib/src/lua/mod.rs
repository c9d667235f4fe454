//! Lua build script support.
//!
//! # Submodules
//!
//! - [`runtime`] - VM setup and file evaluation
//! - [`ctx`] - the build context and stream userdata exposed to scripts
//! - [`path`] - `fnpack.path` helpers
//! - [`loader`] - [`LuaScriptLoader`], the default script loader

pub mod ctx;
pub mod loader;
pub mod path;
pub mod runtime;

pub use loader::LuaScriptLoader;
