//! fnpack-lib: packaging of serverless functions into deployable archives.
//!
//! A build run ([`build::BuildOrchestrator`]) picks a strategy from the
//! project configuration, collects archive entries and external modules, then
//! writes a zip archive or hands the build directory over for local execution.
//!
//! - [`config`] - project loading and layered configuration
//! - [`build`] - orchestration, the build script strategy and completion
//! - [`bundle`] - source, module and description bundlers
//! - [`artifact`] - archive entries and zip writing
//! - [`lua`] - Lua build scripts

pub mod artifact;
pub mod build;
pub mod bundle;
pub mod config;
pub mod consts;
pub mod externals;
pub mod lua;
pub mod workspace;
