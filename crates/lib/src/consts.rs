pub const APP_NAME: &str = "fnpack";

/// Transient workspace directory, relative to the service root.
pub const TMP_DIR: &str = ".fnpack";
pub const BUILD_DIR: &str = "build";
pub const ARTIFACTS_DIR: &str = "artifacts";

/// Name of the primary payload inside the archive.
pub const PRIMARY_PAYLOAD: &str = "handler.js";
/// Optional debug-map companion of the primary payload.
pub const DEBUG_MAP: &str = "handler.js.map";

pub const ARCHIVE_EXT: &str = "zip";

pub const SERVICE_FILE: &str = "serverless.yml";
pub const BUILD_CONFIG_FILE: &str = "serverless.build.yml";

pub const DEFAULT_BUILD_SCRIPT: &str = "build.lua";
pub const NODE_MODULES: &str = "node_modules";
