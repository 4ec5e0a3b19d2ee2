//! Environment constants and path utilities.
//!
//! Centralizes directory and file names used for configuration discovery and
//! resource export.

use std::path::{Path, PathBuf};

/// Application directory name (hidden directory like .git)
pub const FORGE_DIR_NAME: &str = ".agent-forge";

/// Configuration file name inside [`FORGE_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Stand-alone configuration file name checked in the working directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "agent-forge.toml";

/// System-wide configuration directory
#[cfg(unix)]
pub const SYSTEM_CONFIG_DIR: &str = "/etc/agent-forge";

/// Tracing filter used when neither `RUST_LOG` nor the config provides one
pub const DEFAULT_LOG_FILTER: &str = "agent_forge=info";

/// Export-related names
pub mod export {
    /// Directory under [`super::FORGE_DIR_NAME`] that receives exported resources
    pub const EXPORTS_DIR_NAME: &str = "exports";

    /// Extension for command and api wrappers
    pub const SCRIPT_EXTENSION: &str = "sh";

    /// Extension for function and class-like sources
    pub const SOURCE_EXTENSION: &str = "rs";
}

/// Test-related constants
pub mod test {
    /// Default test directory path for temporary operations
    pub const DEFAULT_TEST_DIR: &str = "/tmp";
}

/// Build the .agent-forge directory path from a workspace root
pub fn forge_dir_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(FORGE_DIR_NAME)
}

/// Build the default export directory path from a workspace root
pub fn exports_dir_path(workspace_root: &Path) -> PathBuf {
    forge_dir_path(workspace_root).join(export::EXPORTS_DIR_NAME)
}

/// Build the export file path for a resource inside `dir`
pub fn exported_resource_path(dir: &Path, resource_name: &str, script: bool) -> PathBuf {
    let extension = if script {
        export::SCRIPT_EXTENSION
    } else {
        export::SOURCE_EXTENSION
    };
    dir.join(format!("{}.{}", resource_name, extension))
}

/// Build config directory path in user's home directory
pub fn user_config_dir_path(home_dir: &Path) -> PathBuf {
    home_dir.join(FORGE_DIR_NAME)
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    user_config_dir_path(home_dir).join(CONFIG_FILE_NAME)
}

/// Build local config file path in current directory
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    forge_dir_path(current_dir).join(CONFIG_FILE_NAME)
}

/// Build the stand-alone config file path in current directory
pub fn local_standalone_config_path(current_dir: &Path) -> PathBuf {
    current_dir.join(LOCAL_CONFIG_FILE_NAME)
}
