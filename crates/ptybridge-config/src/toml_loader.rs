//! TOML config file loading and creation.

use crate::schema::BridgeConfig;
use ptybridge_common::ConfigError;
use std::path::{Path, PathBuf};
use tracing::info;

/// Load config from a specific TOML file path.
///
/// Missing fields take serde defaults. Validation is left to the caller.
pub fn load_from_path(path: &Path) -> Result<BridgeConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::ParseError(format!("failed to read {}: {e}", path.display()))
    })?;

    let config: BridgeConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;

    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Load config from the platform-specific default path.
///
/// On Linux: `~/.config/ptybridge/config.toml`
/// On macOS: `~/Library/Application Support/ptybridge/config.toml`
///
/// If the file does not exist, creates a default config file and returns defaults.
pub fn load_default() -> Result<BridgeConfig, ConfigError> {
    let path = default_config_path()?;

    if !path.exists() {
        info!("no config found at {}, creating default", path.display());
        create_default_config(&path)?;
        return Ok(BridgeConfig::default());
    }

    load_from_path(&path)
}

/// Get the platform-specific default config file path.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir().ok_or_else(|| {
        ConfigError::ParseError("could not determine config directory".into())
    })?;
    Ok(config_dir.join("ptybridge").join("config.toml"))
}

/// Create a default TOML config file with documentation comments.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ConfigError::ParseError(format!(
                "failed to create config directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    std::fs::write(path, default_config_toml()).map_err(|e| {
        ConfigError::ParseError(format!(
            "failed to write default config to {}: {e}",
            path.display()
        ))
    })?;

    info!("created default config at {}", path.display());
    Ok(())
}

/// Generate the default TOML config content with comments.
fn default_config_toml() -> &'static str {
    r##"# ptybridge configuration
# Only override what you want to change -- missing fields use defaults.

[server]
# host = "0.0.0.0"
# port = 8081
# path = "/ws/terminal"
# handshake_timeout_secs = 10   # 1-300
# shutdown_grace_secs = 3       # 1-300
# file_api = true               # serve /api/file/content and /api/file/save

[shell]
# program = ""                  # empty: $SHELL, then /bin/sh
# args = []
# login_shell = false
# term = "xterm-256color"
# working_directory = "/srv"

[shell.env]
# EDITOR = "vim"

[terminal]
# rows = 24                     # 1-1000, until the client sends a resize
# cols = 80                     # 1-1000
# read_chunk_size = 4096        # 512-1048576

[logging]
# level = "info"                # trace, debug, info, warn, error
"##
}
