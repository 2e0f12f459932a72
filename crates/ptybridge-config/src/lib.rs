//! ptybridge configuration.
//!
//! TOML-based configuration with full validation. Every section uses serde
//! defaults so partial files work out of the box.

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{BridgeConfig, LogLevel, LoggingConfig, ServerConfig, ShellConfig, TerminalConfig};

use std::path::Path;

use ptybridge_common::ConfigError;

/// Load the configuration.
///
/// With `path`, that file must exist. Without it, `config.toml` is read from
/// the platform config directory, and a commented default is created there
/// if none exists yet.
pub fn load_config(path: Option<&Path>) -> Result<BridgeConfig, ConfigError> {
    let config = match path {
        Some(path) => toml_loader::load_from_path(path)?,
        None => toml_loader::load_default()?,
    };

    validation::validate(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_with_explicit_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn load_config_with_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.toml");
        std::fs::write(&path, "[server]\nport = 9000\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.path, "/ws/terminal");
    }
}
