//! Configuration validation.
//!
//! Collects every violation instead of stopping at the first one.

use crate::schema::BridgeConfig;
use ptybridge_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &BridgeConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    // Server
    if config.server.host.trim().is_empty() {
        errors.push("server.host must not be empty".into());
    }
    if !config.server.path.starts_with('/') {
        errors.push(format!(
            "server.path = {:?} must start with '/'",
            config.server.path
        ));
    }
    validate_range(
        &mut errors,
        "server.handshake_timeout_secs",
        config.server.handshake_timeout_secs,
        1,
        300,
    );
    validate_range(
        &mut errors,
        "server.shutdown_grace_secs",
        config.server.shutdown_grace_secs,
        1,
        300,
    );

    // Shell
    if config.shell.term.trim().is_empty() {
        errors.push("shell.term must not be empty".into());
    }
    if config.shell.env.keys().any(|k| k.is_empty() || k.contains('=')) {
        errors.push("shell.env keys must be non-empty and must not contain '='".into());
    }

    // Terminal
    validate_range(&mut errors, "terminal.rows", u64::from(config.terminal.rows), 1, 1000);
    validate_range(&mut errors, "terminal.cols", u64::from(config.terminal.cols), 1, 1000);
    validate_range(
        &mut errors,
        "terminal.read_chunk_size",
        config.terminal.read_chunk_size as u64,
        512,
        1 << 20,
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_range(errors: &mut Vec<String>, name: &str, value: u64, min: u64, max: u64) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(validate(&BridgeConfig::default()).is_ok());
    }

    #[test]
    fn catches_path_without_leading_slash() {
        let mut config = BridgeConfig::default();
        config.server.path = "ws/terminal".into();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("server.path"));
    }

    #[test]
    fn catches_zero_rows() {
        let mut config = BridgeConfig::default();
        config.terminal.rows = 0;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("terminal.rows = 0"));
    }

    #[test]
    fn catches_tiny_read_chunk() {
        let mut config = BridgeConfig::default();
        config.terminal.read_chunk_size = 16;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("terminal.read_chunk_size"));
    }

    #[test]
    fn catches_empty_term() {
        let mut config = BridgeConfig::default();
        config.shell.term = "  ".into();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("shell.term"));
    }

    #[test]
    fn catches_bad_env_key() {
        let mut config = BridgeConfig::default();
        config.shell.env.insert("A=B".into(), "c".into());
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("shell.env"));
    }

    #[test]
    fn ephemeral_port_is_allowed() {
        let mut config = BridgeConfig::default();
        config.server.port = 0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn collects_multiple_errors() {
        let mut config = BridgeConfig::default();
        config.server.handshake_timeout_secs = 0;
        config.terminal.cols = 5000;
        config.shell.term = String::new();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("server.handshake_timeout_secs"));
        assert!(err.contains("terminal.cols"));
        assert!(err.contains("shell.term"));
    }
}
