use serde::{Deserialize, Serialize};

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// TCP port (0 picks an ephemeral port).
    pub port: u16,
    /// Request path that upgrades to a terminal session.
    pub path: String,
    /// Seconds a client gets to complete the WebSocket handshake.
    pub handshake_timeout_secs: u64,
    /// Seconds to wait for sessions to drain on shutdown.
    pub shutdown_grace_secs: u64,
    /// Answer the editor's `/api/file/*` requests on the same port.
    pub file_api: bool,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8081,
            path: "/ws/terminal".into(),
            handshake_timeout_secs: 10,
            shutdown_grace_secs: 3,
            file_api: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_addr_joins_host_and_port() {
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..Default::default()
        };
        assert_eq!(config.bind_addr(), "127.0.0.1:0");
    }

    #[test]
    fn server_config_partial_toml() {
        let config: ServerConfig = toml::from_str("path = \"/term\"\n").unwrap();
        assert_eq!(config.path, "/term");
        assert_eq!(config.port, 8081);
        assert_eq!(config.handshake_timeout_secs, 10);
        assert!(config.file_api);
    }

    #[test]
    fn file_api_can_be_disabled() {
        let config: ServerConfig = toml::from_str("file_api = false\n").unwrap();
        assert!(!config.file_api);
    }
}
