//! Configuration schema types for ptybridge.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod logging;
mod server;
mod shell;
mod terminal;

pub use logging::*;
pub use server::*;
pub use shell::*;
pub use terminal::*;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    pub shell: ShellConfig,
    pub terminal: TerminalConfig,
    pub logging: LoggingConfig,
}

// =============================================================================
// Tests
// =============================================================================
