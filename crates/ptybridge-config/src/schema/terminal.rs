use serde::{Deserialize, Serialize};

/// Terminal device settings applied to every new session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Initial rows until the client sends a resize.
    pub rows: u16,
    /// Initial columns until the client sends a resize.
    pub cols: u16,
    /// Largest single read from the master side, in bytes.
    pub read_chunk_size: usize,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            rows: 24,
            cols: 80,
            read_chunk_size: 4096,
        }
    }
}
