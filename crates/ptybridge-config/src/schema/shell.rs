//! Shell process configuration types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Shell process settings.
///
/// Controls which shell each session launches, its arguments, working
/// directory, extra environment variables and terminal type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Shell program path. Empty string means `$SHELL`, then `/bin/sh`.
    pub program: String,
    /// Extra arguments passed to the shell.
    pub args: Vec<String>,
    /// Initial working directory. `None` means the server's own.
    pub working_directory: Option<String>,
    /// Extra environment variables injected into the shell.
    pub env: HashMap<String, String>,
    /// Pass `-l` so the shell reads its login profile.
    pub login_shell: bool,
    /// Value for `TERM`; always applied last.
    pub term: String,
}

impl ShellConfig {
    /// Resolve the program to launch.
    pub fn resolved_program(&self) -> String {
        if !self.program.is_empty() {
            return self.program.clone();
        }
        std::env::var("SHELL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "/bin/sh".to_string())
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            working_directory: None,
            env: HashMap::new(),
            login_shell: false,
            term: "xterm-256color".into(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
