//! Shared types for ptybridge: the error taxonomy, session identifiers and
//! the file collaborator used by the editor UI.

pub mod errors;
pub mod files;
pub mod id;

pub use errors::{BridgeError, ConfigError, FileError, SessionEnd};
pub use id::SessionId;

pub type Result<T> = std::result::Result<T, BridgeError>;
