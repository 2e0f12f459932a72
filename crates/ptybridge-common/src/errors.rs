use std::fmt;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Errors from the editor's file collaborator.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The OS could not allocate a pseudo-terminal or spawn the shell.
    #[error("resource error: {0}")]
    Resource(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Why a session stopped pumping.
///
/// None of these are failures of the server: each one is an ordinary end of
/// a shell session and simply drives teardown.
#[derive(Debug)]
pub enum SessionEnd {
    /// The shell exited; the master side reported end of file or `EIO`.
    ProcessExited,
    /// The terminal device failed for a reason other than the shell exiting.
    DeviceError(std::io::Error),
    /// The client closed the channel.
    ClientDisconnected,
    /// The channel failed mid-session.
    ChannelError(String),
    /// The session was cancelled from outside (forced termination, shutdown).
    Terminated,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::ProcessExited => write!(f, "process exited"),
            SessionEnd::DeviceError(e) => write!(f, "terminal device error: {e}"),
            SessionEnd::ClientDisconnected => write!(f, "client disconnected"),
            SessionEnd::ChannelError(e) => write!(f, "channel error: {e}"),
            SessionEnd::Terminated => write!(f, "session terminated"),
        }
    }
}
