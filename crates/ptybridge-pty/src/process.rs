//! PTY process management: open a pseudo-terminal, launch the shell on it,
//! and tear both down again.
//!
//! The master side is driven through a non-blocking duplicate of its file
//! descriptor registered with the Tokio reactor, so neither pump ever parks a
//! runtime thread waiting on the shell.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::path::PathBuf;

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use ptybridge_common::BridgeError;
use ptybridge_config::ShellConfig;
use tokio::io::unix::AsyncFd;

// =============================================================================
// WINDOW SIZE
// =============================================================================

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub rows: u16,
    pub cols: u16,
}

impl WindowSize {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }
}

impl From<WindowSize> for PtySize {
    fn from(size: WindowSize) -> Self {
        PtySize {
            rows: size.rows,
            cols: size.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

// =============================================================================
// PTY PROCESS
// =============================================================================

/// A shell process running on its own pseudo-terminal.
///
/// Owns the child handle and the master side of the pair. The subordinate
/// side is handed to the child at spawn time and closed in the server, so the
/// master reports `EIO` as soon as the shell (and anything it left holding the
/// terminal) is gone.
pub struct PtyProcess {
    device: Option<PtyDevice>,
    child: Option<Box<dyn Child + Send + Sync>>,
    pid: Option<u32>,
    exit_code: Option<u32>,
}

impl PtyProcess {
    /// Open a PTY of the given size and launch the configured shell on it.
    ///
    /// The shell runs as a session leader with the subordinate side as its
    /// controlling terminal and standard streams. It inherits the server's
    /// environment, plus `[shell.env]`, with `TERM` set last.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(shell: &ShellConfig, size: WindowSize) -> Result<Self, BridgeError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(size.into())
            .map_err(|e| BridgeError::Resource(format!("failed to open pty: {e}")))?;

        let program = shell.resolved_program();
        let cmd = build_shell_command(shell, &program);

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| BridgeError::Resource(format!("failed to spawn shell '{program}': {e}")))?;

        drop(pair.slave);

        let pid = child.process_id();
        let io = match master_io(pair.master.as_ref()) {
            Ok(io) => io,
            Err(e) => {
                terminate(child);
                return Err(BridgeError::Resource(format!(
                    "failed to register pty master: {e}"
                )));
            }
        };

        tracing::debug!(pid = ?pid, shell = %program, rows = size.rows, cols = size.cols, "PTY spawned");

        Ok(Self {
            device: Some(PtyDevice {
                master: pair.master,
                io,
            }),
            child: Some(child),
            pid,
            exit_code: None,
        })
    }

    /// OS process id of the shell.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// The live terminal device, or `None` once closed.
    pub fn device_mut(&mut self) -> Option<&mut PtyDevice> {
        self.device.as_mut()
    }

    /// Terminate the shell, reap it, then release the terminal device.
    ///
    /// Idempotent: later calls return the recorded exit code without touching
    /// the OS again. A shell that already exited is reaped but never
    /// signalled.
    pub async fn close(&mut self) -> Option<u32> {
        if let Some(child) = self.child.take() {
            let pid = self.pid;
            match tokio::task::spawn_blocking(move || terminate(child)).await {
                Ok(code) => self.exit_code = code.or(self.exit_code),
                Err(e) => tracing::warn!(pid = ?pid, error = %e, "PTY teardown task failed"),
            }
        }

        if self.device.take().is_some() {
            tracing::debug!(pid = ?self.pid, exit_code = ?self.exit_code, "PTY released");
        }

        self.exit_code
    }
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        // Only reached without `close()` when the owning task was aborted.
        if let Some(child) = self.child.take() {
            let spawned = std::thread::Builder::new()
                .name("pty-reaper".to_string())
                .spawn(move || {
                    terminate(child);
                });
            if let Err(e) = spawned {
                tracing::warn!(pid = ?self.pid, error = %e, "failed to spawn PTY reaper thread");
            }
        }
    }
}

// =============================================================================
// TERMINAL DEVICE
// =============================================================================

/// Master side of the pseudo-terminal.
pub struct PtyDevice {
    /// portable-pty handle, used for window-size ioctls.
    master: Box<dyn MasterPty + Send>,
    /// Non-blocking duplicate of the master descriptor, used for all I/O.
    io: AsyncFd<File>,
}

impl PtyDevice {
    /// Split into the read half (outbound pump) and the write half (inbound
    /// pump). Both halves share the descriptor; they never contend because
    /// they move bytes in opposite directions.
    pub fn split(&mut self) -> (PtyReader<'_>, PtyWriter<'_>) {
        (
            PtyReader { io: &self.io },
            PtyWriter {
                io: &self.io,
                master: &mut self.master,
            },
        )
    }

    /// Window size currently reported by the terminal driver.
    pub fn size(&self) -> io::Result<WindowSize> {
        let size = self.master.get_size().map_err(io::Error::other)?;
        Ok(WindowSize::new(size.rows, size.cols))
    }
}

/// Read half of a [`PtyDevice`].
pub struct PtyReader<'a> {
    io: &'a AsyncFd<File>,
}

impl PtyReader<'_> {
    /// Wait until the master is readable, then read what is available.
    ///
    /// `Ok(0)` and `EIO` both mean the subordinate side is gone.
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.io.readable().await?;
            match guard.try_io(|inner| inner.get_ref().read(buf)) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }
}

/// Write half of a [`PtyDevice`], which also carries resize control.
pub struct PtyWriter<'a> {
    io: &'a AsyncFd<File>,
    master: &'a mut Box<dyn MasterPty + Send>,
}

impl PtyWriter<'_> {
    /// Write all of `data`, resuming after partial non-blocking writes.
    pub async fn write_all(&mut self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            let mut guard = self.io.writable().await?;
            match guard.try_io(|inner| inner.get_ref().write(data)) {
                Ok(Ok(0)) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(Ok(n)) => data = &data[n..],
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
        Ok(())
    }

    /// Issue `TIOCSWINSZ`; the driver signals `SIGWINCH` to the foreground
    /// process group.
    pub fn resize(&self, size: WindowSize) -> io::Result<()> {
        self.master.resize(size.into()).map_err(io::Error::other)
    }
}

/// Whether an I/O error on the master means the subordinate side hung up.
pub(crate) fn is_hangup(err: &io::Error) -> bool {
    err.raw_os_error() == Some(nix::errno::Errno::EIO as i32)
}

// =============================================================================
// HELPERS
// =============================================================================

/// Build the `CommandBuilder` for a session shell.
fn build_shell_command(shell: &ShellConfig, program: &str) -> CommandBuilder {
    // CommandBuilder starts from the server's environment.
    let mut cmd = CommandBuilder::new(program);

    if shell.login_shell {
        cmd.arg("-l");
    }
    cmd.args(&shell.args);

    let cwd = shell
        .working_directory
        .as_ref()
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok());
    if let Some(dir) = cwd {
        cmd.cwd(dir);
    }

    for (key, value) in &shell.env {
        cmd.env(key, value);
    }
    cmd.env("TERM", &shell.term);

    cmd
}

/// Duplicate the master descriptor, make it non-blocking and register it
/// with the reactor.
///
/// `O_NONBLOCK` lives on the open file description, so portable-pty's own
/// descriptor becomes non-blocking too. Nothing reads or writes through it.
fn master_io(master: &(dyn MasterPty + Send)) -> io::Result<AsyncFd<File>> {
    let raw: RawFd = MasterPty::as_raw_fd(master)
        .ok_or_else(|| io::Error::other("pty master has no file descriptor"))?;

    // SAFETY: `raw` is owned by `master`, which is alive for this borrow; the
    // duplicate gets its own lifetime.
    let owned = unsafe { BorrowedFd::borrow_raw(raw) }.try_clone_to_owned()?;

    let flags = fcntl(owned.as_raw_fd(), FcntlArg::F_GETFL)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(owned.as_raw_fd(), FcntlArg::F_SETFL(flags))?;

    AsyncFd::new(File::from(owned))
}

/// Request termination (SIGHUP, then SIGKILL after a short grace period) and
/// reap. Returns the exit code if the process could be waited on.
fn terminate(mut child: Box<dyn Child + Send + Sync>) -> Option<u32> {
    match child.try_wait() {
        Ok(Some(status)) => return Some(status.exit_code()),
        Ok(None) => {}
        Err(e) => tracing::debug!("PTY try_wait error: {e}"),
    }

    if let Err(e) = child.kill() {
        tracing::debug!("PTY kill error (may already be dead): {e}");
    }

    match child.wait() {
        Ok(status) => Some(status.exit_code()),
        Err(e) => {
            tracing::debug!("PTY wait error: {e}");
            None
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
