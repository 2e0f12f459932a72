//! ptybridge-pty: the PTY side of a bridged shell session.
//!
//! # Architecture
//!
//! - [`PtyProcess`]: spawns the shell on a fresh pseudo-terminal and owns the
//!   child and master handles until [`PtyProcess::close`].
//! - [`frame`]: classifies client messages into raw input, resize commands, or
//!   ignorable junk.
//! - [`pump`]: the two byte pumps (device to channel, channel to device) and
//!   the first-to-finish join over them.

pub mod frame;
pub mod process;
pub mod pump;

pub use frame::{apply_resize, decode, ControlFrame, MalformedFrame};
pub use process::{PtyDevice, PtyProcess, PtyReader, PtyWriter, WindowSize};
pub use pump::{pump_inbound, pump_outbound, run_duplex};
