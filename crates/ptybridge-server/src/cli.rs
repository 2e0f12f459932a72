use std::path::PathBuf;

use clap::Parser;
use ptybridge_config::BridgeConfig;

/// ptybridge: a remote interactive shell over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "ptybridge", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Shell to launch for each session.
    #[arg(short, long)]
    pub shell: Option<String>,

    /// Log filter directive (e.g. debug, ptybridge_pty=trace).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Args {
    /// Overlay command-line values on a loaded config.
    pub fn apply(&self, config: &mut BridgeConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(shell) = &self.shell {
            config.shell.program = shell.clone();
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}
