//! ptybridge: remote interactive shell over WebSocket.
//!
//! Every WebSocket connection on the configured path gets its own shell on a
//! fresh pseudo-terminal. Binary frames are keystrokes, text frames are JSON
//! resize commands, and terminal output comes back as binary frames. The same
//! port answers the editor's `/api/file/*` requests.

mod cli;
mod file_api;
mod lifecycle;
mod registry;
mod server;

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use crate::server::Server;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();

    // Load before logging so the config's level can seed the filter.
    let loaded = ptybridge_config::load_config(args.config.as_deref());

    let directive = args.log_level.clone().unwrap_or_else(|| {
        loaded
            .as_ref()
            .map(|config| config.logging.level)
            .unwrap_or_default()
            .directive()
    });
    init_logging(&directive);

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            return ExitCode::FAILURE;
        }
    };

    args.apply(&mut config);
    if let Err(e) = ptybridge_config::validation::validate(&config) {
        tracing::error!(error = %e, "invalid command-line override");
        return ExitCode::FAILURE;
    }

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "failed to bind listener");
            return ExitCode::FAILURE;
        }
    };

    match server.run(shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server error");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(directive: &str) {
    let filter = EnvFilter::from_default_env();
    let filter = match directive.parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(e) => {
            eprintln!("ignoring invalid log directive {directive:?}: {e}");
            filter
        }
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Ctrl-C received");
}
