//! netmux CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::Level;

use netmux_client::cli::{Cli, Command, ConfigAction};
use netmux_client::commands;
use netmux_client::config::ClientConfig;
use netmux_client::error::{ClientError, ClientResult};
use netmux_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // The server logs like a daemon; everything else stays quiet
    let debug = cli.debug || config.debug;
    let tracing = match (&cli.command, debug) {
        (Command::Server, false) => TracingConfig::daemon(),
        (Command::Server, true) => TracingConfig::daemon().with_level(Level::DEBUG),
        (_, false) => TracingConfig::cli(),
        (_, true) => TracingConfig::cli_debug(),
    };
    if let Err(e) = init_tracing(tracing) {
        eprintln!("warning: {}", e);
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Loads the config file and applies command-line overrides.
fn load_config(cli: &Cli) -> ClientResult<ClientConfig> {
    let mut config = match cli.config {
        Some(ref path) => ClientConfig::load_from(path).map_err(ClientError::Config)?,
        None => ClientConfig::load().map_err(ClientError::Config)?,
    };

    if cli.socket_path.is_some() {
        config.server.socket_path = cli.socket_path.clone();
    }
    if cli.timeout.is_some() {
        config.requests.timeout = cli.timeout;
    }
    Ok(config)
}

async fn run(cli: Cli, config: ClientConfig) -> ClientResult<()> {
    match cli.command {
        #[cfg(feature = "server")]
        Command::Server => commands::server::run(&config).await,
        #[cfg(not(feature = "server"))]
        Command::Server => Err(ClientError::Config(
            "this build has no server support (enable the `server` feature)".into(),
        )),
        Command::Ping { count } => commands::request::ping(&config, count).await,
        Command::Request {
            namespace,
            name,
            payload,
        } => commands::request::request(&config, &namespace, &name, payload.to_bytes()?).await,
        Command::Send {
            namespace,
            name,
            payload,
        } => commands::request::send(&config, &namespace, &name, payload.to_bytes()?).await,
        Command::Namespaces => commands::request::namespaces(&config).await,
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config),
            ConfigAction::Path => commands::config::path(&config),
        },
    }
}
