//! Server command: hosts the server node in the foreground.

use std::sync::Arc;

use tracing::info;

use netmux_engine::NamespaceRegistry;
use netmux_server::{Shutdown, SocketServer, register_diagnostics};

use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Runs the socket server until SIGTERM or SIGINT.
///
/// The server only hosts the diagnostic namespace; applications embedding
/// `netmux-server` register their own.
pub async fn run(config: &ClientConfig) -> ClientResult<()> {
    let registry = Arc::new(NamespaceRegistry::new());
    register_diagnostics(&registry);

    let server = SocketServer::new(config.server_config()).await?;
    let node = server.node(registry, config.node_config());

    let shutdown = Shutdown::new();
    shutdown.listen_for_signals()?;

    info!(socket = %server.socket_path().display(), "Server started");
    server.run_until_shutdown(node, shutdown.wait()).await?;
    info!("Server stopped");

    Ok(())
}
