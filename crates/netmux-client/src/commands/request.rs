//! Commands that talk to a running server.

use std::sync::Arc;

use bytes::Bytes;

use netmux_core::DIAG_NAMESPACE;
use netmux_engine::{NamespaceRegistry, PayloadReader};

use crate::cli::render_payload;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::socket::{ClientConnection, SocketClient};

async fn connect(config: &ClientConfig) -> ClientResult<ClientConnection> {
    let client = SocketClient::new(config.socket_path(), config.connect_timeout())
        .with_queue_depth(config.server.outbound_queue);
    if !client.socket_exists() {
        return Err(ClientError::Connection(format!(
            "no server socket at {}; start one with `netmux server`",
            client.socket_path().display()
        )));
    }
    client
        .connect(Arc::new(NamespaceRegistry::new()), config.node_config())
        .await
}

/// Pings the server `count` times and prints each round trip.
pub async fn ping(config: &ClientConfig, count: u32) -> ClientResult<()> {
    let connection = connect(config).await?;
    for seq in 1..=count.max(1) {
        let elapsed = connection.ping().await?;
        println!(
            "pong from {}: seq={} time={:.3}ms",
            config.socket_path().display(),
            seq,
            elapsed.as_secs_f64() * 1000.0
        );
    }
    connection.close().await;
    Ok(())
}

/// Sends one request and prints the reply.
pub async fn request(
    config: &ClientConfig,
    namespace: &str,
    name: &str,
    payload: Bytes,
) -> ClientResult<()> {
    let connection = connect(config).await?;
    let ns = connection.node().register(namespace);
    let reply = connection.node().request_server(&ns, name, payload).await;
    connection.close().await;

    println!("{}", render_payload(&reply?));
    Ok(())
}

/// Sends one packet. Nothing comes back, so success only means it was
/// written to the socket.
pub async fn send(
    config: &ClientConfig,
    namespace: &str,
    name: &str,
    payload: Bytes,
) -> ClientResult<()> {
    let connection = connect(config).await?;
    let ns = connection.node().register(namespace);
    let sent = connection.node().send_to_server(&ns, name, payload);
    connection.close().await;
    sent?;
    Ok(())
}

/// Lists the namespaces the server hosts.
pub async fn namespaces(config: &ClientConfig) -> ClientResult<()> {
    let connection = connect(config).await?;
    let diag = connection.node().register(DIAG_NAMESPACE);
    let reply = connection
        .node()
        .request_server(&diag, "namespaces", Bytes::new())
        .await;
    connection.close().await;

    for identity in decode_namespaces(reply?)? {
        println!("{}", identity);
    }
    Ok(())
}

fn decode_namespaces(payload: Bytes) -> ClientResult<Vec<String>> {
    let invalid = |e: netmux_protocol::ProtocolError| {
        ClientError::Protocol(format!("invalid namespace listing: {}", e))
    };

    let mut reader = PayloadReader::new(payload);
    let count = reader.read_i32().map_err(invalid)?;
    let mut identities = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        identities.push(reader.read_string().map_err(invalid)?);
    }
    Ok(identities)
}
