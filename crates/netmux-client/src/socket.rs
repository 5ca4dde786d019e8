//! Unix socket client transport.
//!
//! [`SocketClient::connect`] opens the socket and returns a
//! [`ClientConnection`] whose client [`Node`] talks to the server. Inbound
//! frames are routed on a reader task; outbound frames go through a bounded
//! queue drained by a writer task.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::net::UnixStream;
use tokio::net::unix::OwnedReadHalf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use netmux_core::{DIAG_NAMESPACE, PONG};
use netmux_engine::stream::{enqueue, write_frames};
use netmux_engine::{
    DeliveryMode, NamespaceRegistry, Node, NodeConfig, Peer, Role, Transport, TransportError,
    TransportResult,
};
use netmux_protocol::FrameReader;

use crate::error::{ClientError, ClientResult};

const DEFAULT_QUEUE_DEPTH: usize = 256;

/// Outbound half of a client connection.
struct ClientTransport {
    queue: mpsc::Sender<Bytes>,
}

impl Transport for ClientTransport {
    fn send_to_one(&self, target: Peer, frame: Bytes, mode: DeliveryMode) -> TransportResult<()> {
        if target != Peer::Server {
            return Err(TransportError::Unroutable(target));
        }
        enqueue(&self.queue, target, frame, mode)
    }
}

/// Client for connecting to a netmux server over a Unix socket.
pub struct SocketClient {
    socket_path: PathBuf,
    timeout: Duration,
    queue_depth: usize,
}

impl SocketClient {
    /// Creates a new socket client.
    pub fn new(socket_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }

    /// Creates a socket client with the default socket path.
    pub fn with_defaults() -> Self {
        Self::new(netmux_core::default_socket_path(), Duration::from_secs(5))
    }

    /// Builder: set the outbound queue depth. Clamped to at least 1.
    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Checks if the server socket exists.
    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    /// Connects and starts routing traffic for a client node built on
    /// `registry`.
    pub async fn connect(
        &self,
        registry: Arc<NamespaceRegistry>,
        config: NodeConfig,
    ) -> ClientResult<ClientConnection> {
        debug!(socket = %self.socket_path.display(), "connecting to server");

        let stream = tokio::time::timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .map_err(|_| {
                ClientError::Timeout(format!(
                    "connecting to {} took longer than {}s",
                    self.socket_path.display(),
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                ClientError::Connection(format!(
                    "failed to connect to {}: {}",
                    self.socket_path.display(),
                    e
                ))
            })?;

        let (read_half, write_half) = stream.into_split();
        let (queue, outbound) = mpsc::channel(self.queue_depth);
        let node = Arc::new(Node::new(
            Role::Client,
            registry,
            Arc::new(ClientTransport { queue }),
            config,
        ));

        let writer = tokio::spawn(write_frames(Peer::Server, write_half, outbound, self.timeout));
        let reader = tokio::spawn(read_frames(Arc::downgrade(&node), read_half));

        Ok(ClientConnection {
            node,
            reader,
            writer,
            timeout: self.timeout,
        })
    }
}

async fn read_frames(node: Weak<Node>, read_half: OwnedReadHalf) {
    let mut reader = FrameReader::new(read_half);
    loop {
        let frame = match reader.read_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("server closed the connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "error reading frame");
                break;
            }
        };

        let Some(node) = node.upgrade() else {
            return;
        };
        if let Err(e) = node.route(Peer::Server, frame) {
            warn!(error = %e, "dropping malformed frame");
        }
    }

    if let Some(node) = node.upgrade() {
        node.server_disconnected();
    }
}

/// A live connection to the server.
pub struct ClientConnection {
    node: Arc<Node>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    timeout: Duration,
}

impl ClientConnection {
    /// The client node; register namespaces and send traffic through it.
    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// True once the server side has gone away.
    pub fn is_closed(&self) -> bool {
        self.reader.is_finished()
    }

    /// Sends a diagnostic ping and returns the round-trip time.
    pub async fn ping(&self) -> ClientResult<Duration> {
        let registry = self.node.registry();
        let diag = registry
            .get(DIAG_NAMESPACE)
            .unwrap_or_else(|| registry.register(DIAG_NAMESPACE));

        let started = Instant::now();
        let reply = self.node.request_server(&diag, "ping", Bytes::new()).await?;
        if &reply[..] != PONG {
            return Err(ClientError::Protocol(format!(
                "unexpected ping reply ({} bytes)",
                reply.len()
            )));
        }
        Ok(started.elapsed())
    }

    /// Flushes queued frames and closes the connection.
    ///
    /// Frames still queued are written as long as no other handle to the
    /// node keeps the queue open; otherwise the writer is stopped after the
    /// connection timeout.
    pub async fn close(self) {
        let Self {
            node,
            reader,
            mut writer,
            timeout,
        } = self;
        reader.abort();
        drop(node);

        if tokio::time::timeout(timeout, &mut writer).await.is_err() {
            debug!("writer still busy at close, aborting");
            writer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netmux_engine::RequestError;
    use netmux_server::{ServerConfig, SocketServer, register_diagnostics};
    use tempfile::tempdir;

    #[test]
    fn socket_client_creation() {
        let client = SocketClient::new("/tmp/test.sock", Duration::from_secs(10));
        assert_eq!(client.socket_path(), Path::new("/tmp/test.sock"));
        assert!(!client.socket_exists());
    }

    #[test]
    fn default_client() {
        let client = SocketClient::with_defaults();
        assert!(client.socket_path().to_string_lossy().contains("netmux"));
    }

    #[tokio::test]
    async fn connect_to_missing_socket_fails() {
        let dir = tempdir().unwrap();
        let client = SocketClient::new(dir.path().join("absent.sock"), Duration::from_secs(1));

        let result = client
            .connect(Arc::new(NamespaceRegistry::new()), NodeConfig::default())
            .await;
        assert!(matches!(result, Err(ClientError::Connection(_))));
    }

    async fn serve(socket_path: &Path) -> (Arc<SocketServer>, Arc<Node>) {
        let server = Arc::new(SocketServer::new(ServerConfig::new(socket_path)).await.unwrap());
        let registry = Arc::new(NamespaceRegistry::new());
        register_diagnostics(&registry);
        let node = server.node(registry, NodeConfig::default());

        let accept = Arc::clone(&server);
        let serving = Arc::clone(&node);
        tokio::spawn(async move {
            let _ = accept.run(serving).await;
        });
        (server, node)
    }

    #[tokio::test]
    async fn ping_and_requests_in_both_directions() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("netmux.sock");
        let (server, server_node) = serve(&socket_path).await;
        server_node
            .register("pkg.a")
            .on_client_request("ping", |_, payload| async move { Ok(payload) });

        let client = SocketClient::new(&socket_path, Duration::from_secs(2));
        let connection = client
            .connect(Arc::new(NamespaceRegistry::new()), NodeConfig::default())
            .await
            .unwrap();
        connection.ping().await.unwrap();

        let ns = connection.node().register("pkg.a");
        ns.on_server_request("whoami", |_, _| async { Ok(Bytes::from_static(b"cli")) });
        let reply = connection
            .node()
            .request_server(&ns, "ping", vec![0x01u8, 0x02])
            .await
            .unwrap();
        assert_eq!(&reply[..], &[0x01, 0x02]);

        let clients = server.transport().clients();
        assert_eq!(clients.len(), 1);
        let server_ns = server_node.registry().get("pkg.a").unwrap();
        let reply = server_node
            .request_client(clients[0], &server_ns, "whoami", Bytes::new())
            .await
            .unwrap();
        assert_eq!(&reply[..], b"cli");

        connection.close().await;
    }

    #[tokio::test]
    async fn server_going_away_fails_pending_requests() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("netmux.sock");
        let server = SocketServer::new(ServerConfig::new(&socket_path)).await.unwrap();

        let client = SocketClient::new(&socket_path, Duration::from_secs(2));
        let connecting = tokio::spawn(async move {
            client
                .connect(Arc::new(NamespaceRegistry::new()), NodeConfig::default())
                .await
                .unwrap()
        });

        // Accept the connection, then close it without ever answering.
        let accepted = server.accept().await.unwrap();
        let connection = connecting.await.unwrap();
        let ns = connection.node().register("pkg.a");

        let node = Arc::clone(connection.node());
        let waiting =
            tokio::spawn(async move { node.request_server(&ns, "ping", Bytes::new()).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(accepted);

        let result = waiting.await.unwrap();
        assert!(matches!(result, Err(RequestError::Disconnected)));

        tokio::time::timeout(Duration::from_secs(1), async {
            while !connection.is_closed() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}
