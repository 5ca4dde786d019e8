//! Unix socket transport for the server side.
//!
//! Each accepted connection becomes a client with its own [`ClientId`]. A
//! reader task feeds length-prefixed frames to [`Node::route`]; a writer task
//! drains the client's outbound queue, which is what [`ServerTransport`]
//! pushes into.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tracing::{debug, error, info, warn};

use netmux_engine::stream::{enqueue, write_frames};
use netmux_engine::{
    ClientId, DeliveryMode, NamespaceRegistry, Node, NodeConfig, Peer, Role, Transport,
    TransportError, TransportResult,
};
use netmux_protocol::FrameReader;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Outbound half of the socket server, handed to the server [`Node`].
#[derive(Default)]
pub struct ServerTransport {
    clients: DashMap<ClientId, mpsc::Sender<Bytes>>,
}

impl ServerTransport {
    /// Ids of the connected clients, sorted.
    pub fn clients(&self) -> Vec<ClientId> {
        let mut clients: Vec<ClientId> = self.clients.iter().map(|entry| *entry.key()).collect();
        clients.sort();
        clients
    }

    fn attach(&self, client: ClientId, queue: mpsc::Sender<Bytes>) {
        self.clients.insert(client, queue);
    }

    fn detach(&self, client: ClientId) {
        self.clients.remove(&client);
    }
}

impl Transport for ServerTransport {
    fn send_to_one(&self, target: Peer, frame: Bytes, mode: DeliveryMode) -> TransportResult<()> {
        let Peer::Client(client) = target else {
            return Err(TransportError::Unroutable(target));
        };
        let queue = self
            .clients
            .get(&client)
            .map(|entry| entry.value().clone())
            .ok_or(TransportError::UnknownPeer(target))?;
        enqueue(&queue, target, frame, mode)
    }
}

/// Makes `path` free to bind, or explains why it is not.
async fn claim_socket_path(path: &Path, cleanup_stale: bool) -> ServerResult<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
        && !dir.exists()
    {
        return Err(ServerError::socket_dir_missing(dir));
    }
    if !path.exists() {
        return Ok(());
    }
    if !cleanup_stale || UnixStream::connect(path).await.is_ok() {
        return Err(ServerError::socket_in_use(path));
    }

    info!(path = %path.display(), "Removing stale socket");
    std::fs::remove_file(path)?;
    Ok(())
}

/// Unix socket server for handling client connections.
pub struct SocketServer {
    /// Server configuration.
    config: ServerConfig,
    /// Unix socket listener.
    listener: UnixListener,
    /// Semaphore for limiting concurrent connections.
    connection_semaphore: Arc<Semaphore>,
    /// Outbound queues of connected clients.
    transport: Arc<ServerTransport>,
    /// Next id handed to an accepted connection.
    next_client: AtomicU64,
}

impl SocketServer {
    /// Binds the socket described by `config`.
    ///
    /// A leftover socket file is removed when nothing answers on it and
    /// `cleanup_stale_socket` is set; a live one is never touched.
    pub async fn new(config: ServerConfig) -> ServerResult<Self> {
        let socket_path = &config.socket_path;
        claim_socket_path(socket_path, config.cleanup_stale_socket).await?;

        let listener = UnixListener::bind(socket_path)?;
        info!(path = %socket_path.display(), "Socket server listening");

        let connection_semaphore = Arc::new(Semaphore::new(config.max_connections));

        Ok(Self {
            config,
            listener,
            connection_semaphore,
            transport: Arc::new(ServerTransport::default()),
            next_client: AtomicU64::new(1),
        })
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// The transport server nodes must be built with.
    pub fn transport(&self) -> Arc<ServerTransport> {
        Arc::clone(&self.transport)
    }

    /// Builds the server node wired to this socket.
    pub fn node(&self, registry: Arc<NamespaceRegistry>, config: NodeConfig) -> Arc<Node> {
        Arc::new(Node::new(Role::Server, registry, self.transport(), config))
    }

    /// Accepts a single connection and assigns it the next client id.
    pub async fn accept(&self) -> ServerResult<Connection> {
        let permit = Arc::clone(&self.connection_semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ServerError::Shutdown)?;

        let (stream, _addr) = self.listener.accept().await?;
        let id = ClientId(self.next_client.fetch_add(1, Ordering::Relaxed));
        debug!(client = %id, "Accepted new connection");

        Ok(Connection {
            id,
            stream,
            write_timeout: self.config.write_timeout,
            queue_depth: self.config.outbound_queue,
            _permit: permit,
        })
    }

    /// Runs the accept loop, serving every connection through `node`.
    ///
    /// `node` must have been built with [`SocketServer::node`] (or with
    /// [`SocketServer::transport`]) so replies reach the connections.
    pub async fn run(&self, node: Arc<Node>) -> ServerResult<()> {
        loop {
            match self.accept().await {
                Ok(connection) => {
                    tokio::spawn(connection.serve(Arc::clone(&node), self.transport()));
                }
                Err(ServerError::Shutdown) => return Err(ServerError::Shutdown),
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Runs the accept loop until `shutdown` completes.
    pub async fn run_until_shutdown<S>(&self, node: Arc<Node>, shutdown: S) -> ServerResult<()>
    where
        S: Future<Output = ()> + Send,
    {
        tokio::select! {
            result = self.run(node) => result,
            _ = shutdown => {
                info!("Shutdown signal received");
                Ok(())
            }
        }
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        if self.config.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
                warn!(
                    path = %self.config.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            } else {
                debug!(path = %self.config.socket_path.display(), "Removed socket file");
            }
        }
    }
}

/// An accepted client connection.
pub struct Connection {
    id: ClientId,
    stream: UnixStream,
    write_timeout: Duration,
    queue_depth: usize,
    _permit: OwnedSemaphorePermit,
}

impl Connection {
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Serves the connection until the client goes away.
    ///
    /// On return the client is detached from `transport` and every request
    /// the server still had pending with it has failed.
    pub async fn serve(self, node: Arc<Node>, transport: Arc<ServerTransport>) {
        let Self {
            id,
            stream,
            write_timeout,
            queue_depth,
            _permit,
        } = self;
        let (read_half, write_half) = stream.into_split();
        let (queue, outbound) = mpsc::channel(queue_depth);
        transport.attach(id, queue);
        let attached = Attached {
            id,
            node: Arc::clone(&node),
            transport,
        };

        let writer = tokio::spawn(write_frames(
            Peer::Client(id),
            write_half,
            outbound,
            write_timeout,
        ));

        let mut reader = FrameReader::new(read_half);
        loop {
            match reader.read_frame().await {
                Ok(Some(frame)) => {
                    if let Err(e) = node.route(Peer::Client(id), frame) {
                        warn!(client = %id, error = %e, "Dropping malformed frame");
                    }
                }
                Ok(None) => {
                    debug!(client = %id, "Client disconnected");
                    break;
                }
                Err(e) => {
                    warn!(client = %id, error = %e, "Error reading frame");
                    break;
                }
            }
        }

        drop(attached);
        if let Err(e) = writer.await {
            warn!(client = %id, error = %e, "Writer task failed");
        }
    }
}

/// Detaches a client and fails its pending requests when dropped, even if
/// the read loop unwinds.
struct Attached {
    id: ClientId,
    node: Arc<Node>,
    transport: Arc<ServerTransport>,
}

impl Drop for Attached {
    fn drop(&mut self) {
        self.transport.detach(self.id);
        self.node.client_disconnected(self.id);
    }
}
