//! In-process transport.
//!
//! [`MemoryHub`] links one server node with any number of client nodes living
//! in the same process. Every frame is routed on its own tokio task, so sends
//! never re-enter the sender synchronously, just like a real transport.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use bytes::Bytes;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::namespace::NamespaceRegistry;
use crate::node::{Node, NodeConfig, Role};
use crate::transport::{ClientId, DeliveryMode, Peer, Transport, TransportError, TransportResult};

struct HubInner {
    server: OnceLock<Weak<Node>>,
    clients: DashMap<ClientId, Weak<Node>>,
    next_client: AtomicU64,
}

impl HubInner {
    fn node_for(&self, target: Peer) -> TransportResult<Arc<Node>> {
        let node = match target {
            Peer::Server => self.server.get().and_then(Weak::upgrade),
            Peer::Client(client) => self.clients.get(&client).and_then(|entry| entry.upgrade()),
        };
        node.ok_or(TransportError::UnknownPeer(target))
    }
}

struct MemoryTransport {
    hub: Arc<HubInner>,
    local: Peer,
}

impl Transport for MemoryTransport {
    fn send_to_one(&self, target: Peer, frame: Bytes, _mode: DeliveryMode) -> TransportResult<()> {
        if matches!((self.local, target), (Peer::Client(_), Peer::Client(_)) | (Peer::Server, Peer::Server)) {
            return Err(TransportError::Unroutable(target));
        }

        let node = self.hub.node_for(target)?;
        let origin = self.local;
        tokio::spawn(async move {
            if let Err(e) = node.route(origin, frame) {
                warn!(peer = %origin, error = %e, "dropping malformed frame");
            }
        });
        Ok(())
    }
}

/// Connects a server node and client nodes inside one process.
pub struct MemoryHub {
    inner: Arc<HubInner>,
    server: Arc<Node>,
}

impl MemoryHub {
    /// Creates the hub and its server node.
    pub fn new(registry: Arc<NamespaceRegistry>, config: NodeConfig) -> Self {
        let inner = Arc::new(HubInner {
            server: OnceLock::new(),
            clients: DashMap::new(),
            next_client: AtomicU64::new(1),
        });
        let transport = Arc::new(MemoryTransport {
            hub: Arc::clone(&inner),
            local: Peer::Server,
        });
        let server = Arc::new(Node::new(Role::Server, registry, transport, config));
        inner.server.get_or_init(|| Arc::downgrade(&server));
        Self { inner, server }
    }

    pub fn server(&self) -> &Arc<Node> {
        &self.server
    }

    /// Creates a client node connected to the server.
    pub fn connect(&self, registry: Arc<NamespaceRegistry>, config: NodeConfig) -> (ClientId, Arc<Node>) {
        let id = ClientId(self.inner.next_client.fetch_add(1, Ordering::Relaxed));
        let transport = Arc::new(MemoryTransport {
            hub: Arc::clone(&self.inner),
            local: Peer::Client(id),
        });
        let client = Arc::new(Node::new(Role::Client, registry, transport, config));
        self.inner.clients.insert(id, Arc::downgrade(&client));
        debug!(client = %id, "memory client connected");
        (id, client)
    }

    /// Disconnects a client, failing the requests pending on both ends.
    /// Returns false if the client was not connected.
    pub fn disconnect(&self, client: ClientId) -> bool {
        let Some((_, node)) = self.inner.clients.remove(&client) else {
            return false;
        };
        self.server.client_disconnected(client);
        if let Some(node) = node.upgrade() {
            node.server_disconnected();
        }
        debug!(%client, "memory client disconnected");
        true
    }

    /// Ids of the connected clients, sorted.
    pub fn clients(&self) -> Vec<ClientId> {
        let mut clients: Vec<ClientId> = self.inner.clients.iter().map(|entry| *entry.key()).collect();
        clients.sort();
        clients
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn client_ids_start_at_one() {
        let hub = MemoryHub::new(Arc::new(NamespaceRegistry::new()), NodeConfig::default());
        let (first, _a) = hub.connect(Arc::new(NamespaceRegistry::new()), NodeConfig::default());
        let (second, _b) = hub.connect(Arc::new(NamespaceRegistry::new()), NodeConfig::default());

        assert_eq!(first, ClientId(1));
        assert_eq!(second, ClientId(2));
        assert_eq!(hub.clients(), vec![first, second]);

        assert!(hub.disconnect(first));
        assert!(!hub.disconnect(first));
        assert_eq!(hub.clients(), vec![second]);
    }

    #[tokio::test]
    async fn sending_to_a_gone_client_fails() {
        let hub = MemoryHub::new(Arc::new(NamespaceRegistry::new()), NodeConfig::default());
        let ns = hub.server().register("pkg.a");

        assert!(matches!(
            hub.server().send_to_client(ClientId(9), &ns, "tick", Bytes::new()),
            Err(TransportError::UnknownPeer(Peer::Client(ClientId(9))))
        ));
    }
}
