//! Namespaces and the registry of namespaces a node knows.
//!
//! A namespace is the unit of registration. Its identity string scopes handler
//! names on the wire, and it owns the handler registry plus the pending
//! requests it has sent. Requests are always sent through a namespace handle,
//! so replies find their way back to the table that is waiting for them.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tracing::{debug, info};

use netmux_protocol::{PayloadReader, PayloadWriter};

use crate::error::HandlerError;
use crate::handler::{Direction, HandlerContext, HandlerRegistry};
use crate::pending::PendingTable;
use crate::transport::ClientId;

/// A registered namespace.
pub struct Namespace {
    identity: String,
    handlers: HandlerRegistry,
    to_server: PendingTable<()>,
    to_clients: PendingTable<ClientId>,
}

impl Namespace {
    fn new(identity: String) -> Self {
        Self {
            identity,
            handlers: HandlerRegistry::new(),
            to_server: PendingTable::new(),
            to_clients: PendingTable::new(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Requests this namespace sent to the server.
    pub fn to_server(&self) -> &PendingTable<()> {
        &self.to_server
    }

    /// Requests this namespace sent to clients.
    pub fn to_clients(&self) -> &PendingTable<ClientId> {
        &self.to_clients
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.to_server.len() + self.to_clients.len()
    }

    /// Registers a packet handler for traffic sent by the server.
    pub fn on_server_packet<F>(&self, name: impl Into<String>, handler: F) -> &Self
    where
        F: Fn(&HandlerContext, Bytes) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.handlers
            .register_packet(Direction::FromServer, name, handler);
        self
    }

    /// Registers a packet handler for traffic sent by clients.
    pub fn on_client_packet<F>(&self, name: impl Into<String>, handler: F) -> &Self
    where
        F: Fn(&HandlerContext, Bytes) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.handlers
            .register_packet(Direction::FromClient, name, handler);
        self
    }

    /// Registers a request handler for requests sent by the server.
    pub fn on_server_request<F, Fut>(&self, name: impl Into<String>, handler: F) -> &Self
    where
        F: Fn(HandlerContext, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Bytes, HandlerError>> + Send + 'static,
    {
        self.handlers
            .register_request(Direction::FromServer, name, handler);
        self
    }

    /// Registers a request handler for requests sent by clients.
    pub fn on_client_request<F, Fut>(&self, name: impl Into<String>, handler: F) -> &Self
    where
        F: Fn(HandlerContext, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Bytes, HandlerError>> + Send + 'static,
    {
        self.handlers
            .register_request(Direction::FromClient, name, handler);
        self
    }

    /// Structured form of [`Namespace::on_client_request`].
    pub fn on_client_request_with<F, Fut>(&self, name: impl Into<String>, handler: F) -> &Self
    where
        F: Fn(HandlerContext, PayloadReader) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<PayloadWriter, HandlerError>> + Send + 'static,
    {
        self.handlers
            .register_request_with(Direction::FromClient, name, handler);
        self
    }

    /// Structured form of [`Namespace::on_server_request`].
    pub fn on_server_request_with<F, Fut>(&self, name: impl Into<String>, handler: F) -> &Self
    where
        F: Fn(HandlerContext, PayloadReader) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<PayloadWriter, HandlerError>> + Send + 'static,
    {
        self.handlers
            .register_request_with(Direction::FromServer, name, handler);
        self
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("identity", &self.identity)
            .field("handlers", &self.handlers)
            .field("pending", &self.pending_requests())
            .finish()
    }
}

/// All namespaces registered on one node.
#[derive(Debug, Default)]
pub struct NamespaceRegistry {
    namespaces: DashMap<String, Arc<Namespace>>,
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh namespace under `identity`.
    ///
    /// An existing namespace with the same identity is replaced; its handlers
    /// stop receiving traffic.
    pub fn register(&self, identity: impl Into<String>) -> Arc<Namespace> {
        let identity = identity.into();
        let namespace = Arc::new(Namespace::new(identity.clone()));
        match self.namespaces.insert(identity, Arc::clone(&namespace)) {
            Some(previous) => info!(
                namespace = %namespace.identity,
                dropped_pending = previous.pending_requests(),
                "replaced namespace"
            ),
            None => debug!(namespace = %namespace.identity, "registered namespace"),
        }
        namespace
    }

    pub fn get(&self, identity: &str) -> Option<Arc<Namespace>> {
        self.namespaces
            .get(identity)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.namespaces.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    /// Snapshot of every registered namespace.
    pub fn namespaces(&self) -> Vec<Arc<Namespace>> {
        self.namespaces
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Sorted identities of every registered namespace.
    pub fn identities(&self) -> Vec<String> {
        let mut identities: Vec<String> = self
            .namespaces
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        identities.sort();
        identities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup() {
        let registry = NamespaceRegistry::new();
        let ns = registry.register("pkg.a");
        ns.on_client_request("ping", |_, payload| async move { Ok(payload) })
            .on_server_packet("tick", |_, _| Ok(()));

        let found = registry.get("pkg.a").unwrap();
        assert!(Arc::ptr_eq(&ns, &found));
        assert!(
            found
                .handlers()
                .resolve_request(Direction::FromClient, "ping")
                .is_some()
        );
        assert!(registry.get("pkg.b").is_none());
        assert_eq!(registry.identities(), vec!["pkg.a"]);
    }

    #[test]
    fn reregistering_replaces_namespace() {
        let registry = NamespaceRegistry::new();
        let first = registry.register("pkg.a");
        first.on_client_packet("old", |_, _| Ok(()));

        let second = registry.register("pkg.a");
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert!(
            registry
                .get("pkg.a")
                .unwrap()
                .handlers()
                .resolve_packet(Direction::FromClient, "old")
                .is_none()
        );
    }

    #[test]
    fn pending_counts_both_tables() {
        let registry = NamespaceRegistry::new();
        let ns = registry.register("pkg.a");
        let _a = ns.to_server().store((), 0, "a");
        let _b = ns.to_clients().store(ClientId(3), 0, "b");
        assert_eq!(ns.pending_requests(), 2);
    }
}
