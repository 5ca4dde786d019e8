//! A node: one endpoint of the multiplexer.
//!
//! A node couples a [`NamespaceRegistry`] with a [`Transport`]. Inbound frames
//! enter through [`Node::route`]; outbound traffic leaves through the request
//! and packet methods. Server and client nodes share this type and differ only
//! in their [`Role`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::handler::{Direction, PacketHandler, RequestHandler};
use crate::namespace::{Namespace, NamespaceRegistry};
use crate::transport::{DeliveryMode, Transport};

/// Which end of the connection a node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Server,
    Client,
}

impl Role {
    pub fn is_server(self) -> bool {
        self == Self::Server
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => f.write_str("server"),
            Self::Client => f.write_str("client"),
        }
    }
}

/// Tunables for a node.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// Default timeout for remote requests. `None` waits for as long as the
    /// connection lives.
    pub request_timeout: Option<Duration>,

    /// Default delivery mode for requests and packets.
    pub delivery: DeliveryMode,
}

impl NodeConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }
}

/// Result of resolving a `(namespace, name)` pair.
pub(crate) enum Lookup<H> {
    Found(H),
    UnknownNamespace,
    UnknownHandler,
}

/// One endpoint of the multiplexer.
pub struct Node {
    role: Role,
    registry: Arc<NamespaceRegistry>,
    transport: Arc<dyn Transport>,
    config: NodeConfig,
}

impl Node {
    pub fn new(
        role: Role,
        registry: Arc<NamespaceRegistry>,
        transport: Arc<dyn Transport>,
        config: NodeConfig,
    ) -> Self {
        Self {
            role,
            registry,
            transport,
            config,
        }
    }

    pub fn server(registry: Arc<NamespaceRegistry>, transport: Arc<dyn Transport>) -> Self {
        Self::new(Role::Server, registry, transport, NodeConfig::default())
    }

    pub fn client(registry: Arc<NamespaceRegistry>, transport: Arc<dyn Transport>) -> Self {
        Self::new(Role::Client, registry, transport, NodeConfig::default())
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn registry(&self) -> &Arc<NamespaceRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Shorthand for `self.registry().register(identity)`.
    pub fn register(&self, identity: impl Into<String>) -> Arc<Namespace> {
        self.registry.register(identity)
    }

    pub(crate) fn lookup_packet(
        &self,
        direction: Direction,
        namespace: &str,
        name: &str,
    ) -> Lookup<Arc<dyn PacketHandler>> {
        let Some(ns) = self.registry.get(namespace) else {
            return Lookup::UnknownNamespace;
        };
        match ns.handlers().resolve_packet(direction, name) {
            Some(handler) => Lookup::Found(handler),
            None => Lookup::UnknownHandler,
        }
    }

    pub(crate) fn lookup_request(
        &self,
        direction: Direction,
        namespace: &str,
        name: &str,
    ) -> Lookup<Arc<dyn RequestHandler>> {
        let Some(ns) = self.registry.get(namespace) else {
            return Lookup::UnknownNamespace;
        };
        match ns.handlers().resolve_request(direction, name) {
            Some(handler) => Lookup::Found(handler),
            None => Lookup::UnknownHandler,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("role", &self.role)
            .field("namespaces", &self.registry.identities())
            .field("config", &self.config)
            .finish()
    }
}
