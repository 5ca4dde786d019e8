//! Outbound traffic: requests and one-shot packets.
//!
//! Requests are sent through a [`Namespace`] handle; the namespace identity
//! addresses the remote handler and its pending table tracks the reply.
//!
//! A server talking to itself, or to the client hosted in its own process
//! ([`ClientId::HOST`]), short-circuits: the handler is called directly with
//! no encoding, no pending entry and no transport traffic.

use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use netmux_protocol::{Envelope, PayloadWriter, Rejection, RequestEnvelope};

use crate::error::{HandlerError, RequestError, RequestRejection, RequestResult};
use crate::handler::{Direction, HandlerContext, invoke_packet};
use crate::namespace::Namespace;
use crate::node::{Lookup, Node};
use crate::pending::PendingTable;
use crate::transport::{ClientId, DeliveryMode, Peer, TransportError, TransportResult};

/// Removes a pending entry when its caller stops waiting.
struct PendingGuard<'a, S: Eq + Hash + Copy + Debug> {
    table: &'a PendingTable<S>,
    scope: S,
    request_id: i32,
}

impl<S: Eq + Hash + Copy + Debug> Drop for PendingGuard<'_, S> {
    fn drop(&mut self) {
        if let Some(entry) = self.table.take(self.scope, self.request_id) {
            debug!(
                scope = ?self.scope,
                request_id = self.request_id,
                name = entry.name(),
                "abandoned pending request"
            );
        }
    }
}

/// Which side handles a loopback call, seen from the handler.
fn loopback_origin(target: Peer) -> Peer {
    match target {
        Peer::Server => Peer::Client(ClientId::HOST),
        Peer::Client(_) => Peer::Server,
    }
}

/// A request being assembled. Nothing is sent until [`send`](Self::send).
#[must_use = "a request does nothing until `send` is awaited"]
pub struct OutboundRequest<'a> {
    node: &'a Node,
    namespace: &'a Namespace,
    target: Peer,
    name: String,
    writer: PayloadWriter,
    payload: Option<Bytes>,
    delivery: DeliveryMode,
    timeout: Option<Duration>,
}

impl<'a> OutboundRequest<'a> {
    fn new(node: &'a Node, namespace: &'a Namespace, target: Peer, name: String) -> Self {
        Self {
            node,
            namespace,
            target,
            name,
            writer: PayloadWriter::new(),
            payload: None,
            delivery: node.config().delivery,
            timeout: node.config().request_timeout,
        }
    }

    /// Writer for the request payload.
    pub fn writer(&mut self) -> &mut PayloadWriter {
        &mut self.writer
    }

    /// Uses `payload` as the request body instead of the writer contents.
    pub fn payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }

    /// Gives up after `timeout`, overriding the node default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Waits for the reply indefinitely, overriding the node default.
    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Sends the request and waits for its reply.
    ///
    /// Dropping the returned future withdraws the request; a reply that
    /// arrives afterwards is logged and discarded.
    pub async fn send(self) -> RequestResult {
        let Self {
            node,
            namespace,
            target,
            name,
            writer,
            payload,
            delivery,
            timeout,
        } = self;
        let payload = payload.unwrap_or_else(|| writer.freeze());

        let outcome = async {
            if node.is_loopback(target) {
                return node.request_local(target, namespace, &name, payload).await;
            }
            match target {
                Peer::Server => {
                    let table = namespace.to_server();
                    node.request_remote(table, (), target, namespace, &name, payload, delivery)
                        .await
                }
                Peer::Client(_) if !node.role().is_server() => Err(RequestError::NotServer),
                Peer::Client(client) => {
                    let table = namespace.to_clients();
                    node.request_remote(table, client, target, namespace, &name, payload, delivery)
                        .await
                }
            }
        };

        match timeout {
            Some(after) => tokio::time::timeout(after, outcome)
                .await
                .unwrap_or_else(|_| {
                    Err(RequestError::TimedOut {
                        namespace: namespace.identity().to_owned(),
                        name: name.clone(),
                        after,
                    })
                }),
            None => outcome.await,
        }
    }
}

enum PacketTarget {
    One(Peer),
    Many(Vec<ClientId>),
}

/// A one-shot packet being assembled. Nothing is sent until
/// [`send`](Self::send).
#[must_use = "a packet does nothing until `send` is called"]
pub struct OutboundPacket<'a> {
    node: &'a Node,
    namespace: &'a Namespace,
    target: PacketTarget,
    name: String,
    writer: PayloadWriter,
    payload: Option<Bytes>,
    delivery: DeliveryMode,
}

impl<'a> OutboundPacket<'a> {
    fn new(node: &'a Node, namespace: &'a Namespace, target: PacketTarget, name: String) -> Self {
        Self {
            node,
            namespace,
            target,
            name,
            writer: PayloadWriter::new(),
            payload: None,
            delivery: node.config().delivery,
        }
    }

    pub fn writer(&mut self) -> &mut PayloadWriter {
        &mut self.writer
    }

    pub fn payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn send(self) -> TransportResult<()> {
        let payload = self.payload.unwrap_or_else(|| self.writer.freeze());
        match self.target {
            PacketTarget::One(target) => {
                self.node
                    .send_packet(target, self.namespace, &self.name, payload, self.delivery)
            }
            PacketTarget::Many(clients) => self.node.broadcast_packet(
                &clients,
                self.namespace,
                &self.name,
                payload,
                self.delivery,
            ),
        }
    }
}

impl Node {
    /// Sends a request to the server and waits for the reply.
    pub async fn request_server(
        &self,
        namespace: &Namespace,
        name: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> RequestResult {
        self.server_request(namespace, name)
            .payload(payload)
            .send()
            .await
    }

    /// Sends a request to one client and waits for the reply. Server only.
    pub async fn request_client(
        &self,
        client: ClientId,
        namespace: &Namespace,
        name: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> RequestResult {
        self.client_request(client, namespace, name)
            .payload(payload)
            .send()
            .await
    }

    pub fn server_request<'a>(
        &'a self,
        namespace: &'a Namespace,
        name: impl Into<String>,
    ) -> OutboundRequest<'a> {
        OutboundRequest::new(self, namespace, Peer::Server, name.into())
    }

    pub fn client_request<'a>(
        &'a self,
        client: ClientId,
        namespace: &'a Namespace,
        name: impl Into<String>,
    ) -> OutboundRequest<'a> {
        OutboundRequest::new(self, namespace, Peer::Client(client), name.into())
    }

    /// Sends a one-shot packet to the server.
    pub fn send_to_server(
        &self,
        namespace: &Namespace,
        name: &str,
        payload: impl Into<Bytes>,
    ) -> TransportResult<()> {
        self.send_packet(Peer::Server, namespace, name, payload.into(), self.config().delivery)
    }

    /// Sends a one-shot packet to one client. Server only.
    pub fn send_to_client(
        &self,
        client: ClientId,
        namespace: &Namespace,
        name: &str,
        payload: impl Into<Bytes>,
    ) -> TransportResult<()> {
        self.send_packet(
            Peer::Client(client),
            namespace,
            name,
            payload.into(),
            self.config().delivery,
        )
    }

    /// Sends the same one-shot packet to several clients. Server only.
    ///
    /// A failed recipient does not stop delivery to the others.
    pub fn send_to_clients(
        &self,
        clients: &[ClientId],
        namespace: &Namespace,
        name: &str,
        payload: impl Into<Bytes>,
    ) -> TransportResult<()> {
        self.broadcast_packet(clients, namespace, name, payload.into(), self.config().delivery)
    }

    pub fn server_packet<'a>(
        &'a self,
        namespace: &'a Namespace,
        name: impl Into<String>,
    ) -> OutboundPacket<'a> {
        OutboundPacket::new(self, namespace, PacketTarget::One(Peer::Server), name.into())
    }

    pub fn client_packet<'a>(
        &'a self,
        client: ClientId,
        namespace: &'a Namespace,
        name: impl Into<String>,
    ) -> OutboundPacket<'a> {
        OutboundPacket::new(
            self,
            namespace,
            PacketTarget::One(Peer::Client(client)),
            name.into(),
        )
    }

    pub fn clients_packet<'a>(
        &'a self,
        clients: &[ClientId],
        namespace: &'a Namespace,
        name: impl Into<String>,
    ) -> OutboundPacket<'a> {
        OutboundPacket::new(
            self,
            namespace,
            PacketTarget::Many(clients.to_vec()),
            name.into(),
        )
    }

    /// True when traffic to `target` stays inside this process.
    fn is_loopback(&self, target: Peer) -> bool {
        self.role().is_server() && matches!(target, Peer::Server | Peer::Client(ClientId::HOST))
    }

    async fn request_local(
        &self,
        target: Peer,
        namespace: &Namespace,
        name: &str,
        payload: Bytes,
    ) -> RequestResult {
        let origin = loopback_origin(target);
        let identity = namespace.identity();
        let handler = match self.lookup_request(Direction::of_origin(origin), identity, name) {
            Lookup::Found(handler) => handler,
            Lookup::UnknownNamespace => {
                return Err(
                    RequestRejection::new(identity, name, Rejection::unknown_namespace()).into(),
                );
            }
            Lookup::UnknownHandler => {
                return Err(
                    RequestRejection::new(identity, name, Rejection::unknown_handler()).into(),
                );
            }
        };

        debug!(namespace = %identity, name, %target, "loopback request");
        let ctx = HandlerContext::new(identity, name, origin, None);
        match handler.call(ctx, payload).await {
            Ok(reply) => Ok(reply),
            Err(HandlerError::Rejected(message)) => Err(RequestRejection::new(
                identity,
                name,
                Rejection::CustomMessage(message),
            )
            .into()),
            Err(HandlerError::Fault(e)) => Err(RequestError::Handler(e)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn request_remote<S>(
        &self,
        table: &PendingTable<S>,
        scope: S,
        target: Peer,
        namespace: &Namespace,
        name: &str,
        payload: Bytes,
        delivery: DeliveryMode,
    ) -> RequestResult
    where
        S: Eq + Hash + Copy + Debug,
    {
        let request_id = table.allocate();
        let receiver = table.store(scope, request_id, name);
        let _guard = PendingGuard {
            table,
            scope,
            request_id,
        };

        let frame = RequestEnvelope {
            namespace: namespace.identity().to_owned(),
            name: name.to_owned(),
            request_id,
            payload,
        }
        .encode();
        self.transport().send_to_one(target, frame, delivery)?;
        debug!(namespace = %namespace.identity(), name, %target, request_id, "request sent");

        match receiver.await {
            Ok(result) => result,
            Err(_) => Err(RequestError::Disconnected),
        }
    }

    fn send_packet(
        &self,
        target: Peer,
        namespace: &Namespace,
        name: &str,
        payload: Bytes,
        delivery: DeliveryMode,
    ) -> TransportResult<()> {
        if self.is_loopback(target) {
            self.deliver_local(target, namespace.identity(), name, payload);
            return Ok(());
        }
        if !self.role().is_server() && matches!(target, Peer::Client(_)) {
            return Err(TransportError::Unroutable(target));
        }

        let frame = Envelope::new(namespace.identity(), name, payload).encode();
        self.transport().send_to_one(target, frame, delivery)
    }

    fn broadcast_packet(
        &self,
        clients: &[ClientId],
        namespace: &Namespace,
        name: &str,
        payload: Bytes,
        delivery: DeliveryMode,
    ) -> TransportResult<()> {
        if !self.role().is_server() {
            return Err(TransportError::Unroutable(Peer::Client(
                clients.first().copied().unwrap_or(ClientId::HOST),
            )));
        }

        let (local, remote): (Vec<ClientId>, Vec<ClientId>) =
            clients.iter().copied().partition(|client| client.is_host());
        if !local.is_empty() {
            let host = Peer::Client(ClientId::HOST);
            self.deliver_local(host, namespace.identity(), name, payload.clone());
        }
        if remote.is_empty() {
            return Ok(());
        }

        let frame = Envelope::new(namespace.identity(), name, payload).encode();
        self.transport().send_to_many(&remote, frame, delivery)
    }

    /// Runs a packet handler in-process. Routing failures are only logged.
    fn deliver_local(&self, target: Peer, namespace: &str, name: &str, payload: Bytes) {
        let origin = loopback_origin(target);
        let direction = Direction::of_origin(origin);
        let handler = match self.lookup_packet(direction, namespace, name) {
            Lookup::Found(handler) => handler,
            Lookup::UnknownNamespace => {
                warn!(namespace, name, "loopback packet for unknown namespace");
                return;
            }
            Lookup::UnknownHandler => {
                warn!(namespace, name, %direction, "no packet handler for loopback packet");
                return;
            }
        };

        let ctx = HandlerContext::new(namespace, name, origin, None);
        invoke_packet(handler.as_ref(), &ctx, payload);
    }
}
