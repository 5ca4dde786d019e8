//! Handler registry for dispatching packets and requests by name.
//!
//! Every namespace owns one registry. Entries are keyed by direction, kind and
//! handler name:
//!
//! - direction: [`Direction::FromServer`] handlers run on clients and receive
//!   server traffic, [`Direction::FromClient`] handlers run on the server;
//! - kind: packets (no reply) or requests (exactly one reply).
//!
//! Raw handlers see the payload as [`Bytes`]. Structured handlers get a
//! [`PayloadReader`] and answer requests with a [`PayloadWriter`]; they are
//! thin adapters over the raw form and dispatch identically.
//!
//! # Example
//!
//! ```ignore
//! use netmux_engine::{Direction, HandlerError, HandlerRegistry};
//!
//! let registry = HandlerRegistry::new();
//!
//! registry.register_request(Direction::FromClient, "echo", |_ctx, payload| async move {
//!     Ok(payload)
//! });
//! registry.register_packet(Direction::FromServer, "tick", |ctx, _payload| {
//!     tracing::info!(origin = %ctx.origin, "tick");
//!     Ok(())
//! });
//! ```

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt};
use tracing::{debug, error, warn};

use netmux_protocol::{PayloadReader, PayloadWriter};

use crate::error::HandlerError;
use crate::transport::Peer;

/// Which side originated the traffic a handler receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Sent by the server, handled by a client.
    FromServer,
    /// Sent by a client, handled by the server.
    FromClient,
}

impl Direction {
    /// Direction of traffic that arrived from `origin`.
    pub fn of_origin(origin: Peer) -> Self {
        match origin {
            Peer::Server => Self::FromServer,
            Peer::Client(_) => Self::FromClient,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FromServer => f.write_str("from-server"),
            Self::FromClient => f.write_str("from-client"),
        }
    }
}

/// What a handler knows about the message it is handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerContext {
    pub namespace: String,
    pub name: String,
    /// Who sent the message.
    pub origin: Peer,
    /// Wire request id; `None` for packets and loopback requests.
    pub request_id: Option<i32>,
}

impl HandlerContext {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        origin: Peer,
        request_id: Option<i32>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            origin,
            request_id,
        }
    }
}

/// Future returned by request handlers.
pub type RequestFuture = BoxFuture<'static, Result<Bytes, HandlerError>>;

/// A one-shot packet handler.
pub trait PacketHandler: Send + Sync + 'static {
    fn call(&self, ctx: &HandlerContext, payload: Bytes) -> Result<(), HandlerError>;
}

/// A request handler. The returned future may suspend.
pub trait RequestHandler: Send + Sync + 'static {
    fn call(&self, ctx: HandlerContext, payload: Bytes) -> RequestFuture;
}

/// Runs a packet handler, logging its failure.
///
/// A panic stays inside this call: the frame is dropped and the caller keeps
/// delivering to whoever comes next.
pub(crate) fn invoke_packet(handler: &dyn PacketHandler, ctx: &HandlerContext, payload: Bytes) {
    match catch_unwind(AssertUnwindSafe(|| handler.call(ctx, payload))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(
            peer = %ctx.origin,
            namespace = %ctx.namespace,
            name = %ctx.name,
            error = %e,
            "packet handler failed"
        ),
        Err(panic) => error!(
            peer = %ctx.origin,
            namespace = %ctx.namespace,
            name = %ctx.name,
            reason = panic_message(panic.as_ref()),
            "packet handler panicked"
        ),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

struct RawPacket<F>(F);

impl<F> PacketHandler for RawPacket<F>
where
    F: Fn(&HandlerContext, Bytes) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    fn call(&self, ctx: &HandlerContext, payload: Bytes) -> Result<(), HandlerError> {
        (self.0)(ctx, payload)
    }
}

struct StructuredPacket<F>(F);

impl<F> PacketHandler for StructuredPacket<F>
where
    F: Fn(&HandlerContext, &mut PayloadReader) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    fn call(&self, ctx: &HandlerContext, payload: Bytes) -> Result<(), HandlerError> {
        let mut reader = PayloadReader::new(payload);
        (self.0)(ctx, &mut reader)
    }
}

struct RawRequest<F, Fut> {
    handler: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> RequestHandler for RawRequest<F, Fut>
where
    F: Fn(HandlerContext, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes, HandlerError>> + Send + 'static,
{
    fn call(&self, ctx: HandlerContext, payload: Bytes) -> RequestFuture {
        (self.handler)(ctx, payload).boxed()
    }
}

struct StructuredRequest<F, Fut> {
    handler: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> RequestHandler for StructuredRequest<F, Fut>
where
    F: Fn(HandlerContext, PayloadReader) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<PayloadWriter, HandlerError>> + Send + 'static,
{
    fn call(&self, ctx: HandlerContext, payload: Bytes) -> RequestFuture {
        (self.handler)(ctx, PayloadReader::new(payload))
            .map(|result| result.map(PayloadWriter::freeze))
            .boxed()
    }
}

/// Handlers of one kind, split by direction.
struct Directional<H: ?Sized> {
    from_server: DashMap<String, Arc<H>>,
    from_client: DashMap<String, Arc<H>>,
}

impl<H: ?Sized> Default for Directional<H> {
    fn default() -> Self {
        Self {
            from_server: DashMap::new(),
            from_client: DashMap::new(),
        }
    }
}

impl<H: ?Sized> Directional<H> {
    fn side(&self, direction: Direction) -> &DashMap<String, Arc<H>> {
        match direction {
            Direction::FromServer => &self.from_server,
            Direction::FromClient => &self.from_client,
        }
    }

    fn insert(&self, direction: Direction, name: String, handler: Arc<H>) -> bool {
        self.side(direction).insert(name, handler).is_some()
    }

    fn get(&self, direction: Direction, name: &str) -> Option<Arc<H>> {
        self.side(direction)
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn names(&self, direction: Direction) -> Vec<String> {
        let mut names: Vec<String> = self
            .side(direction)
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}

/// Registry mapping handler names to handlers, per direction and kind.
///
/// Registering a name twice replaces the earlier handler. Handlers are never
/// removed.
#[derive(Default)]
pub struct HandlerRegistry {
    packets: Directional<dyn PacketHandler>,
    requests: Directional<dyn RequestHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a raw packet handler.
    pub fn register_packet<F>(&self, direction: Direction, name: impl Into<String>, handler: F)
    where
        F: Fn(&HandlerContext, Bytes) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.insert_packet(direction, name.into(), Arc::new(RawPacket(handler)));
    }

    /// Registers a packet handler that reads its payload through a cursor.
    pub fn register_packet_with<F>(&self, direction: Direction, name: impl Into<String>, handler: F)
    where
        F: Fn(&HandlerContext, &mut PayloadReader) -> Result<(), HandlerError>
            + Send
            + Sync
            + 'static,
    {
        self.insert_packet(direction, name.into(), Arc::new(StructuredPacket(handler)));
    }

    /// Registers a raw request handler.
    pub fn register_request<F, Fut>(&self, direction: Direction, name: impl Into<String>, handler: F)
    where
        F: Fn(HandlerContext, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Bytes, HandlerError>> + Send + 'static,
    {
        let handler = RawRequest {
            handler,
            _phantom: PhantomData,
        };
        self.insert_request(direction, name.into(), Arc::new(handler));
    }

    /// Registers a request handler that reads through a cursor and answers
    /// with a writer.
    pub fn register_request_with<F, Fut>(
        &self,
        direction: Direction,
        name: impl Into<String>,
        handler: F,
    ) where
        F: Fn(HandlerContext, PayloadReader) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<PayloadWriter, HandlerError>> + Send + 'static,
    {
        let handler = StructuredRequest {
            handler,
            _phantom: PhantomData,
        };
        self.insert_request(direction, name.into(), Arc::new(handler));
    }

    fn insert_packet(&self, direction: Direction, name: String, handler: Arc<dyn PacketHandler>) {
        if self.packets.insert(direction, name.clone(), handler) {
            debug!(%direction, name = %name, "replaced packet handler");
        }
    }

    fn insert_request(&self, direction: Direction, name: String, handler: Arc<dyn RequestHandler>) {
        if self.requests.insert(direction, name.clone(), handler) {
            debug!(%direction, name = %name, "replaced request handler");
        }
    }

    /// Looks up a packet handler. Absence is a normal outcome.
    pub fn resolve_packet(&self, direction: Direction, name: &str) -> Option<Arc<dyn PacketHandler>> {
        self.packets.get(direction, name)
    }

    /// Looks up a request handler. Absence is a normal outcome.
    pub fn resolve_request(
        &self,
        direction: Direction,
        name: &str,
    ) -> Option<Arc<dyn RequestHandler>> {
        self.requests.get(direction, name)
    }

    /// Sorted packet handler names for one direction.
    pub fn packet_names(&self, direction: Direction) -> Vec<String> {
        self.packets.names(direction)
    }

    /// Sorted request handler names for one direction.
    pub fn request_names(&self, direction: Direction) -> Vec<String> {
        self.requests.names(direction)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("server_packets", &self.packet_names(Direction::FromServer))
            .field("client_packets", &self.packet_names(Direction::FromClient))
            .field("server_requests", &self.request_names(Direction::FromServer))
            .field("client_requests", &self.request_names(Direction::FromClient))
            .finish()
    }
}
