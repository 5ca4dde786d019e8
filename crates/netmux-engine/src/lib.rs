//! Name-addressed packet multiplexer and request correlation.
//!
//! This crate sits between a byte transport and application handlers:
//! - namespaces group handlers under an identity string
//! - one-shot packets are dispatched by `(namespace, name)`
//! - requests are correlated with their single reply through pending tables
//! - unknown targets and failing handlers are answered with a rejection
//! - a server talking to itself, or to its hosted client, skips the wire
//!
//! Transports plug in through the [`Transport`] trait and feed inbound frames
//! to [`Node::route`]. [`MemoryHub`] is an in-process transport; stream
//! transports share the outbound queue helpers in [`stream`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use netmux_engine::{MemoryHub, NamespaceRegistry, NodeConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let hub = MemoryHub::new(Arc::new(NamespaceRegistry::new()), NodeConfig::default());
//! hub.server()
//!     .register("pkg.a")
//!     .on_client_request("ping", |_, payload| async move { Ok(payload) });
//!
//! let (_id, client) = hub.connect(Arc::new(NamespaceRegistry::new()), NodeConfig::default());
//! let ns = client.register("pkg.a");
//! let reply = client.request_server(&ns, "ping", vec![1u8, 2]).await.unwrap();
//! assert_eq!(&reply[..], &[1, 2]);
//! # }
//! ```

mod dispatch;
mod error;
mod handler;
mod memory;
mod namespace;
mod node;
mod pending;
mod request;
pub mod stream;
mod transport;

pub use error::{BoxError, HandlerError, RequestError, RequestRejection, RequestResult};
pub use handler::{
    Direction, HandlerContext, HandlerRegistry, PacketHandler, RequestFuture, RequestHandler,
};
pub use memory::MemoryHub;
pub use namespace::{Namespace, NamespaceRegistry};
pub use node::{Node, NodeConfig, Role};
pub use pending::{PendingRequest, PendingTable};
pub use request::{OutboundPacket, OutboundRequest};
pub use transport::{ClientId, DeliveryMode, Peer, Transport, TransportError, TransportResult};

pub use netmux_protocol::{PayloadReader, PayloadWriter, Rejection};
