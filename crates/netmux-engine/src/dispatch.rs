//! Inbound routing.
//!
//! [`Node::route`] decodes one frame and hands it to the matching handler or
//! pending request. Routing failures never reach handlers: unknown targets are
//! reported back to the sender and logged here.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use netmux_protocol::{
    BadPacketNotice, Envelope, FrameHeader, FrameKind, PayloadReader, ProtocolResult,
    RejectEnvelope, Rejection, RequestEnvelope, ResolveEnvelope,
};

use crate::error::{HandlerError, RequestError, RequestRejection};
use crate::handler::{Direction, HandlerContext, invoke_packet};
use crate::namespace::Namespace;
use crate::node::{Lookup, Node};
use crate::pending::PendingRequest;
use crate::transport::{ClientId, DeliveryMode, Peer, Transport};

/// Sends a reply frame back to `target`. Failures are logged.
fn reply(transport: &dyn Transport, target: Peer, frame: Bytes) {
    if let Err(e) = transport.send_to_one(target, frame, DeliveryMode::Reliable) {
        warn!(peer = %target, error = %e, "failed to send reply");
    }
}

fn take_pending(ns: &Namespace, origin: Peer, request_id: i32) -> Option<PendingRequest> {
    match origin {
        Peer::Server => ns.to_server().take((), request_id),
        Peer::Client(client) => ns.to_clients().take(client, request_id),
    }
}

impl Node {
    /// Routes one inbound frame received from `origin`.
    ///
    /// Must be called from within a tokio runtime; request handlers are
    /// spawned onto it. Returns an error only when the frame itself is
    /// malformed.
    pub fn route(&self, origin: Peer, frame: Bytes) -> ProtocolResult<()> {
        let mut reader = PayloadReader::new(frame);
        let header = FrameHeader::read_from(&mut reader)?;
        debug!(peer = %origin, kind = %header.kind, namespace = %header.namespace, "routing frame");

        match header.kind {
            FrameKind::Packet => {
                let envelope = Envelope::read_body(header.namespace, &mut reader)?;
                self.route_packet(origin, envelope);
            }
            FrameKind::Request => {
                let request = RequestEnvelope::read_body(header.namespace, &mut reader)?;
                self.route_request(origin, request);
            }
            FrameKind::Resolve => self.route_resolve(origin, header.namespace, &mut reader)?,
            FrameKind::Reject => self.route_reject(origin, header.namespace, &mut reader)?,
            FrameKind::BadPacket => {
                let notice = BadPacketNotice::read_body(header.namespace, &mut reader)?;
                warn!(peer = %origin, "{notice}");
            }
        }
        Ok(())
    }

    fn route_packet(&self, origin: Peer, envelope: Envelope) {
        let direction = Direction::of_origin(origin);
        let handler = match self.lookup_packet(direction, &envelope.namespace, &envelope.name) {
            Lookup::Found(handler) => handler,
            Lookup::UnknownNamespace => {
                warn!(peer = %origin, namespace = %envelope.namespace, "packet for unknown namespace");
                let notice = BadPacketNotice {
                    namespace: envelope.namespace,
                    name: None,
                };
                reply(self.transport().as_ref(), origin, notice.encode());
                return;
            }
            Lookup::UnknownHandler => {
                warn!(
                    peer = %origin,
                    namespace = %envelope.namespace,
                    name = %envelope.name,
                    %direction,
                    "no packet handler"
                );
                let notice = BadPacketNotice {
                    namespace: envelope.namespace,
                    name: Some(envelope.name),
                };
                reply(self.transport().as_ref(), origin, notice.encode());
                return;
            }
        };

        let ctx = HandlerContext::new(envelope.namespace, envelope.name, origin, None);
        invoke_packet(handler.as_ref(), &ctx, envelope.payload);
    }

    fn route_request(&self, origin: Peer, request: RequestEnvelope) {
        let direction = Direction::of_origin(origin);
        let RequestEnvelope {
            namespace,
            name,
            request_id,
            payload,
        } = request;

        let handler = match self.lookup_request(direction, &namespace, &name) {
            Lookup::Found(handler) => handler,
            Lookup::UnknownNamespace | Lookup::UnknownHandler => {
                let namespace_known = self.registry().contains(&namespace);
                warn!(
                    peer = %origin,
                    namespace = %namespace,
                    name = %name,
                    request_id,
                    namespace_known,
                    "no request handler"
                );
                let reject = RejectEnvelope {
                    namespace,
                    request_id,
                    rejection: Rejection::UnknownHandler { namespace_known },
                };
                reply(self.transport().as_ref(), origin, reject.encode());
                return;
            }
        };

        let transport = Arc::clone(self.transport());
        let ctx = HandlerContext::new(namespace.clone(), name.clone(), origin, Some(request_id));
        tokio::spawn(async move {
            // The inner task isolates handler panics so the requester still
            // gets an answer.
            let outcome = tokio::spawn(async move { handler.call(ctx, payload).await }).await;
            let frame = match outcome {
                Ok(Ok(payload)) => ResolveEnvelope {
                    namespace,
                    request_id,
                    payload,
                }
                .encode(),
                Ok(Err(HandlerError::Rejected(message))) => {
                    debug!(namespace = %namespace, name = %name, request_id, %message, "request rejected");
                    RejectEnvelope {
                        namespace,
                        request_id,
                        rejection: Rejection::CustomMessage(message),
                    }
                    .encode()
                }
                Ok(Err(HandlerError::Fault(e))) => {
                    error!(namespace = %namespace, name = %name, request_id, error = %e, "request handler failed");
                    RejectEnvelope {
                        namespace,
                        request_id,
                        rejection: Rejection::InternalFailure,
                    }
                    .encode()
                }
                Err(e) => {
                    error!(namespace = %namespace, name = %name, request_id, error = %e, "request handler panicked");
                    RejectEnvelope {
                        namespace,
                        request_id,
                        rejection: Rejection::InternalFailure,
                    }
                    .encode()
                }
            };
            reply(transport.as_ref(), origin, frame);
        });
    }

    fn route_resolve(
        &self,
        origin: Peer,
        namespace: String,
        reader: &mut PayloadReader,
    ) -> ProtocolResult<()> {
        let request_id = reader.read_i32()?;
        let Some(entry) = self.take_reply_target(origin, &namespace, request_id) else {
            return Ok(());
        };

        match reader.read_bytes() {
            Ok(payload) => {
                debug!(peer = %origin, namespace = %namespace, request_id, "request resolved");
                entry.complete(Ok(payload));
                Ok(())
            }
            Err(e) => {
                let name = entry.name().to_owned();
                entry.complete(Err(RequestError::MalformedReply {
                    namespace,
                    name,
                    reason: e.to_string(),
                }));
                Err(e)
            }
        }
    }

    fn route_reject(
        &self,
        origin: Peer,
        namespace: String,
        reader: &mut PayloadReader,
    ) -> ProtocolResult<()> {
        let request_id = reader.read_i32()?;
        let Some(entry) = self.take_reply_target(origin, &namespace, request_id) else {
            return Ok(());
        };

        let name = entry.name().to_owned();
        match Rejection::read_from(reader) {
            Ok(rejection) => {
                debug!(peer = %origin, namespace = %namespace, request_id, reason = %rejection.reason(), "request rejected by peer");
                entry.complete(Err(
                    RequestRejection::new(namespace, name, rejection).into()
                ));
                Ok(())
            }
            Err(e) => {
                entry.complete(Err(RequestError::MalformedReply {
                    namespace,
                    name,
                    reason: e.to_string(),
                }));
                Err(e)
            }
        }
    }

    /// Removes the pending entry a reply is addressed to.
    fn take_reply_target(
        &self,
        origin: Peer,
        namespace: &str,
        request_id: i32,
    ) -> Option<PendingRequest> {
        let Some(ns) = self.registry().get(namespace) else {
            warn!(peer = %origin, namespace = %namespace, request_id, "reply for unknown namespace");
            return None;
        };
        let entry = take_pending(&ns, origin, request_id);
        if entry.is_none() {
            warn!(peer = %origin, namespace = %namespace, request_id, "reply for unknown or completed request");
        }
        entry
    }

    /// Fails every request this node sent to `client`.
    ///
    /// Transports call this when a client connection closes.
    pub fn client_disconnected(&self, client: ClientId) -> usize {
        let failed: usize = self
            .registry()
            .namespaces()
            .iter()
            .map(|ns| ns.to_clients().fail_scope(client, || RequestError::Disconnected))
            .sum();
        if failed > 0 {
            info!(%client, failed, "failed pending requests of disconnected client");
        }
        failed
    }

    /// Fails every request this node sent to the server.
    pub fn server_disconnected(&self) -> usize {
        let failed: usize = self
            .registry()
            .namespaces()
            .iter()
            .map(|ns| ns.to_server().fail_scope((), || RequestError::Disconnected))
            .sum();
        if failed > 0 {
            info!(failed, "failed pending requests after losing the server");
        }
        failed
    }
}
