//! Built-in diagnostic namespace.
//!
//! Every server exposes [`DIAG_NAMESPACE`] so clients can check liveness and
//! inspect what the server hosts without registering anything themselves.
//!
//! | name         | kind    | behavior                                   |
//! |--------------|---------|--------------------------------------------|
//! | `ping`       | request | replies `pong`                             |
//! | `echo`       | request | replies with the request payload           |
//! | `namespaces` | request | replies with the sorted namespace list     |
//! | `log`        | packet  | logs the UTF-8 payload at info level       |

use std::sync::{Arc, Weak};

use bytes::Bytes;
use tracing::info;

use netmux_core::{DIAG_NAMESPACE, PONG};
use netmux_engine::{HandlerError, Namespace, NamespaceRegistry, PayloadWriter};

/// Registers the diagnostic namespace on `registry`.
pub fn register_diagnostics(registry: &Arc<NamespaceRegistry>) -> Arc<Namespace> {
    let namespace = registry.register(DIAG_NAMESPACE);
    let registry: Weak<NamespaceRegistry> = Arc::downgrade(registry);

    namespace
        .on_client_request("ping", |_, _| async { Ok(Bytes::from_static(PONG)) })
        .on_client_request("echo", |_, payload| async move { Ok(payload) })
        .on_client_request_with("namespaces", move |_, _| {
            let registry = registry.upgrade();
            async move {
                let registry =
                    registry.ok_or_else(|| HandlerError::fault("namespace registry dropped"))?;
                let identities = registry.identities();
                let mut writer = PayloadWriter::new();
                writer.write_i32(identities.len() as i32);
                for identity in &identities {
                    writer.write_str(identity);
                }
                Ok(writer)
            }
        })
        .on_client_packet("log", |ctx, payload| {
            let message = String::from_utf8_lossy(&payload);
            info!(client = %ctx.origin, message = %message, "client log");
            Ok(())
        });

    namespace
}
