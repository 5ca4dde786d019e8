//! End-to-end behavior over the in-memory transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use netmux_engine::{
    ClientId, HandlerError, MemoryHub, NamespaceRegistry, Node, NodeConfig, Rejection,
    RequestError,
};
use tokio::sync::Notify;

fn hub() -> MemoryHub {
    MemoryHub::new(Arc::new(NamespaceRegistry::new()), NodeConfig::default())
}

fn connect(hub: &MemoryHub) -> (ClientId, Arc<Node>) {
    hub.connect(Arc::new(NamespaceRegistry::new()), NodeConfig::default())
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn echo_round_trip() {
    let hub = hub();
    hub.server()
        .register("pkg.a")
        .on_client_request("ping", |_, payload| async move { Ok(payload) });

    let (_, client) = connect(&hub);
    let ns = client.register("pkg.a");

    let reply = client
        .request_server(&ns, "ping", vec![0x01u8, 0x02])
        .await
        .unwrap();
    assert_eq!(&reply[..], &[0x01, 0x02]);
    assert_eq!(ns.pending_requests(), 0);
}

#[tokio::test]
async fn unknown_namespace_is_reported_as_such() {
    let hub = hub();
    let (_, client) = connect(&hub);
    let ns = client.register("pkg.missing");

    let error = client
        .request_server(&ns, "ping", Bytes::new())
        .await
        .unwrap_err();
    assert_eq!(
        error.rejection(),
        Some(&Rejection::UnknownHandler {
            namespace_known: false
        })
    );
    assert_eq!(error.to_string(), "unknown namespace `pkg.missing`");
}

#[tokio::test]
async fn unknown_handler_in_known_namespace() {
    let hub = hub();
    hub.server().register("pkg.a");
    let (_, client) = connect(&hub);
    let ns = client.register("pkg.a");

    let error = client
        .request_server(&ns, "ping", Bytes::new())
        .await
        .unwrap_err();
    assert_eq!(
        error.rejection(),
        Some(&Rejection::UnknownHandler {
            namespace_known: true
        })
    );
    assert_eq!(
        error.to_string(),
        "namespace `pkg.a` has no request handler `ping`"
    );
}

#[tokio::test]
async fn custom_rejection_message_is_exact() {
    let hub = hub();
    hub.server()
        .register("pkg.a")
        .on_client_request("ping", |_, _| async {
            Err(HandlerError::reject("not ready"))
        });
    let (_, client) = connect(&hub);
    let ns = client.register("pkg.a");

    let error = client
        .request_server(&ns, "ping", Bytes::new())
        .await
        .unwrap_err();
    assert_eq!(error.to_string(), "not ready");
}

#[tokio::test]
async fn remote_fault_is_opaque() {
    let hub = hub();
    hub.server()
        .register("pkg.a")
        .on_client_request("broken", |_, _| async {
            Err(HandlerError::fault("connection string leaked"))
        });
    let (_, client) = connect(&hub);
    let ns = client.register("pkg.a");

    let error = client
        .request_server(&ns, "broken", Bytes::new())
        .await
        .unwrap_err();
    assert_eq!(error.rejection(), Some(&Rejection::InternalFailure));
    assert!(!error.to_string().contains("leaked"));
}

#[tokio::test]
async fn server_requests_a_client() {
    let hub = hub();
    let (id, client) = connect(&hub);
    client
        .register("pkg.a")
        .on_server_request("version", |ctx, _| async move {
            assert_eq!(ctx.origin, netmux_engine::Peer::Server);
            Ok(Bytes::from_static(b"1.0"))
        });

    let ns = hub.server().register("pkg.a");
    let reply = hub
        .server()
        .request_client(id, &ns, "version", Bytes::new())
        .await
        .unwrap();
    assert_eq!(&reply[..], b"1.0");
}

#[tokio::test]
async fn concurrent_requests_are_correlated() {
    let hub = hub();
    hub.server()
        .register("pkg.a")
        .on_client_request_with("double", |_, mut reader| async move {
            let value = reader.read_i32()?;
            tokio::time::sleep(Duration::from_millis((10 - value as u64 % 10) * 2)).await;
            let mut writer = netmux_engine::PayloadWriter::new();
            writer.write_i32(value * 2);
            Ok(writer)
        });
    let (_, client) = connect(&hub);
    let ns = client.register("pkg.a");

    let calls = (0..10).map(|value| {
        let client = Arc::clone(&client);
        let ns = Arc::clone(&ns);
        tokio::spawn(async move {
            let mut request = client.server_request(&ns, "double");
            request.writer().write_i32(value);
            let reply = request.send().await.unwrap();
            (value, netmux_engine::PayloadReader::new(reply).read_i32().unwrap())
        })
    });

    for call in calls.collect::<Vec<_>>() {
        let (value, doubled) = call.await.unwrap();
        assert_eq!(doubled, value * 2);
    }
    assert_eq!(ns.pending_requests(), 0);
}

#[tokio::test]
async fn broadcast_survives_a_failing_handler() {
    let hub = hub();
    let delivered = Arc::new(AtomicUsize::new(0));

    let mut ids = Vec::new();
    let mut clients = Vec::new();
    for index in 0..3 {
        let (id, client) = connect(&hub);
        let counter = Arc::clone(&delivered);
        client
            .register("pkg.a")
            .on_server_packet("announce", move |_, _| {
                if index == 1 {
                    return Err(HandlerError::fault("recipient broke"));
                }
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        ids.push(id);
        clients.push(client);
    }

    let ns = hub.server().register("pkg.a");
    hub.server()
        .send_to_clients(&ids, &ns, "announce", Bytes::from_static(b"hello"))
        .unwrap();

    eventually(|| delivered.load(Ordering::SeqCst) == 2).await;
}

#[tokio::test]
async fn broadcast_reaches_remote_clients_when_host_handler_panics() {
    let hub = hub();
    let ns = hub.server().register("pkg.a");
    ns.on_server_packet("announce", |_, _| -> Result<(), HandlerError> {
        panic!("host handler bug")
    });

    let delivered = Arc::new(AtomicUsize::new(0));
    let mut ids = vec![ClientId::HOST];
    let mut clients = Vec::new();
    for _ in 0..2 {
        let (id, client) = connect(&hub);
        let counter = Arc::clone(&delivered);
        client
            .register("pkg.a")
            .on_server_packet("announce", move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        ids.push(id);
        clients.push(client);
    }

    hub.server()
        .send_to_clients(&ids, &ns, "announce", Bytes::from_static(b"hello"))
        .unwrap();

    eventually(|| delivered.load(Ordering::SeqCst) == 2).await;
}

#[tokio::test]
async fn packet_to_unknown_handler_does_not_disturb_requests() {
    let hub = hub();
    let ns = hub.server().register("pkg.a");
    ns.on_client_request("ping", |_, payload| async move { Ok(payload) });

    let (_, client) = connect(&hub);
    let client_ns = client.register("pkg.a");
    client.send_to_server(&client_ns, "nobody", Bytes::new()).unwrap();

    let reply = client
        .request_server(&client_ns, "ping", Bytes::from_static(b"ok"))
        .await
        .unwrap();
    assert_eq!(&reply[..], b"ok");
}

#[tokio::test]
async fn disconnect_fails_outstanding_requests() {
    let hub = hub();
    let started = Arc::new(Notify::new());
    let (id, client) = connect(&hub);
    let signal = Arc::clone(&started);
    client
        .register("pkg.a")
        .on_server_request("hang", move |_, _| {
            let signal = Arc::clone(&signal);
            async move {
                signal.notify_one();
                std::future::pending::<Result<Bytes, HandlerError>>().await
            }
        });

    let ns = hub.server().register("pkg.a");
    let server = Arc::clone(hub.server());
    let waiting = {
        let ns = Arc::clone(&ns);
        tokio::spawn(async move { server.request_client(id, &ns, "hang", Bytes::new()).await })
    };

    started.notified().await;
    assert_eq!(ns.pending_requests(), 1);
    assert!(hub.disconnect(id));

    let result = waiting.await.unwrap();
    assert!(matches!(result, Err(RequestError::Disconnected)));
    assert_eq!(ns.pending_requests(), 0);
}

#[tokio::test]
async fn configured_timeout_applies_to_remote_requests() {
    let hub = hub();
    hub.server()
        .register("pkg.a")
        .on_client_request("slow", |_, _| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Bytes::new())
        });

    let (_, client) = hub.connect(
        Arc::new(NamespaceRegistry::new()),
        NodeConfig::default().with_request_timeout(Duration::from_millis(20)),
    );
    let ns = client.register("pkg.a");

    let error = client
        .request_server(&ns, "slow", Bytes::new())
        .await
        .unwrap_err();
    assert!(matches!(error, RequestError::TimedOut { .. }));
    assert_eq!(ns.pending_requests(), 0);
}
