//! A single gate with no master and no backend: the simplest possible
//! deployment, where the gate itself serves the one route a client calls.
//!
//! # Coverage
//! 1. A client completes the wire handshake against a raw TCP gate listener.
//! 2. A `Request` round trips through the gate's own `LocalHandler` and back
//!    as a paired `Response`.
//! 3. A fire-and-forget `Notify` is accepted without a response.
//! 4. A `Push` sent from inside a handler reaches the client's registered
//!    route callback.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use msg_connector::{Connector, HandshakeRequest};
use msg_node::ServiceBuilder;
use msg_runtime::Session;
use msg_test_support::MockNode;

fn echo_service() -> msg_node::Service {
    ServiceBuilder::new("Ping")
        .handler("Pong", |session: Arc<Session>, data: Vec<u8>| async move {
            session.push("Ping.Announce", b"pong-incoming".to_vec()).ok();
            Ok(Some(data))
        })
        .handler("Shout", |_session, _data| async move { Ok(None) })
        .build()
}

#[tokio::test]
async fn request_response_round_trip_through_a_standalone_gate() {
    let gate = MockNode::start_gate("gate-1", None, vec![echo_service()]).await.unwrap();
    let conn = Connector::connect_tcp(&gate.gate_addr.unwrap().to_string(), HandshakeRequest { version: None }).await.unwrap();

    let reply = conn.request("Ping.Pong", b"ping".to_vec()).await.unwrap();
    assert_eq!(reply, b"ping");

    conn.close().await;
    gate.shutdown();
}

#[tokio::test]
async fn notify_is_fire_and_forget_and_push_reaches_the_client() {
    let gate = MockNode::start_gate("gate-1", None, vec![echo_service()]).await.unwrap();
    let conn = Connector::connect_tcp(&gate.gate_addr.unwrap().to_string(), HandshakeRequest { version: None }).await.unwrap();

    let pushes_seen = Arc::new(AtomicUsize::new(0));
    let seen = pushes_seen.clone();
    conn.on("Ping.Announce", move |data| {
        assert_eq!(data, b"pong-incoming");
        seen.fetch_add(1, Ordering::SeqCst);
    });

    conn.notify("Ping.Shout", b"anyone there".to_vec()).await.unwrap();
    // The handler's push only fires on `Pong`, so trigger that too.
    conn.request("Ping.Pong", Vec::new()).await.unwrap();

    for _ in 0..50 {
        if pushes_seen.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(pushes_seen.load(Ordering::SeqCst), 1);

    conn.close().await;
    gate.shutdown();
}
