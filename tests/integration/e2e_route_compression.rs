//! The data-packet codec prefers a 2-byte dictionary code for a route over
//! its length-prefixed UTF-8 string, but correctness never depends on the
//! client having caught up with the latest dictionary: there's no push
//! protocol updating an already-handshaken client's route table, so a
//! client can keep working against a route it only knows by name.
//!
//! # Coverage
//! 1. A client connected before a service existed anywhere in the cluster
//!    still reaches it once a backend serving that route joins — its own
//!    dictionary is stale, so it necessarily falls back to the uncompressed
//!    wire form, and the request still succeeds.
//! 2. A client that connects after the service is already known gets the
//!    route's code in its handshake ack up front and the same request still
//!    succeeds — the compressed path and the uncompressed path are
//!    observably equivalent from the caller's side.
//! 3. A session's compressed flag is sticky: once its first packet latches
//!    it uncompressed, a gate-initiated Push sent after the cluster
//!    dictionary later learns a code for that route still goes out
//!    uncompressed, since this client's own frozen dictionary snapshot can
//!    never resolve a code it was never handed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use msg_connector::{Connector, HandshakeRequest};
use msg_node::ServiceBuilder;
use msg_test_support::{MockMaster, MockNode};

fn echo_service() -> msg_node::Service {
    ServiceBuilder::new("Echo").handler("Do", |_session, data| async move { Ok(Some(data)) }).build()
}

#[tokio::test]
async fn stale_and_fresh_client_dictionaries_both_reach_the_route() {
    let master = MockMaster::spawn().await.unwrap();
    let gate = MockNode::start_gate("gate-1", Some(&master.endpoint()), Vec::new()).await.unwrap();
    let gate_addr = gate.gate_addr.unwrap().to_string();

    // Connects before any backend exists: its handshake ack carries an empty
    // route dictionary, so every later message it sends for "Echo.Do" uses
    // the uncompressed, length-prefixed route form.
    let stale_conn = Connector::connect_tcp(&gate_addr, HandshakeRequest { version: None }).await.unwrap();

    let backend = MockNode::start_backend("backend-1", Some(&master.endpoint()), vec![echo_service()]).await.unwrap();

    let reply = stale_conn.request("Echo.Do", b"via-stale-dictionary".to_vec()).await.unwrap();
    assert_eq!(reply, b"via-stale-dictionary");

    // Connects after the backend has joined: its handshake ack already
    // carries "Echo.Do"'s code, so this client's requests use the
    // compressed route form from the start.
    let fresh_conn = Connector::connect_tcp(&gate_addr, HandshakeRequest { version: None }).await.unwrap();
    let reply = fresh_conn.request("Echo.Do", b"via-fresh-dictionary".to_vec()).await.unwrap();
    assert_eq!(reply, b"via-fresh-dictionary");

    stale_conn.close().await;
    fresh_conn.close().await;
    gate.shutdown();
    backend.shutdown();
}

#[tokio::test]
async fn sticky_compressed_flag_survives_the_dictionary_growing_past_a_stale_handshake() {
    let master = MockMaster::spawn().await.unwrap();
    let gate = MockNode::start_gate("gate-1", Some(&master.endpoint()), Vec::new()).await.unwrap();
    let gate_addr = gate.gate_addr.unwrap().to_string();

    // Handshakes before "Echo.Do" exists anywhere in the cluster, so its
    // first (and only) inbound packet is necessarily uncompressed, latching
    // this session's sticky flag false.
    let stale_conn = Connector::connect_tcp(&gate_addr, HandshakeRequest { version: None }).await.unwrap();
    let backend = MockNode::start_backend("backend-1", Some(&master.endpoint()), vec![echo_service()]).await.unwrap();
    stale_conn.request("Echo.Do", b"warm-up".to_vec()).await.unwrap();

    // The gate's dictionary now has a code for "Echo.Do", learned from the
    // backend's join broadcast -- a route this client's own frozen handshake
    // snapshot predates and can never resolve.
    let session = gate.node.session(1).await.expect("stale client's session tracked on the gate");
    assert!(!session.is_compressed(), "first packet was uncompressed; flag must latch false for the session's lifetime");

    let seen = Arc::new(AtomicUsize::new(0));
    let seen_cb = seen.clone();
    stale_conn.on("Echo.Do", move |data| {
        assert_eq!(data, b"pushed-after-dictionary-grew");
        seen_cb.fetch_add(1, Ordering::SeqCst);
    });

    session.push("Echo.Do", b"pushed-after-dictionary-grew".to_vec()).unwrap();
    for _ in 0..50 {
        if seen.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(seen.load(Ordering::SeqCst), 1, "stale client must still decode a push sent after the dictionary grew");

    stale_conn.close().await;
    gate.shutdown();
    backend.shutdown();
}
