//! A gate with no local services, a backend owning `Echo`, and a master
//! tying them together: a client's request has to cross two processes and a
//! gRPC hop to get answered.
//!
//! # Coverage
//! 1. A backend registers with the master and is handed back an (empty)
//!    member snapshot.
//! 2. A gate registering afterward learns about the backend from its own
//!    registration response, and the backend learns about the gate via the
//!    master's broadcast to already-registered members.
//! 3. A client request for a route the gate doesn't serve locally is
//!    forwarded over the `Member` gRPC service to the backend and the
//!    response makes the full round trip back to the client.
//! 4. A `Notify` is forwarded the same way and produces no response.

use msg_connector::{Connector, HandshakeRequest};
use msg_node::ServiceBuilder;
use msg_test_support::{MockMaster, MockNode};

#[tokio::test]
async fn request_crosses_gate_and_backend_via_master_membership() {
    let master = MockMaster::spawn().await.unwrap();

    let echo = ServiceBuilder::new("Echo").handler("Do", |_session, data| async move { Ok(Some(data)) }).build();
    let backend = MockNode::start_backend("backend-1", Some(&master.endpoint()), vec![echo]).await.unwrap();

    let gate = MockNode::start_gate("gate-1", Some(&master.endpoint()), Vec::new()).await.unwrap();

    assert_eq!(master.registry.snapshot().await.len(), 2);

    let conn = Connector::connect_tcp(&gate.gate_addr.unwrap().to_string(), HandshakeRequest { version: None }).await.unwrap();
    let reply = conn.request("Echo.Do", b"hello-from-the-other-side".to_vec()).await.unwrap();
    assert_eq!(reply, b"hello-from-the-other-side");

    conn.notify("Echo.Do", b"fire-and-forget".to_vec()).await.unwrap();

    conn.close().await;
    gate.shutdown();
    backend.shutdown();
}
