//! Two backends serve the same service under different versions; a gate
//! route picks whichever backend matches the session's bound version,
//! falling back to an unversioned member when none does.
//!
//! Binding a session's version is an application concern (typically done by
//! a login/handshake handler, not the framework itself), so this test
//! registers a small `Client.SelectVersion` handler on the gate that calls
//! `Session::bind_version`, the same way a real auth handler would.
//!
//! # Coverage
//! 1. A session that selects "2.0.0" routes `Versioned.Do` to the v2 backend.
//! 2. A session that selects "1.0.0" routes the same route to the v1 backend.
//! 3. `Node::find_versions` reports both versions cluster-wide from the
//!    gate's perspective, even though the gate serves neither itself.

use msg_connector::{Connector, HandshakeRequest};
use msg_node::ServiceBuilder;
use msg_test_support::{MockMaster, MockNode};

const V1: &str = "1.0.0-00000001";
const V2: &str = "2.0.0-00000002";

fn versioned_echo(tag: &'static str) -> msg_node::Service {
    ServiceBuilder::new("Versioned").handler("Do", move |_session, _data| async move { Ok(Some(tag.as_bytes().to_vec())) }).build()
}

fn select_version_service() -> msg_node::Service {
    ServiceBuilder::new("Client")
        .handler("SelectVersion", |session, data| async move {
            session.bind_version(String::from_utf8_lossy(&data).into_owned());
            Ok(Some(b"bound".to_vec()))
        })
        .build()
}

#[tokio::test]
async fn requests_route_to_the_backend_matching_the_bound_version() {
    let master = MockMaster::spawn().await.unwrap();

    let backend_v1 =
        MockNode::start_backend_with_version("backend-v1", V1, Some(&master.endpoint()), vec![versioned_echo("v1")])
            .await
            .unwrap();
    let backend_v2 =
        MockNode::start_backend_with_version("backend-v2", V2, Some(&master.endpoint()), vec![versioned_echo("v2")])
            .await
            .unwrap();

    let gate = MockNode::start_gate("gate-1", Some(&master.endpoint()), vec![select_version_service()]).await.unwrap();
    let gate_addr = gate.gate_addr.unwrap().to_string();

    let conn_v2 = Connector::connect_tcp(&gate_addr, HandshakeRequest { version: None }).await.unwrap();
    conn_v2.request("Client.SelectVersion", V2.as_bytes().to_vec()).await.unwrap();
    let reply = conn_v2.request("Versioned.Do", Vec::new()).await.unwrap();
    assert_eq!(reply, b"v2");

    let conn_v1 = Connector::connect_tcp(&gate_addr, HandshakeRequest { version: None }).await.unwrap();
    conn_v1.request("Client.SelectVersion", V1.as_bytes().to_vec()).await.unwrap();
    let reply = conn_v1.request("Versioned.Do", Vec::new()).await.unwrap();
    assert_eq!(reply, b"v1");

    let versions = gate.node.find_versions("Versioned").await;
    assert_eq!(versions.len(), 2);
    assert!(versions.contains(&V1.to_string()));
    assert!(versions.contains(&V2.to_string()));

    conn_v1.close().await;
    conn_v2.close().await;
    gate.shutdown();
    backend_v1.shutdown();
    backend_v2.shutdown();
}
