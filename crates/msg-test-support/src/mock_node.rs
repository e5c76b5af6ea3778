//! An in-process gate or backend: a `Node`/`LocalHandler` pair wired to a
//! `Member` gRPC service on a random port, and — for a gate — a raw TCP
//! listener performing the handshake and dispatching framed packets.
//! Grounded on `crates/rt-test-utils::mock_ws_server`'s bind-random-port
//! shape; the handshake/dispatch loop is grounded on
//! `msg-node::agent::run_read_loop` and `msg-node::http_bridge`'s per-
//! connection decode loop, adapted for a raw (non-WS) socket. Master
//! registration mirrors `services/gate`'s and `services/backend`'s
//! `main.rs`: register, seed the snapshot into the local handler, then
//! keep serving so later joiners are picked up via the master's broadcast.

use std::net::SocketAddr;
use std::sync::Arc;

use msg_cluster::proto::member_server::MemberServer;
use msg_cluster::{MemberService, MembershipObserver as _};
use msg_node::node::now_unix_secs;
use msg_node::{Agent, LocalHandler, Node, NodeConfig, Service};
use msg_runtime::{GlobalScheduler, Pipeline};
use msg_wire::codec::{self, Decoder, Packet, PacketType};
use msg_wire::{handshake, RouteDictionary};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

/// A running gate or backend: its `Node`, a live `Member` gRPC service, and
/// — if built via [`MockNode::start_gate`] — a raw TCP listener accepting
/// client connections.
pub struct MockNode {
    pub node: Arc<Node>,
    pub member_addr: SocketAddr,
    pub gate_addr: Option<SocketAddr>,
    member_server: JoinHandle<()>,
    gate_listener: Option<JoinHandle<()>>,
}

impl MockNode {
    /// A backend: only the `Member` gRPC service, no client-facing listener.
    /// `services` are registered on the `LocalHandler` before traffic
    /// starts, matching the "register before serving" contract. `master_addr`
    /// mirrors `services/backend/src/main.rs`'s registration step when set.
    pub async fn start_backend(label: &str, master_addr: Option<&str>, services: Vec<Service>) -> std::io::Result<Self> {
        Self::start_backend_with_version(label, "", master_addr, services).await
    }

    /// Like [`MockNode::start_backend`], but with an explicit cluster
    /// version (the string advertised in `NodeConfig::version`, from which
    /// `msg_wire::short_version` derives the routing key). Needed for tests
    /// exercising version-based member selection.
    pub async fn start_backend_with_version(
        label: &str,
        version: &str,
        master_addr: Option<&str>,
        services: Vec<Service>,
    ) -> std::io::Result<Self> {
        let (node, member_addr, member_server) = Self::spawn_member_service(label, version, master_addr, services).await?;
        Ok(MockNode { node, member_addr, gate_addr: None, member_server, gate_listener: None })
    }

    /// A gate: the `Member` gRPC service plus a raw TCP listener. Gates
    /// typically carry no local services of their own (`services` is usually
    /// empty), matching `services/gate`'s "every route lives on a backend"
    /// shape, but the parameter is left open for tests that want a gate to
    /// serve a route locally (the singleton, no-cluster case).
    pub async fn start_gate(label: &str, master_addr: Option<&str>, services: Vec<Service>) -> std::io::Result<Self> {
        let (node, member_addr, member_server) = Self::spawn_member_service(label, "", master_addr, services).await?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let gate_addr = listener.local_addr()?;
        let accept_node = node.clone();
        let gate_listener = tokio::spawn(async move {
            loop {
                let (stream, remote) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "mock gate accept loop stopped");
                        return;
                    }
                };
                tokio::spawn(serve_connection(accept_node.clone(), stream, remote.to_string()));
            }
        });

        Ok(MockNode { node, member_addr, gate_addr: Some(gate_addr), member_server, gate_listener: Some(gate_listener) })
    }

    async fn spawn_member_service(
        label: &str,
        version: &str,
        master_addr: Option<&str>,
        services: Vec<Service>,
    ) -> std::io::Result<(Arc<Node>, SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let dictionary = Arc::new(RwLock::new(RouteDictionary::new()));
        let global_scheduler = Arc::new(GlobalScheduler::new());
        let mut local_handler = LocalHandler::new(addr.to_string(), dictionary.clone(), Arc::new(Pipeline::new()), global_scheduler);
        for service in services {
            local_handler.register(service).await.expect("duplicate service registration in test harness");
        }
        let local_handler = Arc::new(local_handler);

        let mut config = NodeConfig {
            label: label.to_string(),
            version: version.to_string(),
            service_addr: Some(addr.to_string()),
            ..NodeConfig::default()
        };
        config.master_addr = master_addr.map(str::to_string);
        let node = Arc::new(Node::new(config, local_handler.clone(), Arc::new(Pipeline::new()), Arc::new(Pipeline::new()), dictionary));

        let service = MemberServer::new(MemberService::new(local_handler.clone(), node.clone()));
        let server = tokio::spawn(async move {
            let incoming = TcpListenerStream::new(listener);
            if let Err(e) = Server::builder().add_service(service).serve_with_incoming(incoming).await {
                tracing::warn!(error = %e, "mock member server exited");
            }
        });

        if master_addr.is_some() {
            let members = node.register_with_master().await;
            for member in members {
                local_handler.on_new_member(member).await;
            }
        }

        Ok((node, addr, server))
    }

    pub fn member_endpoint(&self) -> String {
        format!("http://{}", self.member_addr)
    }

    pub fn shutdown(self) {
        self.member_server.abort();
        if let Some(listener) = self.gate_listener {
            listener.abort();
        }
    }
}

/// Handshake then dispatch loop for one client connection on a mock gate.
async fn serve_connection(node: Arc<Node>, stream: TcpStream, remote_addr: String) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut decoder = Decoder::new();
    let mut buf = [0u8; 4096];
    let (mut read_half, write_half) = stream.into_split();

    let handshake_packet = loop {
        let n = match read_half.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        match decoder.decode(&buf[..n]) {
            Ok(packets) => {
                if let Some(packet) = packets.into_iter().find(|p| p.kind == PacketType::Handshake) {
                    break packet;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed handshake, closing connection");
                return;
            }
        }
    };
    if handshake::decode_request(&handshake_packet.payload).is_err() {
        return;
    }

    let ack = handshake::HandshakeAck::ok(node.dictionary.read().await.snapshot());
    let Ok(ack_bytes) = handshake::encode_ack(&ack) else { return };
    let ack_packet = Packet::new(PacketType::HandshakeAck, ack_bytes);
    let Ok(framed) = codec::encode(&ack_packet) else { return };
    let mut write_half = write_half;
    if write_half.write_all(&framed).await.is_err() {
        return;
    }

    let id = node.next_session_id();
    let (session, _agent) = Agent::spawn(
        id,
        remote_addr,
        write_half,
        node.dictionary.clone(),
        node.outbound.clone(),
        node.local_handler.clone(),
        now_unix_secs(),
    );
    node.track_session(session.clone()).await;

    loop {
        let n = match read_half.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        match decoder.decode(&buf[..n]) {
            Ok(packets) => {
                for packet in packets {
                    if let Err(e) = node.local_handler.process_packet(&session, packet, now_unix_secs()).await {
                        tracing::warn!(error = %e, "dispatch failed for mock gate packet");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed packet, closing connection");
                break;
            }
        }
    }

    node.remove_session(id).await;
    let _ = session.close();
}
