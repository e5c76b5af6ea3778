//! The gate's client-facing raw TCP listener: accept a connection, perform
//! the handshake, then hand the socket to an `Agent` for writes and decode
//! inbound packets into `LocalHandler::process_packet`. Grounded on
//! `msg-node::agent::run_read_loop`'s decode-loop shape and
//! `msg-node::http_bridge`'s per-connection handshake-then-dispatch
//! structure (the WS bridge skips the handshake step since the upgrade
//! itself is the handshake; a raw socket has no such equivalent to borrow
//! from the original, so this is written fresh).

use std::sync::Arc;

use msg_node::node::now_unix_secs;
use msg_node::{Agent, Node};
use msg_wire::codec::{self, Decoder, Packet, PacketType};
use msg_wire::handshake;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub async fn run(node: Arc<Node>, bind: &str) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!(addr = %bind, "gate client listener bound");
    loop {
        let (stream, remote) = listener.accept().await?;
        tokio::spawn(serve_connection(node.clone(), stream, remote.to_string()));
    }
}

async fn serve_connection(node: Arc<Node>, stream: tokio::net::TcpStream, remote_addr: String) {
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
                warn!(error = %e, %remote_addr, "malformed handshake, closing connection");
                return;
            }
        }
    };
    if handshake::decode_request(&handshake_packet.payload).is_err() {
        warn!(%remote_addr, "unparseable handshake request, closing connection");
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
        remote_addr.clone(),
        write_half,
        node.dictionary.clone(),
        node.outbound.clone(),
        node.local_handler.clone(),
        now_unix_secs(),
    );
    node.track_session(session.clone()).await;
    info!(session_id = id, %remote_addr, "client session established");

    loop {
        let n = match read_half.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        match decoder.decode(&buf[..n]) {
            Ok(packets) => {
                for packet in packets {
                    if let Err(e) = node.local_handler.process_packet(&session, packet, now_unix_secs()).await {
                        warn!(error = %e, session_id = id, "dispatch failed for client packet");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, session_id = id, "malformed packet, closing connection");
                break;
            }
        }
    }

    node.remove_session(id).await;
    let _ = session.close();
    info!(session_id = id, "client session closed");
}
