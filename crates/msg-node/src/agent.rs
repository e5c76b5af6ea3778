//! Gate-side connection owner. Spawns the write loop that drains a
//! session's `Entity` outbound channel, runs the outbound pipeline, encodes,
//! and writes to the socket. The read loop lives in `LocalHandler::run_read_loop`,
//! since decoding a packet and dispatching it are one and the same step.
//!
//! Grounded on the original's `cluster/agent.go` (state machine, backlog,
//! write-loop shape) and `services/server/src/ws_forwarder.rs`'s
//! `tokio::select!`-based write loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use msg_runtime::{Entity, EntityKind, OutboundCommand, Pipeline, Session};
use msg_wire::codec::{self, Packet, PacketType};
use msg_wire::{message, RouteDictionary};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, RwLock};

use crate::handler::LocalHandler;

/// Per-agent counters, supplemented from the original's `recvPckCnt`/
/// `sendPckCnt` — not load-bearing for dispatch, exposed for observability.
#[derive(Debug, Default)]
pub struct AgentCounters {
    pub recv_packets: AtomicU64,
    pub send_packets: AtomicU64,
}

pub struct Agent {
    pub remote_addr: String,
    pub counters: Arc<AgentCounters>,
}

impl Agent {
    /// Build a session bound to a freshly spawned write loop. `sink` is
    /// anything we can frame-encode into (a TCP/WS byte sink). `local_handler`
    /// is this gate's own dispatch handler, wired as the session's in-line
    /// RPC sink (spec.md §4.4: "RPC bypasses `chSend` and invokes the node's
    /// rpc handler in-line").
    pub fn spawn<W>(
        id: u64,
        remote_addr: String,
        mut sink: W,
        dictionary: Arc<RwLock<RouteDictionary>>,
        outbound: Arc<Pipeline>,
        local_handler: Arc<LocalHandler>,
        now_unix_secs: u64,
    ) -> (Arc<Session>, Arc<Agent>)
    where
        W: tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        let (entity, mut rx) = Entity::new(EntityKind::Gate, remote_addr.clone());
        let session = Arc::new(Session::new(id, entity, now_unix_secs));
        let counters = Arc::new(AgentCounters::default());
        let agent = Arc::new(Agent { remote_addr: remote_addr.clone(), counters: counters.clone() });

        let rpc_session = session.clone();
        session.set_rpc_sink(Arc::new(move |msg| {
            let rpc_session = rpc_session.clone();
            let local_handler = local_handler.clone();
            Box::pin(async move {
                if let Err(e) = local_handler.process_message(&rpc_session, msg).await {
                    tracing::warn!(error = %e, "in-line rpc dispatch failed");
                }
            })
        }));

        let write_session = session.clone();
        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                let frame = match cmd {
                    OutboundCommand::Close => break,
                    OutboundCommand::Message(msg) => {
                        if let Err(e) = outbound.process(&write_session, &msg) {
                            tracing::warn!(error = %e, route = %msg.route, "outbound pipeline aborted message");
                            continue;
                        }
                        encode_data_packet(&msg, &dictionary, write_session.is_compressed()).await
                    }
                };
                let frame = match frame {
                    Ok(f) => f,
                    Err(e) => {
                        tracing::warn!(error = %e, "message encode failed; dropping");
                        continue;
                    }
                };
                if let Err(e) = sink.write_all(&frame).await {
                    tracing::warn!(error = %e, remote_addr = %remote_addr, "write failed, closing agent");
                    let _ = write_session.close();
                    break;
                }
                counters.send_packets.fetch_add(1, Ordering::Relaxed);
            }
            let _ = sink.shutdown().await;
        });

        (session, agent)
    }
}

pub(crate) async fn encode_data_packet(
    msg: &msg_wire::Message,
    dictionary: &Arc<RwLock<RouteDictionary>>,
    compressed: bool,
) -> Result<bytes::Bytes, msg_wire::CodecError> {
    let dict = dictionary.read().await;
    let encoded = message::encode(msg, &dict, compressed)?;
    let packet = Packet::new(PacketType::Data, encoded.to_vec());
    codec::encode(&packet)
}

/// The read side: decode packets off `rx_bytes` and hand completed packets
/// to `on_packet`. Kept as a free function (rather than a loop on `Agent`)
/// because the read path doesn't need anything an `Agent` owns beyond the
/// decoder itself — `LocalHandler` drives dispatch from here.
pub async fn run_read_loop<R>(
    mut source: R,
    mut on_packet: impl FnMut(Packet),
) where
    R: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;

    let mut decoder = codec::Decoder::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = match source.read(&mut buf).await {
            Ok(0) => return,
            Ok(n) => n,
            Err(_) => return,
        };
        match decoder.decode(&buf[..n]) {
            Ok(packets) => {
                for packet in packets {
                    on_packet(packet);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed packet, closing connection");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msg_runtime::{GlobalScheduler, Pipeline};
    use tokio::io::duplex;

    fn test_local_handler(dictionary: Arc<RwLock<RouteDictionary>>) -> Arc<LocalHandler> {
        Arc::new(LocalHandler::new("127.0.0.1:1", dictionary, Arc::new(Pipeline::new()), Arc::new(GlobalScheduler::new())))
    }

    #[tokio::test]
    async fn spawned_agent_writes_pushed_messages_to_the_sink() {
        let (client_end, server_end) = duplex(4096);
        let dict = Arc::new(RwLock::new(RouteDictionary::new()));
        let outbound = Arc::new(Pipeline::new());
        let local_handler = test_local_handler(dict.clone());
        let (session, _agent) = Agent::spawn(1, "127.0.0.1:1".to_string(), server_end, dict.clone(), outbound, local_handler, 0);

        session.push("pong", b"{\"Content\":\"x\"}".to_vec()).unwrap();

        let mut reader = client_end;
        let mut decoder = codec::Decoder::new();
        let mut buf = [0u8; 256];
        let mut packets = Vec::new();
        while packets.is_empty() {
            use tokio::io::AsyncReadExt;
            let n = reader.read(&mut buf).await.unwrap();
            packets = decoder.decode(&buf[..n]).unwrap();
        }
        assert_eq!(packets.len(), 1);
        let msg = message::decode(&packets[0].payload, &dict.read().await, 0).unwrap();
        assert_eq!(msg.route, "pong");
        assert_eq!(msg.data, b"{\"Content\":\"x\"}");
    }

    #[tokio::test]
    async fn rpc_never_reaches_the_socket() {
        let (mut client_end, server_end) = duplex(4096);
        let dict = Arc::new(RwLock::new(RouteDictionary::new()));
        let outbound = Arc::new(Pipeline::new());
        let local_handler = test_local_handler(dict.clone());
        let (session, _agent) = Agent::spawn(1, "127.0.0.1:1".to_string(), server_end, dict, outbound, local_handler, 0);

        // No handler is registered for "Room.Join", so in-line dispatch fails
        // and logs a warning, but the point is it never touches the wire.
        session.rpc("Room.Join", vec![]).await.unwrap();

        use tokio::io::AsyncReadExt;
        let mut buf = [0u8; 16];
        let result = tokio::time::timeout(std::time::Duration::from_millis(50), client_end.read(&mut buf)).await;
        assert!(result.is_err(), "rpc must bypass the write loop entirely");
    }

    #[tokio::test]
    async fn stale_sessions_never_receive_a_compressed_push_after_the_dictionary_grows() {
        let (client_end, server_end) = duplex(4096);
        let dict = Arc::new(RwLock::new(RouteDictionary::new()));
        let outbound = Arc::new(Pipeline::new());
        let local_handler = test_local_handler(dict.clone());
        let (session, _agent) =
            Agent::spawn(1, "127.0.0.1:1".to_string(), server_end, dict.clone(), outbound, local_handler, 0);

        // This session's first packet was uncompressed (no dictionary entries
        // existed yet), latching its sticky flag false.
        session.set_compressed_from_first_packet(false);
        // The dictionary grows afterwards, as later-registered services add codes.
        dict.write().await.insert("Room.Join".to_string(), 7);

        session.push("Room.Join", vec![]).unwrap();

        let mut reader = client_end;
        let mut decoder = codec::Decoder::new();
        let mut buf = [0u8; 256];
        let mut packets = Vec::new();
        while packets.is_empty() {
            use tokio::io::AsyncReadExt;
            let n = reader.read(&mut buf).await.unwrap();
            packets = decoder.decode(&buf[..n]).unwrap();
        }
        assert!(!message::is_compressed(&packets[0].payload).unwrap());
        let msg = message::decode(&packets[0].payload, &dict.read().await, 0).unwrap();
        assert_eq!(msg.route, "Room.Join");
    }
}
