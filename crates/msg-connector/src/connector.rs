//! Client-side mirror of `msg-wire`'s framing/message layer: dial a gate over
//! TCP or WebSocket, perform the handshake, then exchange Request/Notify/Push
//! messages. Grounded on `examples/original_source/connector/connector.go`
//! (the `chSend`/`mid`/`events`/`responses` shape) reworked in the idiom of
//! `services/forwarder/src/uplink.rs` (a connect-then-loop client with a
//! hand-rolled error enum).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use msg_wire::codec::{self, Decoder, Packet, PacketType};
use msg_wire::handshake::{self, HandshakeAck, HandshakeRequest};
use msg_wire::{message, Message, MessageType, RouteDictionary};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message as WsFrame;

use crate::error::ConnectorError;

/// Matches `msg_runtime::entity::SEND_BACKLOG` — the gate's per-session
/// backlog size, mirrored here so a slow client never silently grows memory
/// unbounded waiting on the server.
const SEND_BACKLOG: usize = 256;

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>>;

/// Invoked once with a Push's payload, or a Request's Response payload.
pub type Callback = Box<dyn FnOnce(Vec<u8>) + Send>;
/// Invoked on every Push matching a registered event route.
pub type PushCallback = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

enum Writer {
    Tcp(tokio::net::tcp::OwnedWriteHalf),
    Ws(futures_util::stream::SplitSink<WsStream, WsFrame>),
}

enum Reader {
    Tcp(tokio::net::tcp::OwnedReadHalf),
    Ws(futures_util::stream::SplitStream<WsStream>),
}

/// A connected client session. Cheap to clone (an `Arc` internally); the
/// read/write loops and the optional heartbeat ticker run as detached tasks
/// for as long as the connector is alive.
pub struct Connector {
    outbound_tx: mpsc::Sender<Vec<u8>>,
    mid: AtomicU64,
    dictionary: RwLock<RouteDictionary>,
    responses: Mutex<HashMap<u64, Callback>>,
    events: RwLock<HashMap<String, PushCallback>>,
    unexpected_event: RwLock<Option<PushCallback>>,
    connected: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Connector {
    /// Dial a gate's raw TCP listener and complete the handshake.
    pub async fn connect_tcp(addr: &str, handshake: HandshakeRequest) -> Result<Arc<Connector>, ConnectorError> {
        let stream = TcpStream::connect(addr).await.map_err(|e| ConnectorError::Connect(e.to_string()))?;
        let (mut read_half, mut write_half) = stream.into_split();

        let ack = perform_handshake_tcp(&mut read_half, &mut write_half, &handshake).await?;
        Ok(Connector::spawn(Writer::Tcp(write_half), Reader::Tcp(read_half), ack))
    }

    /// Dial a gate's `/ws` endpoint and complete the handshake. `url` is a
    /// full `ws://` or `wss://` URL including the path.
    pub async fn connect_ws(url: &str, handshake: HandshakeRequest) -> Result<Arc<Connector>, ConnectorError> {
        let (stream, _response) =
            tokio_tungstenite::connect_async(url).await.map_err(|e| ConnectorError::Connect(e.to_string()))?;
        let (mut write_half, mut read_half) = stream.split();

        let ack = perform_handshake_ws(&mut read_half, &mut write_half, &handshake).await?;
        Ok(Connector::spawn(Writer::Ws(write_half), Reader::Ws(read_half), ack))
    }

    fn spawn(writer: Writer, reader: Reader, ack: HandshakeAck) -> Arc<Connector> {
        let (outbound_tx, outbound_rx) = mpsc::channel(SEND_BACKLOG);
        let conn = Arc::new(Connector {
            outbound_tx,
            mid: AtomicU64::new(1),
            dictionary: RwLock::new(dictionary_from(ack.route_dict)),
            responses: Mutex::new(HashMap::new()),
            events: RwLock::new(HashMap::new()),
            unexpected_event: RwLock::new(None),
            connected: AtomicBool::new(true),
            tasks: Mutex::new(Vec::new()),
        });

        let write_conn = conn.clone();
        let write_task = tokio::spawn(async move {
            write_loop(writer, outbound_rx).await;
            write_conn.connected.store(false, Ordering::SeqCst);
        });

        let read_conn = conn.clone();
        let read_task = tokio::spawn(async move {
            read_loop(reader, &read_conn).await;
            read_conn.connected.store(false, Ordering::SeqCst);
        });

        conn.tasks.lock().unwrap().extend([write_task, read_task]);
        conn
    }

    /// Spawn a periodic heartbeat ticker. Optional: a connector that never
    /// calls this still works, it just relies on the gate's own idle sweeper
    /// (if configured) rather than proactively refreshing `lastTime`.
    pub fn spawn_heartbeat(self: &Arc<Self>, interval: Duration) {
        let conn = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if !conn.connected.load(Ordering::SeqCst) {
                    return;
                }
                let packet = Packet::new(PacketType::Heartbeat, Vec::new());
                let Ok(frame) = codec::encode(&packet) else { continue };
                if conn.outbound_tx.send(frame.to_vec()).await.is_err() {
                    return;
                }
            }
        });
        self.tasks.lock().unwrap().push(task);
    }

    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Register a callback for every Push on `route`. Overwrites any prior
    /// registration for the same route, matching the original's single-slot
    /// `events` map.
    pub fn on(&self, route: impl Into<String>, callback: impl Fn(Vec<u8>) + Send + Sync + 'static) {
        self.events.write().unwrap().insert(route.into(), Arc::new(callback));
    }

    /// Callback run for a Push whose route has no registered handler.
    pub fn on_unexpected_event(&self, callback: impl Fn(Vec<u8>) + Send + Sync + 'static) {
        *self.unexpected_event.write().unwrap() = Some(Arc::new(callback));
    }

    /// Send a request and await its paired response.
    pub async fn request(&self, route: impl Into<String>, data: Vec<u8>) -> Result<Vec<u8>, ConnectorError> {
        let (tx, rx) = oneshot::channel();
        self.raw_request(route, data, move |reply| {
            let _ = tx.send(reply);
        })
        .await?;
        rx.await.map_err(|_| ConnectorError::Disconnected)
    }

    /// Low-level request/callback pair, for callers that don't want to hold
    /// a future open across the round trip.
    pub async fn raw_request(
        &self,
        route: impl Into<String>,
        data: Vec<u8>,
        callback: impl FnOnce(Vec<u8>) + Send + 'static,
    ) -> Result<(), ConnectorError> {
        let mid = self.mid.fetch_add(1, Ordering::SeqCst);
        self.responses.lock().unwrap().insert(mid, Box::new(callback));
        if let Err(e) = self.send_message(Message::request(mid, route, data)).await {
            self.responses.lock().unwrap().remove(&mid);
            return Err(e);
        }
        Ok(())
    }

    /// Fire-and-forget notification; no response is expected.
    pub async fn notify(&self, route: impl Into<String>, data: Vec<u8>) -> Result<(), ConnectorError> {
        self.send_message(Message::notify(route, data)).await
    }

    pub async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }

    async fn send_message(&self, msg: Message) -> Result<(), ConnectorError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ConnectorError::Closed);
        }
        let dict = self.dictionary.read().unwrap();
        // This connector's dictionary is a frozen handshake-time snapshot
        // that never grows, so it's always safe to prefer the compressed
        // form when the snapshot has a code for the route.
        let encoded = message::encode(&msg, &dict, true)?;
        drop(dict);
        let packet = Packet::new(PacketType::Data, encoded.to_vec());
        let frame = codec::encode(&packet)?;
        self.outbound_tx.send(frame.to_vec()).await.map_err(|_| ConnectorError::Disconnected)
    }

    fn process_packet(&self, packet: Packet) {
        match packet.kind {
            PacketType::Data => {
                let dict = self.dictionary.read().unwrap();
                match message::decode(&packet.payload, &dict, 0) {
                    Ok(msg) => {
                        drop(dict);
                        self.process_message(msg);
                    }
                    Err(e) => tracing::warn!(error = %e, "malformed data packet from gate"),
                }
            }
            PacketType::Heartbeat => {}
            PacketType::Handshake | PacketType::HandshakeAck => {
                tracing::warn!("unexpected handshake packet after connection established");
            }
        }
    }

    fn process_message(&self, msg: Message) {
        match msg.kind {
            MessageType::Push => {
                let handler = self.events.read().unwrap().get(&msg.route).cloned();
                match handler {
                    Some(cb) => cb(msg.data),
                    None => {
                        if let Some(cb) = self.unexpected_event.read().unwrap().as_ref() {
                            cb(msg.data);
                        }
                    }
                }
            }
            MessageType::Response => {
                let cb = self.responses.lock().unwrap().remove(&msg.id);
                match cb {
                    Some(cb) => cb(msg.data),
                    None => tracing::warn!(mid = msg.id, "response handler not found"),
                }
            }
            MessageType::Request | MessageType::Notify => {
                tracing::warn!(route = %msg.route, "gate sent a {:?}, which a client never expects", msg.kind);
            }
        }
    }
}

fn dictionary_from(codes: HashMap<String, u16>) -> RouteDictionary {
    let mut dict = RouteDictionary::new();
    dict.merge(&codes);
    dict
}

async fn write_loop(mut writer: Writer, mut rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(frame) = rx.recv().await {
        let ok = match &mut writer {
            Writer::Tcp(w) => w.write_all(&frame).await.is_ok(),
            Writer::Ws(w) => w.send(WsFrame::Binary(frame.into())).await.is_ok(),
        };
        if !ok {
            break;
        }
    }
    match &mut writer {
        Writer::Tcp(w) => {
            let _ = w.shutdown().await;
        }
        Writer::Ws(w) => {
            let _ = w.close().await;
        }
    }
}

async fn read_loop(mut reader: Reader, conn: &Arc<Connector>) {
    let mut decoder = Decoder::new();
    loop {
        let chunk = match &mut reader {
            Reader::Tcp(r) => {
                let mut buf = [0u8; 4096];
                match r.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => buf[..n].to_vec(),
                }
            }
            Reader::Ws(r) => match r.next().await {
                Some(Ok(WsFrame::Binary(b))) => b.to_vec(),
                Some(Ok(WsFrame::Close(_))) | None => return,
                Some(Ok(_)) => continue,
                Some(Err(_)) => return,
            },
        };
        match decoder.decode(&chunk) {
            Ok(packets) => {
                for packet in packets {
                    conn.process_packet(packet);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed packet from gate, closing connection");
                return;
            }
        }
    }
}

async fn perform_handshake_tcp(
    read_half: &mut tokio::net::tcp::OwnedReadHalf,
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    req: &HandshakeRequest,
) -> Result<HandshakeAck, ConnectorError> {
    let payload = handshake::encode_request(req)?;
    let frame = codec::encode(&Packet::new(PacketType::Handshake, payload))?;
    write_half.write_all(&frame).await.map_err(|e| ConnectorError::Io(e.to_string()))?;

    let mut decoder = Decoder::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = read_half.read(&mut buf).await.map_err(|e| ConnectorError::Io(e.to_string()))?;
        if n == 0 {
            return Err(ConnectorError::Disconnected);
        }
        for packet in decoder.decode(&buf[..n])? {
            if packet.kind == PacketType::HandshakeAck {
                return Ok(handshake::decode_ack(&packet.payload)?);
            }
        }
    }
}

async fn perform_handshake_ws(
    read_half: &mut futures_util::stream::SplitStream<WsStream>,
    write_half: &mut futures_util::stream::SplitSink<WsStream, WsFrame>,
    req: &HandshakeRequest,
) -> Result<HandshakeAck, ConnectorError> {
    let payload = handshake::encode_request(req)?;
    let frame = codec::encode(&Packet::new(PacketType::Handshake, payload))?;
    write_half.send(WsFrame::Binary(frame.to_vec().into())).await.map_err(|e| ConnectorError::Io(e.to_string()))?;

    let mut decoder = Decoder::new();
    loop {
        match read_half.next().await {
            Some(Ok(WsFrame::Binary(b))) => {
                for packet in decoder.decode(&b)? {
                    if packet.kind == PacketType::HandshakeAck {
                        return Ok(handshake::decode_ack(&packet.payload)?);
                    }
                }
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(ConnectorError::Io(e.to_string())),
            None => return Err(ConnectorError::Disconnected),
        }
    }
}
