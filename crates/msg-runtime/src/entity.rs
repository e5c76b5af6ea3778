//! `NetworkEntity`: the capability set a session pushes messages through.
//!
//! The original source models this as an interface implemented by two
//! unrelated types (Agent on the gate, Acceptor on a backend) and upcasts
//! dynamically where needed. Both sides reduce to the same shape from a
//! session's point of view — "hand this message to whoever owns my
//! connection, or the RPC link to whoever does" — so this crate collapses
//! them into one tagged struct instead of a trait object. `msg-node` builds
//! the consumer end (the write loop, or the RPC forwarder) and hands back an
//! `Entity` as a handle; this crate never needs to know those types.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use futures_util::future::BoxFuture;
use msg_wire::Message;
use tokio::sync::mpsc;

use crate::error::SessionError;

pub const SEND_BACKLOG: usize = 256;

/// The in-line RPC dispatch callback: invoked directly from `Entity::rpc`,
/// never queued. Wired once, after the owning session exists, by whichever
/// of `Agent::spawn`/`Acceptor::spawn` built this entity — both close over
/// their own process's `LocalHandler::process_message`, so the call never
/// crosses the network regardless of which side it runs on.
pub type RpcSink = Arc<dyn Fn(Message) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// Owns the client connection directly (an Agent).
    Gate,
    /// Forwards Push/Response/Close to the owning gate over RPC (an Acceptor).
    Backend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum RawState {
    Start = 0,
    Working = 1,
    Closed = 2,
}

impl From<u8> for RawState {
    fn from(v: u8) -> Self {
        match v {
            0 => RawState::Start,
            1 => RawState::Working,
            _ => RawState::Closed,
        }
    }
}

#[derive(Debug)]
pub enum OutboundCommand {
    /// A Push or Response; runs through the outbound pipeline before encoding.
    Message(Message),
    Close,
}

/// Shared state between an `Entity` handle and whatever consumer task
/// (write loop or RPC forwarder) owns the receiving end of `tx`.
#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    last_mid: AtomicU64,
}

/// A session's handle onto its owning connection or RPC link.
#[derive(Clone)]
pub struct Entity {
    kind: EntityKind,
    tx: mpsc::Sender<OutboundCommand>,
    shared: Arc<Shared>,
    remote_addr: String,
    rpc_sink: Arc<OnceLock<RpcSink>>,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("kind", &self.kind)
            .field("shared", &self.shared)
            .field("remote_addr", &self.remote_addr)
            .field("rpc_sink_wired", &self.rpc_sink.get().is_some())
            .finish()
    }
}

impl Entity {
    /// Build a handle plus the receiver the owning consumer task drains.
    pub fn new(kind: EntityKind, remote_addr: String) -> (Self, mpsc::Receiver<OutboundCommand>) {
        let (tx, rx) = mpsc::channel(SEND_BACKLOG);
        let entity = Entity {
            kind,
            tx,
            shared: Arc::new(Shared { state: AtomicU8::new(RawState::Start as u8), last_mid: AtomicU64::new(0) }),
            remote_addr,
            rpc_sink: Arc::new(OnceLock::new()),
        };
        (entity, rx)
    }

    /// Wire the in-line RPC dispatch callback. Idempotent: only the first
    /// call takes effect, matching the "set up once at spawn time" contract.
    pub fn set_rpc_sink(&self, sink: RpcSink) {
        let _ = self.rpc_sink.set(sink);
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub fn mark_working(&self) {
        let _ = self.shared.state.compare_exchange(
            RawState::Start as u8,
            RawState::Working as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    fn is_closed(&self) -> bool {
        RawState::from(self.shared.state.load(Ordering::SeqCst)) == RawState::Closed
    }

    pub fn last_mid(&self) -> u64 {
        self.shared.last_mid.load(Ordering::SeqCst)
    }

    pub fn set_last_mid(&self, mid: u64) {
        self.shared.last_mid.store(mid, Ordering::SeqCst);
    }

    /// Enqueue a Push or Response. Fails with `BrokenPipe` once closed,
    /// `BufferExceed` if the 256-slot backlog is full — never blocks.
    pub fn push(&self, msg: Message) -> Result<(), SessionError> {
        self.enqueue(OutboundCommand::Message(msg))
    }

    pub fn response(&self, msg: Message) -> Result<(), SessionError> {
        self.enqueue(OutboundCommand::Message(msg))
    }

    /// An in-line RPC: bypasses the outbound channel entirely (the
    /// original's `noCopy=true` path) and invokes the wired-up dispatch
    /// callback directly, in-process. Fails with `BrokenPipe` if closed, or
    /// if `set_rpc_sink` was never called (every `Agent`/`Acceptor` wires one
    /// before handing its session out).
    pub async fn rpc(&self, msg: Message) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::BrokenPipe);
        }
        let sink = self.rpc_sink.get().ok_or(SessionError::BrokenPipe)?.clone();
        sink(msg).await;
        Ok(())
    }

    fn enqueue(&self, cmd: OutboundCommand) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::BrokenPipe);
        }
        match self.tx.try_send(cmd) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(SessionError::BufferExceed),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SessionError::BrokenPipe),
        }
    }

    /// Idempotent close: the first call transitions to Closed and signals
    /// the consumer task; subsequent calls fail with `CloseClosedSession`.
    pub fn close(&self) -> Result<(), SessionError> {
        let prev = self.shared.state.swap(RawState::Closed as u8, Ordering::SeqCst);
        if RawState::from(prev) == RawState::Closed {
            return Err(SessionError::CloseClosedSession);
        }
        let _ = self.tx.try_send(OutboundCommand::Close);
        Ok(())
    }
}
