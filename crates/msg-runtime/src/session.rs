//! Per-connection session state. Lives on the gate; a shadow session with
//! the same id is created on any backend that has processed a message for
//! it (see `msg-node::acceptor`).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{OnceLock, RwLock};

use http::Extensions;
use msg_wire::{short_version, Message, MessageType};
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, RpcSink};
use crate::error::SessionError;
use crate::events::{Callback, EventRegistry};
use crate::router::Router;

/// Fired just before the network layer tears down a closing session.
pub const EVENT_CLOSED: &str = "closed";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub uid: u64,
    pub version: String,
}

pub struct Session {
    id: u64,
    uid: AtomicU64,
    version: RwLock<String>,
    short_ver: AtomicU32,
    last_heartbeat: AtomicU64,
    /// Typed bag replacing the original's opaque `interface{}` map: any
    /// `Send + Sync + 'static` value can be stored, keyed by its own type.
    data: RwLock<Extensions>,
    router: Router,
    events: EventRegistry,
    entity: Entity,
    /// Set once, from this session's first decoded packet (spec: "the first
    /// message on an agent determines that agent's `compressed` flag for its
    /// entire lifetime"). `None` until then; outbound encoding must treat
    /// "not yet set" as uncompressed rather than guessing.
    compressed: OnceLock<bool>,
}

impl Session {
    pub fn new(id: u64, entity: Entity, now_unix_secs: u64) -> Self {
        Session {
            id,
            uid: AtomicU64::new(0),
            version: RwLock::new(String::new()),
            short_ver: AtomicU32::new(0),
            last_heartbeat: AtomicU64::new(now_unix_secs),
            data: RwLock::new(Extensions::new()),
            router: Router::new(),
            events: EventRegistry::new(),
            entity,
            compressed: OnceLock::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn uid(&self) -> u64 {
        self.uid.load(Ordering::SeqCst)
    }

    pub fn bind_uid(&self, uid: u64) {
        self.uid.store(uid, Ordering::SeqCst);
    }

    pub fn version(&self) -> String {
        self.version.read().unwrap().clone()
    }

    pub fn short_ver(&self) -> u32 {
        self.short_ver.load(Ordering::SeqCst)
    }

    /// Binds the session's version string and derives `short_ver` from its
    /// `-HHHHHHHH` suffix, per `msg_wire::short_version`.
    pub fn bind_version(&self, version: impl Into<String>) {
        let version = version.into();
        self.short_ver.store(short_version(&version), Ordering::SeqCst);
        *self.version.write().unwrap() = version;
    }

    pub fn last_heartbeat(&self) -> u64 {
        self.last_heartbeat.load(Ordering::SeqCst)
    }

    pub fn touch_heartbeat(&self, now_unix_secs: u64) {
        self.last_heartbeat.store(now_unix_secs, Ordering::SeqCst);
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Whether this session's packets are in compressed (dictionary-code)
    /// form. `false` until the first packet sets it; a switch back to
    /// uncompressed is not allowed, so later calls to
    /// `set_compressed_from_first_packet` are no-ops once set once.
    pub fn is_compressed(&self) -> bool {
        self.compressed.get().copied().unwrap_or(false)
    }

    /// Latch the sticky compressed flag from this session's first decoded
    /// packet. Called once by `LocalHandler::process_packet`; later calls
    /// are no-ops, matching the "for the entire lifetime" contract.
    pub fn set_compressed_from_first_packet(&self, compressed: bool) {
        let _ = self.compressed.set(compressed);
    }

    pub fn set<T: Send + Sync + 'static>(&self, value: T) {
        self.data.write().unwrap().insert(value);
    }

    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.data.read().unwrap().get::<T>().cloned()
    }

    pub fn remove<T: Send + Sync + 'static>(&self) -> Option<T> {
        self.data.write().unwrap().remove::<T>()
    }

    pub fn on(&self, key: impl Into<String>, cb: Callback) {
        self.events.on(key, cb);
    }

    pub fn trigger(&self, key: &str) {
        self.events.trigger(key, self);
    }

    pub fn remote_addr(&self) -> &str {
        self.entity.remote_addr()
    }

    pub fn push(&self, route: impl Into<String>, data: Vec<u8>) -> Result<(), SessionError> {
        self.entity.push(Message::push(route, data))
    }

    pub fn response(&self, data: Vec<u8>) -> Result<(), SessionError> {
        let mid = self.entity.last_mid();
        self.entity.response(Message::response(mid, String::new(), data))
    }

    /// Respond to a specific request id rather than the last one dispatched
    /// on this entity (useful when a handler defers a reply past the point
    /// another request has already been dispatched on the same session).
    pub fn response_mid(&self, mid: u64, data: Vec<u8>) -> Result<(), SessionError> {
        self.entity.response(Message::response(mid, String::new(), data))
    }

    pub fn last_mid(&self) -> u64 {
        self.entity.last_mid()
    }

    /// Wire the in-line RPC dispatch callback onto this session's entity.
    /// Called once by `Agent::spawn`/`Acceptor::spawn`, after the session is
    /// `Arc`-wrapped, closing over that same `Arc<Session>` and the owning
    /// process's own `LocalHandler::process_message`.
    pub fn set_rpc_sink(&self, sink: RpcSink) {
        self.entity.set_rpc_sink(sink);
    }

    /// An RPC (spec.md §4.4/§4.5): invokes the owning process's own dispatch
    /// in-line rather than enqueuing like `push`/`response` — bypasses the
    /// outbound channel entirely. On a gate this re-enters that gate's
    /// `LocalHandler::process_message`; on a backend it re-enters that
    /// backend's own handler, never the gate's, and never over the wire.
    pub async fn rpc(&self, route: impl Into<String>, data: Vec<u8>) -> Result<(), SessionError> {
        let mid = self.entity.last_mid();
        let msg = Message { kind: MessageType::Notify, id: mid, route: route.into(), short_ver: 0, data };
        self.entity.rpc(msg).await
    }

    /// Stamp the id of the request currently being dispatched onto the
    /// underlying entity, so a handler's `response`/`response_mid` call
    /// targets the right request without the dispatcher threading it through
    /// every handler signature. Called by the dispatcher immediately before
    /// invoking a `Request` handler.
    pub fn set_last_mid(&self, mid: u64) {
        self.entity.set_last_mid(mid);
    }

    /// Close the underlying network entity exactly once, firing `closed`
    /// callbacks first. Idempotent: subsequent calls fail with
    /// `CloseClosedSession`.
    pub fn close(&self) -> Result<(), SessionError> {
        self.trigger(EVENT_CLOSED);
        self.entity.close()
    }

    /// Snapshot of the fields a handler may want to rehydrate after a
    /// reconnect. Persisting the snapshot itself is out of scope; only the
    /// capture/restore hook is provided.
    pub fn state(&self) -> SessionState {
        SessionState { uid: self.uid(), version: self.version() }
    }

    pub fn restore(&self, state: SessionState) {
        self.bind_uid(state.uid);
        if !state.version.is_empty() {
            self.bind_version(state.version);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;

    fn session() -> Session {
        let (entity, _rx) = Entity::new(EntityKind::Gate, "127.0.0.1:9000".to_string());
        Session::new(1, entity, 0)
    }

    #[test]
    fn compressed_defaults_false_and_latches_on_first_set() {
        let s = session();
        assert!(!s.is_compressed());
        s.set_compressed_from_first_packet(true);
        assert!(s.is_compressed());
        // a later packet can never flip it back, even to a different value.
        s.set_compressed_from_first_packet(false);
        assert!(s.is_compressed());
    }

    #[tokio::test]
    async fn rpc_invokes_the_wired_sink_instead_of_enqueuing() {
        use std::sync::atomic::AtomicBool;
        use std::sync::Arc;

        let s = session();
        let invoked = Arc::new(AtomicBool::new(false));
        let invoked2 = invoked.clone();
        s.set_rpc_sink(Arc::new(move |_msg| {
            let invoked = invoked2.clone();
            Box::pin(async move {
                invoked.store(true, Ordering::SeqCst);
            })
        }));

        s.rpc("Room.Join", vec![]).await.unwrap();
        assert!(invoked.load(Ordering::SeqCst));
    }

    #[test]
    fn bind_version_derives_short_ver() {
        let s = session();
        s.bind_version("1.0-aaaaaaaa");
        assert_eq!(s.short_ver(), 0xaaaaaaaa);
    }

    #[test]
    fn typed_bag_round_trips() {
        #[derive(Clone, PartialEq, Debug)]
        struct RoomId(u32);
        let s = session();
        assert_eq!(s.get::<RoomId>(), None);
        s.set(RoomId(7));
        assert_eq!(s.get::<RoomId>(), Some(RoomId(7)));
        assert_eq!(s.remove::<RoomId>(), Some(RoomId(7)));
        assert_eq!(s.get::<RoomId>(), None);
    }

    #[test]
    fn state_and_restore_round_trip() {
        let s = session();
        s.bind_uid(42);
        s.bind_version("2.0-cccccccc");
        let snapshot = s.state();

        let s2 = session();
        s2.restore(snapshot);
        assert_eq!(s2.uid(), 42);
        assert_eq!(s2.short_ver(), 0xcccccccc);
    }

    #[test]
    fn closed_event_fires_before_entity_close() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let s = session();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        s.on(EVENT_CLOSED, Box::new(move |_| fired2.store(true, Ordering::SeqCst)));
        s.close().unwrap();
        assert!(fired.load(Ordering::SeqCst));
        assert!(matches!(s.close().unwrap_err(), SessionError::CloseClosedSession));
    }
}
