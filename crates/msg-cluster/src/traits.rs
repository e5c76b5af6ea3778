//! Seams `msg-node` implements so the gRPC adapters in this crate can call
//! back into dispatch/session logic without this crate depending on
//! `msg-node` (which depends on this crate, not the other way around).

use async_trait::async_trait;

use crate::model::Member;

/// Notified when the cluster's known membership changes. Implemented by
/// `msg-node`'s `LocalHandler` to keep `remoteServices`/the route
/// dictionary in sync with master-pushed or peer-broadcast events.
#[async_trait]
pub trait MembershipObserver: Send + Sync {
    async fn on_new_member(&self, member: Member);
    async fn on_del_member(&self, service_addr: &str);
}

/// Routes raw cross-node RPCs into local dispatch/session logic. Implemented
/// by `msg-node`'s `Node`. Every method takes already-decoded wire fields
/// rather than proto types, so `msg-node` never needs to depend on `prost`.
#[async_trait]
pub trait MemberRpcHandler: Send + Sync {
    async fn handle_request(
        &self,
        gate_addr: &str,
        session_id: u64,
        id: u64,
        uid: u64,
        short_ver: u32,
        route: &str,
        data: &[u8],
        remote_addr: &str,
    ) -> Result<(), crate::error::ClusterError>;

    async fn handle_notify(
        &self,
        gate_addr: &str,
        session_id: u64,
        uid: u64,
        short_ver: u32,
        route: &str,
        data: &[u8],
        remote_addr: &str,
    ) -> Result<(), crate::error::ClusterError>;

    /// A gate-bound Push arriving from a backend's Acceptor.
    async fn handle_push(&self, session_id: u64, route: &str, data: &[u8]) -> Result<(), crate::error::ClusterError>;

    /// A gate-bound Response arriving from a backend's Acceptor.
    async fn handle_response(
        &self,
        session_id: u64,
        id: u64,
        route: &str,
        data: &[u8],
    ) -> Result<(), crate::error::ClusterError>;

    /// Gate -> backend: the real session died (client disconnect or an
    /// earlier `close_session`); tear down the backend's shadow session.
    async fn session_closed(&self, session_id: u64);

    /// Backend -> gate: an Acceptor's `Close()` asking the gate to close
    /// the real session it shadows.
    async fn close_session(&self, session_id: u64);

    /// An application-level convention message arriving from a peer.
    async fn perform_convention(&self, signal: u32, payload: &[u8]) -> Vec<u8>;
}
