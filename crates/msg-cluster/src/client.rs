//! Thin gRPC client helpers for dialing peers. A dial or RPC failure to one
//! peer never aborts a broadcast to the others — it's logged and the peer is
//! treated as gone for that operation (spec.md §4.7); pruning the registry
//! itself is the master's job, driven by explicit Unregister/dial-failure
//! reports, not active liveness probing here.

use crate::error::ClusterError;
use crate::model::Member;
use crate::proto::member_client::MemberClient;
use crate::proto::{
    CloseSessionRequest, DelMemberRequest, NewMemberRequest, NotifyMessage,
    PerformConventionRequest, PerformConventionResponse, PushMessage, RequestMessage,
    ResponseMessage, SessionClosedRequest,
};

async fn dial(addr: &str) -> Option<MemberClient<tonic::transport::Channel>> {
    let endpoint = format!("http://{addr}");
    match MemberClient::connect(endpoint).await {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::warn!(addr, error = %e, "dial failed, treating peer as unreachable for this broadcast");
            None
        }
    }
}

/// Push a `NewMember` notification to every peer in `peers` (best effort).
pub async fn broadcast_new_member(peers: &[Member], joined: &Member) {
    for peer in peers {
        if peer.service_addr == joined.service_addr {
            continue;
        }
        let Some(mut client) = dial(&peer.service_addr).await else { continue };
        let req = NewMemberRequest { member: Some(joined.clone().into()) };
        if let Err(status) = client.new_member(req).await {
            tracing::warn!(addr = %peer.service_addr, %status, "NewMember broadcast failed");
        }
    }
}

/// Push a `DelMember` notification to every peer in `peers` (best effort).
pub async fn broadcast_del_member(peers: &[Member], left_addr: &str) {
    for peer in peers {
        if peer.service_addr == left_addr {
            continue;
        }
        let Some(mut client) = dial(&peer.service_addr).await else { continue };
        let req = DelMemberRequest { service_addr: left_addr.to_string() };
        if let Err(status) = client.del_member(req).await {
            tracing::warn!(addr = %peer.service_addr, %status, "DelMember broadcast failed");
        }
    }
}

/// `Transmitter.Unicast`: call `PerformConvention` against exactly one
/// labeled member. `spec.md` §4.10.
pub async fn unicast(
    target: &Member,
    signal: u32,
    payload: Vec<u8>,
) -> Result<PerformConventionResponse, crate::error::ClusterError> {
    let mut client = MemberClient::connect(format!("http://{}", target.service_addr))
        .await
        .map_err(|source| crate::error::ClusterError::DialFailure { addr: target.service_addr.clone(), source })?;
    client
        .perform_convention(PerformConventionRequest { signal, payload })
        .await
        .map(|r| r.into_inner())
        .map_err(|status| crate::error::ClusterError::RpcFailure {
            addr: target.service_addr.clone(),
            status: Box::new(status),
        })
}

/// `Transmitter.Multicast`: call `PerformConvention` against every known
/// member (best effort; unreachable peers are skipped, not reported).
pub async fn multicast(peers: &[Member], signal: u32, payload: Vec<u8>) {
    for peer in peers {
        let Some(mut client) = dial(&peer.service_addr).await else { continue };
        let req = PerformConventionRequest { signal, payload: payload.clone() };
        if let Err(status) = client.perform_convention(req).await {
            tracing::warn!(addr = %peer.service_addr, %status, "multicast convention failed");
        }
    }
}

async fn connect(addr: &str) -> Result<MemberClient<tonic::transport::Channel>, ClusterError> {
    MemberClient::connect(format!("http://{addr}"))
        .await
        .map_err(|source| ClusterError::DialFailure { addr: addr.to_string(), source })
}

fn rpc_failed(addr: &str, status: tonic::Status) -> ClusterError {
    ClusterError::RpcFailure { addr: addr.to_string(), status: Box::new(status) }
}

/// Forward a cross-node Request to the backend that owns `route`, naming
/// the gate the response must eventually be routed back through.
pub async fn forward_request(
    backend_addr: &str,
    gate_addr: &str,
    session_id: u64,
    id: u64,
    uid: u64,
    short_ver: u32,
    route: &str,
    data: Vec<u8>,
    remote_addr: &str,
) -> Result<(), ClusterError> {
    let mut client = connect(backend_addr).await?;
    let req = RequestMessage {
        gate_addr: gate_addr.to_string(),
        session_id,
        id,
        uid,
        short_ver,
        route: route.to_string(),
        data,
        remote_addr: remote_addr.to_string(),
    };
    client.handle_request(req).await.map(|_| ()).map_err(|s| rpc_failed(backend_addr, s))
}

/// Forward a cross-node Notify to the backend that owns `route`. Fire and
/// forget: a `Notify` carries no id to reply against.
pub async fn forward_notify(
    backend_addr: &str,
    gate_addr: &str,
    session_id: u64,
    uid: u64,
    short_ver: u32,
    route: &str,
    data: Vec<u8>,
    remote_addr: &str,
) -> Result<(), ClusterError> {
    let mut client = connect(backend_addr).await?;
    let req = NotifyMessage {
        gate_addr: gate_addr.to_string(),
        session_id,
        id: 0,
        uid,
        short_ver,
        route: route.to_string(),
        data,
        remote_addr: remote_addr.to_string(),
    };
    client.handle_notify(req).await.map(|_| ()).map_err(|s| rpc_failed(backend_addr, s))
}

/// Acceptor -> gate: forward a handler's Push to the session's owning agent.
pub async fn push_to_gate(gate_addr: &str, session_id: u64, route: &str, data: Vec<u8>) -> Result<(), ClusterError> {
    let mut client = connect(gate_addr).await?;
    let req = PushMessage { session_id, short_ver: 0, id: 0, route: route.to_string(), data };
    client.handle_push(req).await.map(|_| ()).map_err(|s| rpc_failed(gate_addr, s))
}

/// Acceptor -> gate: forward a handler's Response to the session's owning agent.
pub async fn response_to_gate(
    gate_addr: &str,
    session_id: u64,
    id: u64,
    data: Vec<u8>,
) -> Result<(), ClusterError> {
    let mut client = connect(gate_addr).await?;
    let req = ResponseMessage { session_id, short_ver: 0, id, route: String::new(), data };
    client.handle_response(req).await.map(|_| ()).map_err(|s| rpc_failed(gate_addr, s))
}

/// Acceptor -> gate: ask the gate to close the session this Acceptor shadows.
pub async fn close_session_on_gate(gate_addr: &str, session_id: u64) -> Result<(), ClusterError> {
    let mut client = connect(gate_addr).await?;
    client
        .close_session(CloseSessionRequest { session_id })
        .await
        .map(|_| ())
        .map_err(|s| rpc_failed(gate_addr, s))
}

/// Gate -> backend: the real session died; tell the backend to drop its shadow.
pub async fn notify_session_closed(backend_addr: &str, session_id: u64) -> Result<(), ClusterError> {
    let mut client = connect(backend_addr).await?;
    client
        .session_closed(SessionClosedRequest { session_id })
        .await
        .map(|_| ())
        .map_err(|s| rpc_failed(backend_addr, s))
}
