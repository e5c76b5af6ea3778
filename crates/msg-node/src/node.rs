//! Node lifecycle: the gate's live-session store, the backend's shadow-session
//! store, master registration, shutdown-hook sequencing, and the idle-session
//! sweeper. Grounded on the original's `node.go` startup/shutdown sequence
//! (spec.md §4.8) and `services/server/src/main.rs`'s signal-driven shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use msg_cluster::proto::master_client::MasterClient;
use msg_cluster::proto::{MemberInfo, RegisterRequest, UnregisterRequest};
use msg_cluster::{ClusterError, MemberRpcHandler};
use msg_runtime::{Pipeline, Session};
use msg_wire::{Message, RouteDictionary};
use tokio::sync::RwLock;

use crate::acceptor::Acceptor;
use crate::handler::LocalHandler;

/// Static identity and optional clustering/sweeper settings for one process.
/// `master_addr: None` means this node runs standalone; `service_addr: None`
/// means it never advertises itself to peers (it can still dial out).
pub struct NodeConfig {
    pub label: String,
    pub version: String,
    pub service_addr: Option<String>,
    pub master_addr: Option<String>,
    pub master_register_retry_interval: Duration,
    /// Idle-session sweeper, supplemented from the original's connection
    /// timeout handling but made opt-in here: `None` (the default) disables
    /// it entirely, matching spec.md §9's resolution that a framework this
    /// size shouldn't impose a liveness policy its caller didn't ask for.
    pub idle_session_timeout: Option<Duration>,
    /// Plain debug HTTP listener (`/healthz`, `/readyz`), separate from the
    /// client-facing bridge. Supplemented from the original's `DebugAddr`;
    /// `None` (the default) disables it.
    pub debug_addr: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            label: String::new(),
            version: String::new(),
            service_addr: None,
            master_addr: None,
            master_register_retry_interval: Duration::from_secs(5),
            idle_session_timeout: None,
            debug_addr: None,
        }
    }
}

type Hook = Box<dyn Fn() + Send + Sync>;
type ConventionAcceptor = Box<dyn Fn(u32, &[u8]) -> Vec<u8> + Send + Sync>;

pub struct Node {
    pub config: NodeConfig,
    pub local_handler: Arc<LocalHandler>,
    pub inbound: Arc<Pipeline>,
    pub outbound: Arc<Pipeline>,
    pub dictionary: Arc<RwLock<RouteDictionary>>,
    /// Gate-side: sessions owned by an `Agent` on this process.
    sessions: RwLock<HashMap<u64, Arc<Session>>>,
    /// Backend-side: shadow sessions created by `Acceptor::spawn` the first
    /// time a cross-node message for that id arrives.
    shadows: RwLock<HashMap<u64, (Arc<Session>, Arc<Acceptor>)>>,
    next_session_id: AtomicU64,
    before_shutdown: RwLock<Vec<Hook>>,
    shutdown_hooks: RwLock<Vec<Hook>>,
    convention_acceptor: RwLock<Option<ConventionAcceptor>>,
}

impl Node {
    pub fn new(
        config: NodeConfig,
        local_handler: Arc<LocalHandler>,
        inbound: Arc<Pipeline>,
        outbound: Arc<Pipeline>,
        dictionary: Arc<RwLock<RouteDictionary>>,
    ) -> Self {
        Node {
            config,
            local_handler,
            inbound,
            outbound,
            dictionary,
            sessions: RwLock::new(HashMap::new()),
            shadows: RwLock::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
            before_shutdown: RwLock::new(Vec::new()),
            shutdown_hooks: RwLock::new(Vec::new()),
            convention_acceptor: RwLock::new(None),
        }
    }

    pub fn next_session_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::SeqCst)
    }

    pub async fn track_session(&self, session: Arc<Session>) {
        self.sessions.write().await.insert(session.id(), session);
    }

    pub async fn session(&self, id: u64) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn remove_session(&self, id: u64) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(&id)
    }

    /// Run hooks registered with [`Node::on_before_shutdown`], in
    /// registration order.
    pub fn on_before_shutdown(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.before_shutdown.try_write().expect("registered before the node starts serving traffic").push(Box::new(hook));
    }

    pub fn on_shutdown(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.shutdown_hooks.try_write().expect("registered before the node starts serving traffic").push(Box::new(hook));
    }

    pub async fn establish_convention(&self, acceptor: impl Fn(u32, &[u8]) -> Vec<u8> + Send + Sync + 'static) {
        *self.convention_acceptor.write().await = Some(Box::new(acceptor));
    }

    /// Register with the configured master, retrying forever on any dial or
    /// RPC error (spec.md §4.7). Returns once a `RegisterResponse` is
    /// received; the caller is expected to feed its members into
    /// `local_handler` via `on_new_member`.
    pub async fn register_with_master(&self) -> Vec<msg_cluster::Member> {
        let Some(master_addr) = &self.config.master_addr else { return Vec::new() };
        let member = MemberInfo {
            label: self.config.label.clone(),
            version: self.config.version.clone(),
            service_addr: self.config.service_addr.clone().unwrap_or_default(),
            services: self.local_handler.service_names(),
            dictionary: self.dictionary.read().await.snapshot().into_iter().map(|(r, c)| (r, c as u32)).collect(),
            is_master: false,
        };
        loop {
            match self.try_register_once(master_addr, member.clone()).await {
                Ok(members) => return members,
                Err(e) => {
                    tracing::warn!(error = %e, master_addr, "register with master failed, retrying");
                    tokio::time::sleep(self.config.master_register_retry_interval).await;
                }
            }
        }
    }

    async fn try_register_once(&self, master_addr: &str, member: MemberInfo) -> Result<Vec<msg_cluster::Member>, ClusterError> {
        let mut client = MasterClient::connect(format!("http://{master_addr}"))
            .await
            .map_err(|source| ClusterError::DialFailure { addr: master_addr.to_string(), source })?;
        let resp = client
            .register(RegisterRequest { member: Some(member) })
            .await
            .map_err(|status| ClusterError::RpcFailure { addr: master_addr.to_string(), status: Box::new(status) })?;
        Ok(resp.into_inner().members.into_iter().map(Into::into).collect())
    }

    pub async fn unregister_from_master(&self) {
        let Some(master_addr) = &self.config.master_addr else { return };
        let Some(service_addr) = &self.config.service_addr else { return };
        let Ok(mut client) = MasterClient::connect(format!("http://{master_addr}")).await else {
            tracing::warn!(master_addr, "unregister dial failed; leaving master to notice via a failed health check");
            return;
        };
        if let Err(status) = client.unregister(UnregisterRequest { service_addr: service_addr.clone() }).await {
            tracing::warn!(%status, master_addr, "unregister RPC failed");
        }
    }

    /// Startup sequence per spec.md §4.8 steps 5-7, condensed to what this
    /// crate owns: Init/AfterInit is the caller's responsibility (it knows
    /// what components it built), so this runs BeforeShutdown/Shutdown in
    /// reverse registration order and leaves readiness signalling to the
    /// binary.
    pub async fn shutdown(&self) {
        for hook in self.before_shutdown.read().await.iter().rev() {
            hook();
        }
        for hook in self.shutdown_hooks.read().await.iter().rev() {
            hook();
        }
        self.unregister_from_master().await;
        self.local_handler.close_schedulers().await;
    }

    /// All versions of `service` known cluster-wide, local version included
    /// if this node serves it. Supplemented from the original's
    /// `LocalHandler.FindVersions`.
    pub async fn find_versions(&self, service: &str) -> Vec<String> {
        self.local_handler.find_versions(service, &self.config.version).await
    }

    /// Spawn the debug HTTP listener if `debug_addr` is set. Disabled by
    /// default; a caller opts in via `NodeConfig`.
    pub fn spawn_debug_listener(self: &Arc<Self>) {
        let Some(addr) = self.config.debug_addr.clone() else { return };
        tokio::spawn(async move {
            match tokio::net::TcpListener::bind(&addr).await {
                Ok(listener) => {
                    if let Err(e) = axum::serve(listener, crate::debug::router()).await {
                        tracing::warn!(error = %e, addr, "debug listener exited");
                    }
                }
                Err(e) => tracing::warn!(error = %e, addr, "debug listener failed to bind"),
            }
        });
    }

    /// Spawn the idle-session reaper if `idle_session_timeout` is set.
    /// Disabled by default; a caller opts in via `NodeConfig`.
    pub fn spawn_idle_sweeper(self: &Arc<Self>) {
        let Some(timeout) = self.config.idle_session_timeout else { return };
        let node = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(timeout / 2);
            loop {
                ticker.tick().await;
                let now = now_unix_secs();
                let stale: Vec<u64> = node
                    .sessions
                    .read()
                    .await
                    .values()
                    .filter(|s| now.saturating_sub(s.last_heartbeat()) > timeout.as_secs())
                    .map(|s| s.id())
                    .collect();
                for id in stale {
                    if let Some(session) = node.remove_session(id).await {
                        tracing::info!(session_id = id, "idle session swept");
                        let _ = session.close();
                    }
                }
            }
        });
    }
}

pub fn now_unix_secs() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[async_trait]
impl MemberRpcHandler for Node {
    async fn handle_request(
        &self,
        gate_addr: &str,
        session_id: u64,
        id: u64,
        uid: u64,
        _short_ver: u32,
        route: &str,
        data: &[u8],
        remote_addr: &str,
    ) -> Result<(), ClusterError> {
        let session = self.shadow_or_spawn(session_id, gate_addr, remote_addr).await;
        session.bind_uid(uid);
        self.local_handler
            .local_process(&session, Message::request(id, route, data.to_vec()))
            .await
            .map_err(|e| ClusterError::SerializationFailure(e.to_string()))
    }

    async fn handle_notify(
        &self,
        gate_addr: &str,
        session_id: u64,
        uid: u64,
        _short_ver: u32,
        route: &str,
        data: &[u8],
        remote_addr: &str,
    ) -> Result<(), ClusterError> {
        let session = self.shadow_or_spawn(session_id, gate_addr, remote_addr).await;
        session.bind_uid(uid);
        self.local_handler
            .local_process(&session, Message::notify(route, data.to_vec()))
            .await
            .map_err(|e| ClusterError::SerializationFailure(e.to_string()))
    }

    async fn handle_push(&self, session_id: u64, route: &str, data: &[u8]) -> Result<(), ClusterError> {
        let session = self.session(session_id).await.ok_or(ClusterError::SessionNotFound(session_id))?;
        session.push(route.to_string(), data.to_vec()).map_err(|e| ClusterError::SerializationFailure(e.to_string()))
    }

    async fn handle_response(&self, session_id: u64, id: u64, _route: &str, data: &[u8]) -> Result<(), ClusterError> {
        let session = self.session(session_id).await.ok_or(ClusterError::SessionNotFound(session_id))?;
        session.response_mid(id, data.to_vec()).map_err(|e| ClusterError::SerializationFailure(e.to_string()))
    }

    async fn session_closed(&self, session_id: u64) {
        if let Some((session, _acceptor)) = self.shadows.write().await.remove(&session_id) {
            let _ = session.close();
        }
    }

    async fn close_session(&self, session_id: u64) {
        if let Some(session) = self.remove_session(session_id).await {
            let _ = session.close();
        }
    }

    async fn perform_convention(&self, signal: u32, payload: &[u8]) -> Vec<u8> {
        match self.convention_acceptor.read().await.as_ref() {
            Some(acceptor) => acceptor(signal, payload),
            None => Vec::new(),
        }
    }
}

impl Node {
    async fn shadow_or_spawn(&self, session_id: u64, gate_addr: &str, remote_addr: &str) -> Arc<Session> {
        if let Some((session, _)) = self.shadows.read().await.get(&session_id) {
            return session.clone();
        }
        let mut shadows = self.shadows.write().await;
        if let Some((session, _)) = shadows.get(&session_id) {
            return session.clone();
        }
        let (session, acceptor) =
            Acceptor::spawn(session_id, gate_addr.to_string(), remote_addr.to_string(), self.local_handler.clone(), now_unix_secs());
        shadows.insert(session_id, (session.clone(), acceptor));
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msg_runtime::GlobalScheduler;

    fn node() -> Node {
        let dictionary = Arc::new(RwLock::new(RouteDictionary::new()));
        let local_handler =
            Arc::new(LocalHandler::new("127.0.0.1:9001", dictionary.clone(), Arc::new(Pipeline::new()), Arc::new(GlobalScheduler::new())));
        Node::new(NodeConfig::default(), local_handler, Arc::new(Pipeline::new()), Arc::new(Pipeline::new()), dictionary)
    }

    #[tokio::test]
    async fn close_session_removes_it_from_the_store() {
        use msg_runtime::{Entity, EntityKind};

        let node = node();
        let (entity, _rx) = Entity::new(EntityKind::Gate, "127.0.0.1:1".to_string());
        let session = Arc::new(Session::new(42, entity, 0));
        node.track_session(session.clone()).await;
        assert!(node.session(42).await.is_some());

        node.close_session(42).await;
        assert!(node.session(42).await.is_none());
    }

    #[tokio::test]
    async fn shutdown_runs_hooks_in_reverse_registration_order() {
        let node = node();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let o1 = order.clone();
        node.on_before_shutdown(move || o1.lock().unwrap().push(1));
        let o2 = order.clone();
        node.on_before_shutdown(move || o2.lock().unwrap().push(2));
        node.shutdown().await;
        assert_eq!(*order.lock().unwrap(), vec![2, 1]);
    }
}
