//! Dispatch: the registries a node consults to decide whether an inbound
//! message is served by a handler in this process or forwarded to a peer,
//! plus the processing steps that get a decoded packet to a running task.
//! Grounded on the original's `cluster/handler.go`.
//!
//! `localServices`/`localHandlers` are populated once via [`LocalHandler::register`]
//! before the node starts serving traffic and read lock-free afterwards, per
//! spec: they live as plain fields, not behind a lock. `remoteServices` and
//! `versionDict` change for the lifetime of the process as members join and
//! leave, so they're behind a `tokio::sync::RwLock`, matching the "readers
//! never block each other" requirement.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use msg_cluster::{client, Member, MembershipObserver};
use msg_runtime::{GlobalScheduler, HashScheduler, Pipeline, Session};
use msg_wire::{message, short_version, Message, MessageType, Packet, RouteDictionary};
use rand::seq::SliceRandom;
use tokio::sync::RwLock;

use crate::error::NodeError;
use crate::service::{HandlerFn, Service};

pub struct LocalHandler {
    /// This node's own `serviceAddr`, advertised to backends so they know
    /// where to forward Push/Response for a session they don't own.
    node_addr: String,
    local_services: HashMap<String, Service>,
    local_handlers: HashMap<String, HandlerFn>,
    remote_services: RwLock<HashMap<String, HashMap<String, Vec<Member>>>>,
    version_dict: RwLock<HashMap<u32, String>>,
    dictionary: Arc<RwLock<RouteDictionary>>,
    next_code: AtomicU16,
    inbound: Arc<Pipeline>,
    global_scheduler: Arc<GlobalScheduler>,
}

impl LocalHandler {
    pub fn new(
        node_addr: impl Into<String>,
        dictionary: Arc<RwLock<RouteDictionary>>,
        inbound: Arc<Pipeline>,
        global_scheduler: Arc<GlobalScheduler>,
    ) -> Self {
        LocalHandler {
            node_addr: node_addr.into(),
            local_services: HashMap::new(),
            local_handlers: HashMap::new(),
            remote_services: RwLock::new(HashMap::new()),
            version_dict: RwLock::new(HashMap::new()),
            dictionary,
            next_code: AtomicU16::new(1),
            inbound,
            global_scheduler,
        }
    }

    /// Flatten `service`'s handlers into `"Service.Method"` routes, assigning
    /// each a stable 16-bit code in the shared dictionary. Must be called
    /// before the node starts accepting traffic; rejects a service name
    /// already registered with `DuplicateService`.
    pub async fn register(&mut self, service: Service) -> Result<(), NodeError> {
        if self.local_services.contains_key(&service.name) {
            return Err(NodeError::DuplicateService(service.name));
        }
        let mut dict = self.dictionary.write().await;
        for method in service.method_names() {
            let route = format!("{}.{}", service.name, method);
            let code = self.next_code.fetch_add(1, Ordering::SeqCst);
            dict.insert(route.clone(), code);
            let handler = service.handler(method).expect("method_names is derived from handlers").clone();
            self.local_handlers.insert(route, handler);
        }
        drop(dict);
        self.local_services.insert(service.name.clone(), service);
        Ok(())
    }

    /// `route`'s handler if this process serves it locally.
    pub fn local_handler(&self, route: &str) -> Option<&HandlerFn> {
        self.local_handlers.get(route)
    }

    /// The names this node advertises in its own `MemberInfo` at register
    /// time.
    pub fn service_names(&self) -> Vec<String> {
        self.local_services.keys().cloned().collect()
    }

    /// Close the global scheduler and every service's dedicated scheduler.
    /// Called from `Node::shutdown`.
    pub async fn close_schedulers(&self) {
        self.global_scheduler.close().await;
        for service in self.local_services.values() {
            if let Some(shard) = &service.scheduler {
                shard.close().await;
            }
        }
    }

    fn service_scheduler(&self, service_name: &str) -> Option<Arc<HashScheduler>> {
        self.local_services.get(service_name).and_then(|s| s.scheduler.clone())
    }

    async fn add_member(&self, member: Member) {
        {
            let mut remote = self.remote_services.write().await;
            for service in &member.services {
                remote
                    .entry(service.clone())
                    .or_default()
                    .entry(member.version.clone())
                    .or_default()
                    .push(member.clone());
            }
        }
        if !member.version.is_empty() {
            let ver = short_version(&member.version);
            self.version_dict.write().await.insert(ver, member.version.clone());
        }
        let snapshot: HashMap<String, u16> =
            member.dictionary.iter().map(|(route, code)| (route.clone(), *code as u16)).collect();
        self.dictionary.write().await.merge(&snapshot);
        tracing::info!(service_addr = %member.service_addr, label = %member.label, "member joined");
    }

    /// All versions of `service` known cluster-wide, plus `local_version`
    /// if this process serves `service` itself. Supplemented from the
    /// original's `LocalHandler.FindVersions`.
    pub async fn find_versions(&self, service: &str, local_version: &str) -> Vec<String> {
        let mut versions: Vec<String> =
            self.remote_services.read().await.get(service).map(|by_version| by_version.keys().cloned().collect()).unwrap_or_default();
        if self.local_services.contains_key(service) && !local_version.is_empty() && !versions.iter().any(|v| v == local_version) {
            versions.push(local_version.to_string());
        }
        versions
    }

    async fn del_member(&self, service_addr: &str) {
        let mut remote = self.remote_services.write().await;
        for versions in remote.values_mut() {
            for members in versions.values_mut() {
                members.retain(|m| m.service_addr != service_addr);
            }
        }
        tracing::info!(service_addr, "member left");
    }

    /// Decode a data packet, touch the session's heartbeat clock, and
    /// dispatch the decoded message. Latches the session's sticky
    /// `compressed` flag from this packet if it hasn't been set yet — per
    /// spec, the first packet decides it for the session's entire lifetime,
    /// and outbound encoding must honor that flag rather than re-deriving it
    /// from the live (ever-growing) dictionary.
    pub async fn process_packet(&self, session: &Arc<Session>, packet: Packet, now_unix_secs: u64) -> Result<(), NodeError> {
        if let Ok(compressed) = message::is_compressed(&packet.payload) {
            session.set_compressed_from_first_packet(compressed);
        }
        let dict = self.dictionary.read().await;
        let msg = message::decode(&packet.payload, &dict, session.short_ver())?;
        drop(dict);
        session.touch_heartbeat(now_unix_secs);
        self.process_message(session, msg).await
    }

    pub async fn process_message(&self, session: &Arc<Session>, msg: Message) -> Result<(), NodeError> {
        if !matches!(msg.kind, MessageType::Request | MessageType::Notify) {
            tracing::warn!(route = %msg.route, kind = ?msg.kind, "dropping message of unroutable type");
            return Err(NodeError::InvalidMessageType(msg.kind));
        }
        if self.local_handlers.contains_key(&msg.route) {
            self.local_process(session, msg).await
        } else {
            self.remote_process(session, msg).await
        }
    }

    fn service_name(route: &str) -> &str {
        route.split('.').next().unwrap_or(route)
    }

    /// Select a member serving `route` for `session`'s bound version (falling
    /// back to version-less members), forward the message, and drop it on
    /// dial/RPC failure rather than retrying — the framework makes no
    /// delivery guarantee across a cluster hop.
    async fn remote_process(&self, session: &Arc<Session>, msg: Message) -> Result<(), NodeError> {
        let service_name = Self::service_name(&msg.route);
        let target_addr = {
            let remote = self.remote_services.read().await;
            let Some(by_version) = remote.get(service_name) else {
                return Err(NodeError::MemberNotFound(service_name.to_string()));
            };

            let version_dict = self.version_dict.read().await;
            let resolved_version = version_dict.get(&session.short_ver()).cloned().unwrap_or_default();
            let eligible = by_version
                .get(&resolved_version)
                .filter(|m| !m.is_empty())
                .or_else(|| by_version.get(""))
                .ok_or_else(|| NodeError::MemberNotFound(service_name.to_string()))?;
            if eligible.is_empty() {
                return Err(NodeError::MemberNotFound(service_name.to_string()));
            }

            if let Some(bound) = session.router().find(service_name) {
                bound
            } else {
                let chosen = eligible.choose(&mut rand::thread_rng()).expect("checked non-empty above");
                session.router().bind(service_name, &chosen.service_addr)
            }
        };

        let result = match msg.kind {
            MessageType::Request => {
                client::forward_request(
                    &target_addr,
                    &self.node_addr,
                    session.id(),
                    msg.id,
                    session.uid(),
                    session.short_ver(),
                    &msg.route,
                    msg.data,
                    session.remote_addr(),
                )
                .await
            }
            MessageType::Notify => {
                client::forward_notify(
                    &target_addr,
                    &self.node_addr,
                    session.id(),
                    session.uid(),
                    session.short_ver(),
                    &msg.route,
                    msg.data,
                    session.remote_addr(),
                )
                .await
            }
            _ => unreachable!("process_message only forwards Request/Notify"),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, route = %msg.route, addr = %target_addr, "remote dispatch failed, message dropped");
        }
        Ok(())
    }

    /// Run the inbound pipeline, then hand the handler invocation to the
    /// service's dedicated scheduler (or the node's global scheduler) as a
    /// task, so handlers for one service never interleave with each other.
    pub async fn local_process(&self, session: &Arc<Session>, msg: Message) -> Result<(), NodeError> {
        self.inbound.process(session, &msg)?;

        let handler =
            self.local_handlers.get(&msg.route).ok_or_else(|| NodeError::MemberNotFound(msg.route.clone()))?.clone();
        let service_name = Self::service_name(&msg.route).to_string();
        let scheduler = self.service_scheduler(&service_name);

        let session_id = session.id();
        let task_session = session.clone();
        let mid = msg.id;
        let kind = msg.kind;
        let route = msg.route.clone();
        let data = msg.data;
        let task: msg_runtime::Task = Box::pin(async move {
            task_session.set_last_mid(mid);
            match handler(task_session.clone(), data).await {
                Ok(Some(reply)) if kind == MessageType::Request => {
                    if let Err(e) = task_session.response(reply) {
                        tracing::warn!(error = %e, %route, "failed to deliver handler response");
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, %route, "handler returned an error"),
            }
        });

        match scheduler {
            Some(shard) => shard.schedule(&session_id, task),
            None => self.global_scheduler.schedule(task),
        }
        Ok(())
    }
}

#[async_trait]
impl MembershipObserver for LocalHandler {
    async fn on_new_member(&self, member: Member) {
        self.add_member(member).await;
    }

    async fn on_del_member(&self, service_addr: &str) {
        self.del_member(service_addr).await;
    }
}
