//! Master responsibilities: `Register`/`Unregister`, broadcasting
//! `NewMember`/`DelMember` to the rest of the cluster, and persisting the
//! membership snapshot after every mutation. Grounded on the original's
//! `cluster/cluster.go`/`cluster/node.go` register/unregister flow.

use std::sync::Arc;

use tokio::sync::RwLock;
use tonic::{Request, Response, Status};

use crate::client;
use crate::model::Member;
use crate::persistence::Persistence;
use crate::proto::master_server::Master;
use crate::proto::{Ack, RegisterRequest, RegisterResponse, UnregisterRequest};

pub struct MasterRegistry {
    members: RwLock<Vec<Member>>,
    persistence: Arc<dyn Persistence>,
}

impl MasterRegistry {
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        MasterRegistry { members: RwLock::new(Vec::new()), persistence }
    }

    /// Load a prior snapshot from the persistence collaborator. Call once at
    /// startup before serving RPCs.
    pub async fn restore(&self) -> std::io::Result<()> {
        let restored = self.persistence.load().await?;
        *self.members.write().await = restored;
        Ok(())
    }

    pub async fn snapshot(&self) -> Vec<Member> {
        self.members.read().await.clone()
    }

    /// Append `member`, persist, broadcast `NewMember` to the peers that
    /// were already registered, and return the full post-join snapshot (the
    /// new member receives this as its own Register response).
    pub async fn register(&self, member: Member) -> Vec<Member> {
        let existing = {
            let mut members = self.members.write().await;
            let existing = members.clone();
            members.push(member.clone());
            existing
        };
        if let Err(e) = self.persistence.save(&self.members.read().await).await {
            tracing::error!(error = %e, "failed to persist membership after register");
        }
        client::broadcast_new_member(&existing, &member).await;
        self.snapshot().await
    }

    /// Remove the member at `service_addr`, persist, and broadcast
    /// `DelMember` to everyone left.
    pub async fn unregister(&self, service_addr: &str) {
        {
            let mut members = self.members.write().await;
            members.retain(|m| m.service_addr != service_addr);
        }
        if let Err(e) = self.persistence.save(&self.members.read().await).await {
            tracing::error!(error = %e, "failed to persist membership after unregister");
        }
        let remaining = self.snapshot().await;
        client::broadcast_del_member(&remaining, service_addr).await;
    }
}

pub struct MasterService {
    registry: Arc<MasterRegistry>,
}

impl MasterService {
    pub fn new(registry: Arc<MasterRegistry>) -> Self {
        MasterService { registry }
    }
}

#[tonic::async_trait]
impl Master for MasterService {
    async fn register(&self, request: Request<RegisterRequest>) -> Result<Response<RegisterResponse>, Status> {
        let member = request
            .into_inner()
            .member
            .ok_or_else(|| Status::invalid_argument("member is required"))?;
        let members = self.registry.register(member.into()).await;
        Ok(Response::new(RegisterResponse { members: members.into_iter().map(Into::into).collect() }))
    }

    async fn unregister(&self, request: Request<UnregisterRequest>) -> Result<Response<Ack>, Status> {
        self.registry.unregister(&request.into_inner().service_addr).await;
        Ok(Response::new(Ack {}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::NullPersistence;
    use std::collections::HashMap;

    fn member(addr: &str) -> Member {
        Member {
            label: addr.to_string(),
            version: "1.0-aaaaaaaa".to_string(),
            service_addr: addr.to_string(),
            services: vec!["EchoService".to_string()],
            dictionary: HashMap::new(),
            is_master: false,
        }
    }

    #[tokio::test]
    async fn register_returns_the_full_post_join_snapshot() {
        let registry = MasterRegistry::new(Arc::new(NullPersistence));
        let after_first = registry.register(member("127.0.0.1:9002")).await;
        assert_eq!(after_first.len(), 1);
        let after_second = registry.register(member("127.0.0.1:9003")).await;
        assert_eq!(after_second.len(), 2);
    }

    #[tokio::test]
    async fn unregister_removes_by_service_addr() {
        let registry = MasterRegistry::new(Arc::new(NullPersistence));
        registry.register(member("127.0.0.1:9002")).await;
        registry.register(member("127.0.0.1:9003")).await;
        registry.unregister("127.0.0.1:9002").await;
        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].service_addr, "127.0.0.1:9003");
    }
}
