//! Application-level cluster gossip layered on the `Member` gRPC channel.
//!
//! Open question resolved (spec.md §9): the source admits two
//! `Convention.Establish` signatures; this workspace implements only the
//! canonical one, `Establish(Transmitter) -> Acceptor` — the caller gets a
//! `Transmitter` to send with, and returns the closure that reacts to
//! incoming signals. The two-argument variant (pre-built, possibly-unset
//! Acceptor) is not carried forward; it reads as a vestigial API in the
//! source. `msg-node::node` owns the actual `establish` call since it also
//! owns where the returned Acceptor gets wired into `MemberRpcHandler`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::client;
use crate::error::ClusterError;
use crate::model::Member;

/// Supplies the current membership view a `Transmitter` unicasts/multicasts
/// against. Implemented by `msg-node`'s `LocalHandler` over its
/// `remoteServices` index.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn members(&self) -> Vec<Member>;
    async fn member_by_label(&self, label: &str) -> Option<Member>;
}

/// Handed to convention users via `Establish`. Wraps `PerformConvention`
/// unicast/multicast over the current membership.
pub struct Transmitter {
    directory: Arc<dyn MemberDirectory>,
}

impl Transmitter {
    pub fn new(directory: Arc<dyn MemberDirectory>) -> Self {
        Transmitter { directory }
    }

    /// `Transmitter.Unicast(label, sig, msg)`. Fails with `MemberNotFound`
    /// if no member is registered under `label`.
    pub async fn unicast(&self, label: &str, signal: u32, payload: Vec<u8>) -> Result<Vec<u8>, ClusterError> {
        let member = self
            .directory
            .member_by_label(label)
            .await
            .ok_or_else(|| ClusterError::MemberNotFound(label.to_string()))?;
        let resp = client::unicast(&member, signal, payload).await?;
        Ok(resp.payload)
    }

    /// `Transmitter.Multicast(sig, msg)`: best-effort fan-out to every known
    /// member; unreachable peers are skipped, not reported.
    pub async fn multicast(&self, signal: u32, payload: Vec<u8>) {
        let members = self.directory.members().await;
        client::multicast(&members, signal, payload).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FixedDirectory(Mutex<Vec<Member>>);

    #[async_trait]
    impl MemberDirectory for FixedDirectory {
        async fn members(&self) -> Vec<Member> {
            self.0.lock().unwrap().clone()
        }
        async fn member_by_label(&self, label: &str) -> Option<Member> {
            self.0.lock().unwrap().iter().find(|m| m.label == label).cloned()
        }
    }

    #[tokio::test]
    async fn unicast_to_unknown_label_fails_with_member_not_found() {
        let directory = Arc::new(FixedDirectory(Mutex::new(Vec::new())));
        let transmitter = Transmitter::new(directory);
        let err = transmitter.unicast("ghost", 1, vec![]).await.unwrap_err();
        assert!(matches!(err, ClusterError::MemberNotFound(label) if label == "ghost"));
    }

    #[tokio::test]
    async fn multicast_with_no_members_is_a_no_op() {
        let directory = Arc::new(FixedDirectory(Mutex::new(Vec::new())));
        let transmitter = Transmitter::new(directory);
        transmitter.multicast(1, vec![]).await;
    }

    #[allow(dead_code)]
    fn member_fixture() -> Member {
        Member {
            label: "backend-1".to_string(),
            version: String::new(),
            service_addr: "127.0.0.1:9002".to_string(),
            services: Vec::new(),
            dictionary: HashMap::new(),
            is_master: false,
        }
    }
}
