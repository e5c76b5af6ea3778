//! The master's membership store, named in `spec.md` §1 as an out-of-scope
//! external collaborator with a narrow contract: an opaque blob that must
//! round-trip through whatever wrote it. Kept here (rather than omitted
//! entirely) because `Master::register`/`unregister` need *something* to
//! call after every mutation, and a no-op + a real file-backed
//! implementation both demonstrate the contract cheaply.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::model::Member;

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn save(&self, members: &[Member]) -> std::io::Result<()>;
    async fn load(&self) -> std::io::Result<Vec<Member>>;
}

/// The default: membership is rebuilt purely from `Register` calls after a
/// restart. Matches running the master fresh in tests.
#[derive(Debug, Default)]
pub struct NullPersistence;

#[async_trait]
impl Persistence for NullPersistence {
    async fn save(&self, _members: &[Member]) -> std::io::Result<()> {
        Ok(())
    }

    async fn load(&self) -> std::io::Result<Vec<Member>> {
        Ok(Vec::new())
    }
}

/// Serializes the membership snapshot as JSON to a single file, overwriting
/// it on every save. Adequate for a single master process; not a WAL.
#[derive(Debug)]
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FilePersistence { path: path.into() }
    }
}

#[async_trait]
impl Persistence for FilePersistence {
    async fn save(&self, members: &[Member]) -> std::io::Result<()> {
        let body = serde_json::to_vec_pretty(members)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tokio::fs::write(&self.path, body).await
    }

    async fn load(&self) -> std::io::Result<Vec<Member>> {
        match tokio::fs::read(&self.path).await {
            Ok(body) => serde_json::from_slice(&body)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn file_persistence_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("members.json");
        let persistence = FilePersistence::new(&path);

        let members = vec![Member {
            label: "backend-1".to_string(),
            version: "1.0-aaaaaaaa".to_string(),
            service_addr: "127.0.0.1:9002".to_string(),
            services: vec!["EchoService".to_string()],
            dictionary: HashMap::new(),
            is_master: false,
        }];
        persistence.save(&members).await.unwrap();
        assert_eq!(persistence.load().await.unwrap(), members);
    }

    #[tokio::test]
    async fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = FilePersistence::new(dir.path().join("absent.json"));
        assert_eq!(persistence.load().await.unwrap(), Vec::<Member>::new());
    }
}
