//! An in-process `Master` service bound to an OS-assigned port, for tests
//! that need real membership registration/broadcast round trips instead of
//! a hand-rolled stand-in. Grounded on `crates/rt-test-utils::mock_ws_server`'s
//! bind-random-port-and-spawn-an-accept-task shape.

use std::net::SocketAddr;
use std::sync::Arc;

use msg_cluster::proto::master_server::MasterServer;
use msg_cluster::{MasterRegistry, MasterService, NullPersistence};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

/// A running `Master` service. Dropping this does not stop the server;
/// call [`MockMaster::shutdown`] (or just let the test process exit).
pub struct MockMaster {
    pub addr: SocketAddr,
    pub registry: Arc<MasterRegistry>,
    server: JoinHandle<()>,
}

impl MockMaster {
    /// Bind to `127.0.0.1:0`, start serving, and return once the listener is
    /// live. Backed by `NullPersistence` — tests that care about restart
    /// recovery exercise `FilePersistence` directly against `MasterRegistry`.
    pub async fn spawn() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let registry = Arc::new(MasterRegistry::new(Arc::new(NullPersistence)));
        let service = MasterServer::new(MasterService::new(registry.clone()));

        let server = tokio::spawn(async move {
            let incoming = TcpListenerStream::new(listener);
            if let Err(e) = Server::builder().add_service(service).serve_with_incoming(incoming).await {
                tracing::warn!(error = %e, "mock master server exited");
            }
        });

        Ok(MockMaster { addr, registry, server })
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn shutdown(self) {
        self.server.abort();
    }
}
