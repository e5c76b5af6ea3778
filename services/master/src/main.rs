mod config;

use std::env;
use std::sync::Arc;

use msg_cluster::proto::master_server::MasterServer;
use msg_cluster::{FilePersistence, MasterRegistry, MasterService, NullPersistence, Persistence};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(log_level)).init();

    let config_path = env::var("RELAYMESH_MASTER_CONFIG").unwrap_or_else(|_| "/etc/relaymesh/master.toml".to_owned());
    let cfg = config::load_config_from_path(std::path::Path::new(&config_path)).expect("failed to load master config");

    let persistence: Arc<dyn Persistence> = match &cfg.persistence_path {
        Some(path) => Arc::new(FilePersistence::new(path.clone())),
        None => Arc::new(NullPersistence),
    };
    let registry = Arc::new(MasterRegistry::new(persistence));
    registry.restore().await;
    info!(members = registry.snapshot().await.len(), "membership restored");

    if let Some(debug_bind) = cfg.debug_bind.clone() {
        tokio::spawn(async move {
            match tokio::net::TcpListener::bind(&debug_bind).await {
                Ok(listener) => {
                    if let Err(e) = axum::serve(listener, debug_router()).await {
                        tracing::warn!(error = %e, "debug listener exited");
                    }
                }
                Err(e) => tracing::warn!(error = %e, addr = %debug_bind, "debug listener failed to bind"),
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(&cfg.bind).await.expect("failed to bind master listener");
    info!(addr = %cfg.bind, "master listening");
    let service = MasterServer::new(MasterService::new(registry));
    Server::builder()
        .add_service(service)
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown_signal())
        .await
        .expect("master server error");
    info!("master shut down gracefully");
}

fn debug_router() -> axum::Router {
    use axum::response::IntoResponse;
    use axum::routing::get;

    async fn healthz() -> impl IntoResponse {
        "ok"
    }
    async fn readyz() -> impl IntoResponse {
        "ok"
    }

    axum::Router::new().route("/healthz", get(healthz)).route("/readyz", get(readyz))
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate()).expect("failed to install SIGTERM handler").recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
