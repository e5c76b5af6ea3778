mod config;
mod listener;

use std::env;
use std::sync::Arc;

use msg_cluster::proto::member_server::MemberServer;
use msg_cluster::{MemberService, MembershipObserver as _};
use msg_node::{LocalHandler, Node, NodeConfig};
use msg_runtime::{GlobalScheduler, Pipeline};
use msg_wire::RouteDictionary;
use tokio::sync::RwLock;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(log_level)).init();

    let config_path = env::var("RELAYMESH_GATE_CONFIG").unwrap_or_else(|_| "/etc/relaymesh/gate.toml".to_owned());
    let cfg = config::load_config_from_path(std::path::Path::new(&config_path)).expect("failed to load gate config");

    let dictionary = Arc::new(RwLock::new(RouteDictionary::new()));
    let inbound = Arc::new(Pipeline::new());
    let outbound = Arc::new(Pipeline::new());
    // A gate typically serves no local services of its own: every route is
    // owned by a backend and reached through `LocalHandler::remote_process`.
    let local_handler =
        Arc::new(LocalHandler::new(cfg.member_bind.clone(), dictionary.clone(), inbound.clone(), Arc::new(GlobalScheduler::new())));

    let node_config = NodeConfig {
        label: cfg.label.clone(),
        version: cfg.version.clone(),
        service_addr: Some(cfg.member_bind.clone()),
        master_addr: cfg.master_addr.clone(),
        master_register_retry_interval: cfg.master_register_retry_interval,
        idle_session_timeout: cfg.idle_session_timeout,
        debug_addr: cfg.debug_bind.clone(),
    };
    let node = Arc::new(Node::new(node_config, local_handler.clone(), inbound, outbound, dictionary));

    if cfg.master_addr.is_some() {
        let members = node.register_with_master().await;
        for member in members {
            local_handler.on_new_member(member).await;
        }
        info!(master_addr = ?cfg.master_addr, "registered with master");
    }

    node.spawn_debug_listener();
    node.spawn_idle_sweeper();

    if let Some(http_bind) = cfg.http_bind.clone() {
        let bridge_node = node.clone();
        tokio::spawn(async move {
            let router = msg_node::http_bridge::router(bridge_node).layer(tower_http::trace::TraceLayer::new_for_http());
            match tokio::net::TcpListener::bind(&http_bind).await {
                Ok(listener) => {
                    if let Err(e) = axum::serve(listener, router).await {
                        tracing::warn!(error = %e, "http bridge exited");
                    }
                }
                Err(e) => tracing::warn!(error = %e, addr = %http_bind, "http bridge failed to bind"),
            }
        });
    }

    let member_listener = tokio::net::TcpListener::bind(&cfg.member_bind).await.expect("failed to bind member listener");
    let member_service = MemberServer::new(MemberService::new(local_handler, node.clone()));
    let (member_shutdown_tx, member_shutdown_rx) = tokio::sync::oneshot::channel();
    let member_server = tokio::spawn(async move {
        let shutdown = async {
            let _ = member_shutdown_rx.await;
        };
        if let Err(e) = Server::builder()
            .add_service(member_service)
            .serve_with_incoming_shutdown(TcpListenerStream::new(member_listener), shutdown)
            .await
        {
            tracing::warn!(error = %e, "member server exited");
        }
    });

    info!(addr = %cfg.client_bind, label = %cfg.label, "gate listening for clients");
    tokio::select! {
        result = listener::run(node.clone(), &cfg.client_bind) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "client listener failed");
            }
        }
        () = shutdown_signal() => {}
    }

    // Reverse of startup: hooks and master unregistration complete before the
    // member server is told to stop accepting and drain in flight calls.
    node.shutdown().await;
    let _ = member_shutdown_tx.send(());
    let _ = member_server.await;
    info!("gate shut down gracefully");
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
