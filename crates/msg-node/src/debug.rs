//! A minimal debug HTTP listener, separate from the client-facing bridge —
//! supplemented from the original's `Options.DebugAddr`. Opt-in: a node
//! only serves this if `NodeConfig::debug_addr` is set.

use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

pub fn router() -> Router {
    Router::new().route("/healthz", get(healthz)).route("/readyz", get(readyz))
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn readyz() -> impl IntoResponse {
    "ok"
}
