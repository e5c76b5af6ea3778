//! HTTP bridge (spec.md §6): requests to `/<route>` either upgrade to a
//! full framed WebSocket connection at `/ws`, or are served as a one-shot
//! request/response exchange that skips the framed wire protocol entirely.
//! Grounded on the axum/`ws_forwarder.rs` upgrade pattern and on
//! `msg-node::agent`'s write-loop shape for the WS connection's outbound side.

use std::sync::Arc;

use axum::extract::ws::{Message as WsFrame, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use msg_runtime::{Entity, EntityKind, OutboundCommand, Session};
use msg_wire::{codec::Decoder, Message};

use crate::agent::encode_data_packet;
use crate::node::{now_unix_secs, Node};

pub fn router(node: Arc<Node>) -> Router {
    Router::new().route("/ws", get(ws_upgrade_handler)).route("/:route", post(one_shot_handler)).with_state(node)
}

async fn ws_upgrade_handler(ws: WebSocketUpgrade, State(node): State<Arc<Node>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, node))
}

async fn handle_ws(socket: WebSocket, node: Arc<Node>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let id = node.next_session_id();
    let (entity, mut outbound_rx) = Entity::new(EntityKind::Gate, "ws".to_string());
    let session = Arc::new(Session::new(id, entity, now_unix_secs()));
    node.track_session(session.clone()).await;

    let rpc_session = session.clone();
    let rpc_local_handler = node.local_handler.clone();
    session.set_rpc_sink(Arc::new(move |msg| {
        let rpc_session = rpc_session.clone();
        let rpc_local_handler = rpc_local_handler.clone();
        Box::pin(async move {
            if let Err(e) = rpc_local_handler.process_message(&rpc_session, msg).await {
                tracing::warn!(error = %e, "in-line rpc dispatch failed");
            }
        })
    }));

    let dictionary = node.dictionary.clone();
    let outbound_pipeline = node.outbound.clone();
    let write_session = session.clone();
    let writer = tokio::spawn(async move {
        while let Some(cmd) = outbound_rx.recv().await {
            let frame = match cmd {
                OutboundCommand::Close => break,
                OutboundCommand::Message(msg) => {
                    if let Err(e) = outbound_pipeline.process(&write_session, &msg) {
                        tracing::warn!(error = %e, route = %msg.route, "outbound pipeline aborted ws message");
                        continue;
                    }
                    encode_data_packet(&msg, &dictionary, write_session.is_compressed()).await
                }
            };
            match frame {
                Ok(bytes) => {
                    if ws_tx.send(WsFrame::Binary(bytes.to_vec())).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "ws frame encode failed"),
            }
        }
        let _ = ws_tx.close().await;
    });

    let mut decoder = Decoder::new();
    while let Some(Ok(frame)) = ws_rx.next().await {
        let bytes = match frame {
            WsFrame::Binary(b) => b,
            WsFrame::Close(_) => break,
            _ => continue,
        };
        match decoder.decode(&bytes) {
            Ok(packets) => {
                for packet in packets {
                    if let Err(e) = node.local_handler.process_packet(&session, packet, now_unix_secs()).await {
                        tracing::warn!(error = %e, "dispatch failed for ws packet");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed ws frame, closing connection");
                break;
            }
        }
    }

    node.remove_session(id).await;
    let _ = session.close();
    writer.abort();
}

/// A one-shot `/<route>` POST: run the inbound pipeline and await the
/// handler directly rather than submitting it to a scheduler, since there is
/// no ongoing session to serialize future messages against.
async fn one_shot_handler(Path(route): Path<String>, State(node): State<Arc<Node>>, body: axum::body::Bytes) -> impl IntoResponse {
    let Some(handler) = node.local_handler.local_handler(&route) else {
        return (StatusCode::NOT_FOUND, format!("no local handler for {route}")).into_response();
    };
    let handler = handler.clone();

    let (entity, _rx) = Entity::new(EntityKind::Gate, "http".to_string());
    let session = Arc::new(Session::new(node.next_session_id(), entity, now_unix_secs()));
    let msg = Message::request(0, route, body.to_vec());
    if let Err(e) = node.inbound.process(&session, &msg) {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }

    match handler(session, msg.data).await {
        Ok(Some(reply)) => (StatusCode::OK, reply).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
