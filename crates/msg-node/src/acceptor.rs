//! Backend-side session shim. Created the first time a backend processes a
//! message for a session it hasn't seen; plays the role of a gate-side
//! `Agent` by forwarding Push/Response/Close to the owning gate over RPC.
//! Grounded on the original's `cluster/acceptor.go`.

use std::sync::Arc;

use msg_cluster::client;
use msg_runtime::{Entity, EntityKind, OutboundCommand, Session};

use crate::handler::LocalHandler;

pub struct Acceptor {
    pub gate_addr: String,
}

impl Acceptor {
    /// Build the shadow session and spawn the task that forwards its
    /// outbound traffic to `gate_addr`. `local_handler` is this backend's
    /// own dispatch handler, wired as the session's in-line RPC sink (spec.md
    /// §4.5: "RPC from the backend short-circuits through the backend's own
    /// handler" — never the gate's, and never over the wire).
    pub fn spawn(
        session_id: u64,
        gate_addr: String,
        remote_addr: String,
        local_handler: Arc<LocalHandler>,
        now_unix_secs: u64,
    ) -> (Arc<Session>, Arc<Acceptor>) {
        let (entity, mut rx) = Entity::new(EntityKind::Backend, remote_addr);
        let session = Arc::new(Session::new(session_id, entity, now_unix_secs));
        let acceptor = Arc::new(Acceptor { gate_addr: gate_addr.clone() });

        let rpc_session = session.clone();
        session.set_rpc_sink(Arc::new(move |msg| {
            let rpc_session = rpc_session.clone();
            let local_handler = local_handler.clone();
            Box::pin(async move {
                if let Err(e) = local_handler.process_message(&rpc_session, msg).await {
                    tracing::warn!(error = %e, "in-line rpc dispatch failed");
                }
            })
        }));

        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    OutboundCommand::Close => {
                        if let Err(e) = client::close_session_on_gate(&gate_addr, session_id).await {
                            tracing::warn!(error = %e, %gate_addr, session_id, "CloseSession RPC failed");
                        }
                        break;
                    }
                    OutboundCommand::Message(msg) => {
                        let result = match msg.kind {
                            msg_wire::MessageType::Response => {
                                client::response_to_gate(&gate_addr, session_id, msg.id, msg.data).await
                            }
                            _ => client::push_to_gate(&gate_addr, session_id, &msg.route, msg.data).await,
                        };
                        if let Err(e) = result {
                            tracing::warn!(error = %e, %gate_addr, session_id, "forwarding to gate failed");
                        }
                    }
                }
            }
        });

        (session, acceptor)
    }
}
