//! `Node::shutdown` runs lifecycle hooks in reverse registration order, then
//! unregisters from the master — the same sequence `services/backend` and
//! `services/gate` drive from their own `main.rs` on SIGTERM/Ctrl+C.
//!
//! # Coverage
//! 1. `on_before_shutdown` hooks run before `on_shutdown` hooks.
//! 2. Within each group, hooks run in reverse registration order.
//! 3. `shutdown` unregisters the node from the master, so a later
//!    `MasterRegistry::snapshot` no longer lists it.

use std::sync::{Arc, Mutex};

use msg_test_support::{MockMaster, MockNode};

#[tokio::test]
async fn shutdown_runs_hooks_in_reverse_order_then_unregisters() {
    let master = MockMaster::spawn().await.unwrap();
    let backend = MockNode::start_backend("backend-1", Some(&master.endpoint()), Vec::new()).await.unwrap();
    assert_eq!(master.registry.snapshot().await.len(), 1);

    let order = Arc::new(Mutex::new(Vec::new()));

    let before1 = order.clone();
    backend.node.on_before_shutdown(move || before1.lock().unwrap().push("before-1"));
    let before2 = order.clone();
    backend.node.on_before_shutdown(move || before2.lock().unwrap().push("before-2"));

    let after1 = order.clone();
    backend.node.on_shutdown(move || after1.lock().unwrap().push("shutdown-1"));
    let after2 = order.clone();
    backend.node.on_shutdown(move || after2.lock().unwrap().push("shutdown-2"));

    backend.node.shutdown().await;

    assert_eq!(*order.lock().unwrap(), vec!["before-2", "before-1", "shutdown-2", "shutdown-1"]);
    assert_eq!(master.registry.snapshot().await.len(), 0);

    backend.shutdown();
}
