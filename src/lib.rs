//! relaymesh: a distributed session-oriented messaging framework for
//! real-time servers. Re-exports the framework crates under one name so
//! applications — and this crate's own `tests/integration/*` — depend on a
//! single `relaymesh` crate instead of wiring `msg-wire`/`msg-runtime`/
//! `msg-cluster`/`msg-node`/`msg-connector` individually.

pub use msg_cluster as cluster;
pub use msg_connector as connector;
pub use msg_node as node;
pub use msg_runtime as runtime;
pub use msg_wire as wire;
