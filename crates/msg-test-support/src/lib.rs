//! Test-only harnesses for standing up a cluster in-process: a `MockMaster`
//! hosting the real `Master` gRPC service over a random port, and a
//! `MockNode` hosting a `Member` gRPC service plus (for gates) a raw TCP
//! listener speaking the framed wire protocol. Mirrors the shape of
//! `crates/rt-test-utils`'s `MockWsServer`/`MockWsClient` pair, adapted for
//! relaymesh's binary framing and gRPC cluster surface.

mod mock_master;
mod mock_node;

pub use mock_master::MockMaster;
pub use mock_node::MockNode;
