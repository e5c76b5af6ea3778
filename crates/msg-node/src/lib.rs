//! Dispatch, connection ownership, and lifecycle for a gate or backend
//! process: the layer that turns decoded wire messages into running
//! handler tasks and wires cluster membership into local routing state.

pub mod acceptor;
pub mod agent;
pub mod debug;
pub mod error;
pub mod handler;
pub mod http_bridge;
pub mod node;
pub mod service;

pub use acceptor::Acceptor;
pub use agent::{Agent, AgentCounters};
pub use error::NodeError;
pub use handler::LocalHandler;
pub use node::{Node, NodeConfig};
pub use service::{HandlerFn, Service, ServiceBuilder};
