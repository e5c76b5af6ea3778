//! Session, pipeline, scheduler, and network-entity abstractions shared by
//! the gate and backend binaries.

pub mod entity;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod router;
pub mod scheduler;
pub mod session;

pub use entity::{Entity, EntityKind, OutboundCommand, RpcSink};
pub use error::SessionError;
pub use events::{Callback, EventRegistry};
pub use pipeline::{Pipeline, Stage};
pub use router::Router;
pub use scheduler::{GlobalScheduler, HashScheduler, Task};
pub use session::{Session, SessionState};
