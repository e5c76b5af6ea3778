//! Cluster membership and the intra-cluster gRPC surface: a `Master`
//! registry service, a `Member` service adapter, application-level
//! `Convention` gossip, and the membership persistence collaborator.

pub mod client;
pub mod convention;
pub mod error;
pub mod master;
pub mod member;
pub mod model;
pub mod persistence;
pub mod proto;
pub mod traits;

pub use convention::{MemberDirectory, Transmitter};
pub use error::ClusterError;
pub use master::{MasterRegistry, MasterService};
pub use member::MemberService;
pub use model::Member;
pub use persistence::{FilePersistence, NullPersistence, Persistence};
pub use traits::{MemberRpcHandler, MembershipObserver};
