use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("no member found for label {0}")]
    MemberNotFound(String),

    #[error("failed to dial {addr}: {source}")]
    DialFailure { addr: String, #[source] source: tonic::transport::Error },

    #[error("rpc to {addr} failed: {status}")]
    RpcFailure { addr: String, status: Box<tonic::Status> },

    #[error("payload serialization failed: {0}")]
    SerializationFailure(String),

    #[error("a service named {0} is already registered")]
    DuplicateService(String),

    #[error("no live session {0} on this gate")]
    SessionNotFound(u64),
}
