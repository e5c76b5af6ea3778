use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Session(#[from] msg_runtime::SessionError),

    #[error(transparent)]
    Codec(#[from] msg_wire::CodecError),

    #[error(transparent)]
    Cluster(#[from] msg_cluster::ClusterError),

    #[error("a service named {0} is already registered")]
    DuplicateService(String),

    #[error("no backend registered for service {0}")]
    MemberNotFound(String),

    #[error("message type outside {{Request,Notify}}: {0:?}")]
    InvalidMessageType(msg_wire::MessageType),

    #[error("payload serialization failed: {0}")]
    SerializationFailure(String),
}
