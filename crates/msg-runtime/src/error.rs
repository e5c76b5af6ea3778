use thiserror::Error;

/// Errors raised by session and agent-facing operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("write to a closed or broken connection")]
    BrokenPipe,

    #[error("outbound backlog saturated")]
    BufferExceed,

    #[error("session already closed")]
    CloseClosedSession,

    #[error("pipeline stage aborted processing: {0}")]
    PipelineAbort(String),

    #[error("payload serialization failed: {0}")]
    SerializationFailure(#[from] msg_wire::CodecError),
}
