use thiserror::Error;

/// Errors surfaced by the packet and message codecs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    #[error("unknown packet type byte {0}")]
    UnknownPacketType(u8),

    #[error("compressed route code {0} not found in dictionary")]
    UnknownRouteCode(u16),

    #[error("message type {0} is outside {{Request,Response,Notify,Push}}")]
    InvalidMessageType(u8),

    #[error("payload serialization failed: {0}")]
    SerializationFailure(String),
}
