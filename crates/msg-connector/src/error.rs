//! Hand-rolled `Display`/`Error` enum, matching `services/forwarder/src/uplink.rs`'s
//! `UplinkError` — the teacher's style at the outermost client-library boundary.

#[derive(Debug)]
pub enum ConnectorError {
    Connect(String),
    Io(String),
    Codec(msg_wire::CodecError),
    Disconnected,
    Closed,
}

impl std::fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectorError::Connect(s) => write!(f, "connect error: {s}"),
            ConnectorError::Io(s) => write!(f, "io error: {s}"),
            ConnectorError::Codec(e) => write!(f, "codec error: {e}"),
            ConnectorError::Disconnected => write!(f, "connection closed by peer"),
            ConnectorError::Closed => write!(f, "connector closed"),
        }
    }
}

impl std::error::Error for ConnectorError {}

impl From<msg_wire::CodecError> for ConnectorError {
    fn from(e: msg_wire::CodecError) -> Self {
        ConnectorError::Codec(e)
    }
}
