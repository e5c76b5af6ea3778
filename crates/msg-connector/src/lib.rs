//! Client library: a thin, standalone mirror of `msg-wire`'s framing and
//! message codec for talking to a gate node directly, without depending on
//! `msg-runtime`/`msg-node` (which assume a server-side session store).

mod connector;
mod error;

pub use connector::{Callback, Connector, PushCallback};
pub use error::ConnectorError;
pub use msg_wire::handshake::HandshakeRequest;
