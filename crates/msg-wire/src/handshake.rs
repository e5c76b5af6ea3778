//! Handshake payload: JSON body carried in the `handshake-ack` packet.
//!
//! Supplemented from the original source, which lets a handshake ack carry
//! the route dictionary so clients can opt into compressed routing on their
//! very first message rather than learning codes lazily.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Sent by the client in the `handshake` packet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandshakeRequest {
    #[serde(default)]
    pub version: Option<String>,
}

/// Sent by the gate in the `handshake-ack` packet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HandshakeAck {
    pub code: u16,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub route_dict: HashMap<String, u16>,
}

impl HandshakeAck {
    pub fn ok(route_dict: HashMap<String, u16>) -> Self {
        HandshakeAck { code: 200, route_dict }
    }
}

pub fn encode_request(req: &HandshakeRequest) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(req).map_err(|e| CodecError::SerializationFailure(e.to_string()))
}

pub fn decode_request(bytes: &[u8]) -> Result<HandshakeRequest, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::SerializationFailure(e.to_string()))
}

pub fn encode_ack(ack: &HandshakeAck) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(ack).map_err(|e| CodecError::SerializationFailure(e.to_string()))
}

pub fn decode_ack(bytes: &[u8]) -> Result<HandshakeAck, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::SerializationFailure(e.to_string()))
}
