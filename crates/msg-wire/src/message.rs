//! Application message codec: encodes the data-packet payload described by
//! the route-compression header, a variable-length message id, and a route
//! that is either a 2-byte dictionary code or a length-prefixed UTF-8 string.

use bytes::{Buf, BufMut, BytesMut};

use crate::dictionary::RouteDictionary;
use crate::error::CodecError;

const ROUTE_COMPRESSED_FLAG: u8 = 0b1000_0000;
const TYPE_MASK: u8 = 0b0111_0000;
const TYPE_SHIFT: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Request,
    Response,
    Notify,
    Push,
}

impl MessageType {
    fn from_bits(bits: u8) -> Result<Self, CodecError> {
        match bits {
            0 => Ok(MessageType::Request),
            1 => Ok(MessageType::Response),
            2 => Ok(MessageType::Notify),
            3 => Ok(MessageType::Push),
            other => Err(CodecError::InvalidMessageType(other)),
        }
    }

    fn as_bits(self) -> u8 {
        match self {
            MessageType::Request => 0,
            MessageType::Response => 1,
            MessageType::Notify => 2,
            MessageType::Push => 3,
        }
    }

    /// Request and Response carry a non-zero id and pair by it; Notify and
    /// Push may carry id 0 and omit the id field entirely on the wire.
    fn carries_id(self) -> bool {
        matches!(self, MessageType::Request | MessageType::Response)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub id: u64,
    pub route: String,
    pub short_ver: u32,
    pub data: Vec<u8>,
}

impl Message {
    pub fn request(id: u64, route: impl Into<String>, data: Vec<u8>) -> Self {
        Message { kind: MessageType::Request, id, route: route.into(), short_ver: 0, data }
    }

    pub fn response(id: u64, route: impl Into<String>, data: Vec<u8>) -> Self {
        Message { kind: MessageType::Response, id, route: route.into(), short_ver: 0, data }
    }

    pub fn notify(route: impl Into<String>, data: Vec<u8>) -> Self {
        Message { kind: MessageType::Notify, id: 0, route: route.into(), short_ver: 0, data }
    }

    pub fn push(route: impl Into<String>, data: Vec<u8>) -> Self {
        Message { kind: MessageType::Push, id: 0, route: route.into(), short_ver: 0, data }
    }
}

/// Encode `msg`. `compressed` gates whether the 2-byte dictionary code is
/// even considered: callers pass their session's sticky compressed flag (or,
/// for a connection that owns its own dictionary snapshot outright, whatever
/// that snapshot would resolve) rather than re-deriving it from the live
/// dictionary on every call, since the dictionary only ever grows and a
/// stale peer must never be handed a route it can't decode. When
/// `compressed` is true but `dict` has no code for `msg.route` (not yet
/// registered), the uncompressed form is used regardless.
pub fn encode(msg: &Message, dict: &RouteDictionary, compressed: bool) -> Result<BytesMut, CodecError> {
    let code = if compressed { dict.code_for(&msg.route) } else { None };
    let compressed = code.is_some();

    let mut buf = BytesMut::new();
    let header = (if compressed { ROUTE_COMPRESSED_FLAG } else { 0 }) | (msg.kind.as_bits() << TYPE_SHIFT);
    buf.put_u8(header);

    if msg.kind.carries_id() {
        put_varint(&mut buf, msg.id);
    }

    match code {
        Some(code) => buf.put_u16(code),
        None => {
            let route_bytes = msg.route.as_bytes();
            if route_bytes.len() > u8::MAX as usize {
                return Err(CodecError::MalformedPacket("uncompressed route exceeds 255 bytes"));
            }
            buf.put_u8(route_bytes.len() as u8);
            buf.put_slice(route_bytes);
        }
    }

    buf.put_slice(&msg.data);
    Ok(buf)
}

/// Reads just the route-compression bit off a data-packet payload's header
/// byte, without decoding the rest of the message. Used by
/// `LocalHandler::process_packet` to latch a session's sticky `compressed`
/// flag from its first packet.
pub fn is_compressed(payload: &[u8]) -> Result<bool, CodecError> {
    let header = *payload.first().ok_or(CodecError::MalformedPacket("empty message payload"))?;
    Ok(header & ROUTE_COMPRESSED_FLAG != 0)
}

/// Decode a data-packet payload into a `Message`. `short_ver` is attached by
/// the caller from session state; it is not carried over the wire per
/// message (the session binds it once at handshake).
pub fn decode(mut payload: &[u8], dict: &RouteDictionary, short_ver: u32) -> Result<Message, CodecError> {
    if payload.is_empty() {
        return Err(CodecError::MalformedPacket("empty message payload"));
    }
    let header = payload.get_u8();
    let compressed = header & ROUTE_COMPRESSED_FLAG != 0;
    let kind = MessageType::from_bits((header & TYPE_MASK) >> TYPE_SHIFT)?;

    let id = if kind.carries_id() { get_varint(&mut payload)? } else { 0 };

    let route = if compressed {
        if payload.remaining() < 2 {
            return Err(CodecError::MalformedPacket("truncated route code"));
        }
        let code = payload.get_u16();
        dict.route_for(code).ok_or(CodecError::UnknownRouteCode(code))?
    } else {
        if payload.remaining() < 1 {
            return Err(CodecError::MalformedPacket("truncated route length"));
        }
        let len = payload.get_u8() as usize;
        if payload.remaining() < len {
            return Err(CodecError::MalformedPacket("truncated route string"));
        }
        let bytes = payload.copy_to_bytes(len);
        String::from_utf8(bytes.to_vec())
            .map_err(|_| CodecError::MalformedPacket("route is not valid UTF-8"))?
    };

    Ok(Message { kind, id, route, short_ver, data: payload.to_vec() })
}

/// LEB128-style variable-length encoding: 7 payload bits per byte, high bit
/// set on every byte but the last.
fn put_varint(buf: &mut BytesMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
            buf.put_u8(byte);
        } else {
            buf.put_u8(byte);
            break;
        }
    }
}

fn get_varint(payload: &mut &[u8]) -> Result<u64, CodecError> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        if payload.is_empty() {
            return Err(CodecError::MalformedPacket("truncated message id"));
        }
        if shift >= 64 {
            return Err(CodecError::MalformedPacket("message id varint too long"));
        }
        let byte = payload.get_u8();
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict_with(route: &str, code: u16) -> RouteDictionary {
        let mut dict = RouteDictionary::new();
        dict.insert(route.to_string(), code);
        dict
    }

    #[test]
    fn round_trips_uncompressed_request() {
        let dict = RouteDictionary::new();
        let msg = Message::request(42, "Room.Join", b"payload".to_vec());
        let encoded = encode(&msg, &dict, true).unwrap();
        let decoded = decode(&encoded, &dict, 0).unwrap();
        assert_eq!(decoded.kind, msg.kind);
        assert_eq!(decoded.id, msg.id);
        assert_eq!(decoded.route, msg.route);
        assert_eq!(decoded.data, msg.data);
    }

    #[test]
    fn round_trips_compressed_notify_with_large_id_free_payload() {
        let dict = dict_with("Room.Join", 7);
        let msg = Message::notify("Room.Join", b"{}".to_vec());
        let encoded = encode(&msg, &dict, true).unwrap();
        // compressed notify: 1 header byte + 2 route bytes + payload, no id bytes.
        assert_eq!(encoded.len(), 1 + 2 + 2);
        let decoded = decode(&encoded, &dict, 0).unwrap();
        assert_eq!(decoded, Message { short_ver: 0, ..msg });
    }

    #[test]
    fn compressed_false_forces_the_uncompressed_form_even_if_the_dictionary_has_a_code() {
        let dict = dict_with("Room.Join", 7);
        let msg = Message::notify("Room.Join", b"{}".to_vec());
        let encoded = encode(&msg, &dict, false).unwrap();
        let decoded = decode(&encoded, &dict, 0).unwrap();
        assert_eq!(decoded.route, "Room.Join");
        assert!(!is_compressed(&encoded).unwrap());
    }

    #[test]
    fn is_compressed_reads_the_header_bit_without_full_decode() {
        let dict = dict_with("Room.Join", 7);
        let msg = Message::notify("Room.Join", b"{}".to_vec());
        assert!(is_compressed(&encode(&msg, &dict, true).unwrap()).unwrap());
        assert!(!is_compressed(&encode(&msg, &dict, false).unwrap()).unwrap());
    }

    #[test]
    fn unknown_compressed_code_is_rejected() {
        let dict = RouteDictionary::new();
        let mut buf = BytesMut::new();
        buf.put_u8(ROUTE_COMPRESSED_FLAG | (MessageType::Push.as_bits() << TYPE_SHIFT));
        buf.put_u16(99);
        let err = decode(&buf, &dict, 0).unwrap_err();
        assert_eq!(err, CodecError::UnknownRouteCode(99));
    }

    #[test]
    fn varint_round_trips_across_byte_boundaries() {
        for id in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            let mut buf = BytesMut::new();
            put_varint(&mut buf, id);
            let mut slice: &[u8] = &buf;
            assert_eq!(get_varint(&mut slice).unwrap(), id);
            assert!(slice.is_empty());
        }
    }
}
