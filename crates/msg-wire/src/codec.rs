//! Packet framing: `type(1) | length(3, big-endian) | payload(length)`.
//!
//! `Decoder` is a streaming accumulator: feed it arbitrary byte slices (as
//! they arrive off a socket) and drain whatever complete packets have
//! accumulated. Partial frames are carried across calls in an internal
//! buffer.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::CodecError;

/// Maximum payload length a 3-byte big-endian length field can address.
pub const MAX_PAYLOAD_LEN: usize = (1 << 24) - 1;

const HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Handshake,
    HandshakeAck,
    Heartbeat,
    Data,
}

impl PacketType {
    fn from_byte(b: u8) -> Result<Self, CodecError> {
        match b {
            1 => Ok(PacketType::Handshake),
            2 => Ok(PacketType::HandshakeAck),
            3 => Ok(PacketType::Heartbeat),
            4 => Ok(PacketType::Data),
            other => Err(CodecError::UnknownPacketType(other)),
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            PacketType::Handshake => 1,
            PacketType::HandshakeAck => 2,
            PacketType::Heartbeat => 3,
            PacketType::Data => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketType,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(kind: PacketType, payload: Vec<u8>) -> Self {
        Packet { kind, payload }
    }
}

/// Streaming packet decoder. One per connection.
#[derive(Debug, Default)]
pub struct Decoder {
    buf: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Decoder::default()
    }

    /// Feed newly-read bytes in and drain every complete packet they make
    /// available. Any trailing partial frame stays buffered for the next call.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<Vec<Packet>, CodecError> {
        self.buf.extend_from_slice(chunk);

        let mut packets = Vec::new();
        loop {
            if self.buf.len() < HEADER_LEN {
                break;
            }
            let type_byte = self.buf[0];
            let len = ((self.buf[1] as usize) << 16) | ((self.buf[2] as usize) << 8) | (self.buf[3] as usize);
            if len > MAX_PAYLOAD_LEN {
                return Err(CodecError::MalformedPacket("length field exceeds 2^24-1"));
            }
            if self.buf.len() < HEADER_LEN + len {
                break;
            }
            let kind = PacketType::from_byte(type_byte)?;
            self.buf.advance(HEADER_LEN);
            let payload = self.buf.split_to(len).to_vec();
            packets.push(Packet::new(kind, payload));
        }
        Ok(packets)
    }
}

/// Encode a single packet into one frame.
pub fn encode(packet: &Packet) -> Result<bytes::Bytes, CodecError> {
    if packet.payload.len() > MAX_PAYLOAD_LEN {
        return Err(CodecError::MalformedPacket("payload exceeds 2^24-1 bytes"));
    }
    let len = packet.payload.len();
    let mut buf = BytesMut::with_capacity(HEADER_LEN + len);
    buf.put_u8(packet.kind.as_byte());
    buf.put_u8((len >> 16) as u8);
    buf.put_u8((len >> 8) as u8);
    buf.put_u8(len as u8);
    buf.put_slice(&packet.payload);
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_single_packet() {
        let packet = Packet::new(PacketType::Data, b"hello".to_vec());
        let frame = encode(&packet).unwrap();
        let mut decoder = Decoder::new();
        let decoded = decoder.decode(&frame).unwrap();
        assert_eq!(decoded, vec![packet]);
    }

    #[test]
    fn restartable_across_arbitrary_chunk_boundaries() {
        let packets = vec![
            Packet::new(PacketType::Handshake, b"hi".to_vec()),
            Packet::new(PacketType::Data, b"payload-one".to_vec()),
            Packet::new(PacketType::Heartbeat, Vec::new()),
        ];
        let mut whole = Vec::new();
        for p in &packets {
            whole.extend_from_slice(&encode(p).unwrap());
        }

        for split_at in 1..whole.len() {
            let (a, b) = whole.split_at(split_at);
            let mut decoder = Decoder::new();
            let mut out = decoder.decode(a).unwrap();
            out.extend(decoder.decode(b).unwrap());
            assert_eq!(out, packets, "split at {split_at} produced different packets");
        }
    }

    #[test]
    fn unknown_packet_type_is_malformed() {
        let frame = [9u8, 0, 0, 0];
        let mut decoder = Decoder::new();
        assert_eq!(decoder.decode(&frame), Err(CodecError::UnknownPacketType(9)));
    }

    #[test]
    fn leftover_prefix_is_retained_across_calls() {
        let packet = Packet::new(PacketType::Data, b"0123456789".to_vec());
        let frame = encode(&packet).unwrap();
        let mut decoder = Decoder::new();
        assert!(decoder.decode(&frame[..2]).unwrap().is_empty());
        assert!(decoder.decode(&frame[2..6]).unwrap().is_empty());
        let out = decoder.decode(&frame[6..]).unwrap();
        assert_eq!(out, vec![packet]);
    }
}
