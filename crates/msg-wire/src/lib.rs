//! Wire framing and message codec: the leaves-first layer everything else
//! in this workspace builds on. No async, no networking — pure encode/decode.

pub mod codec;
pub mod dictionary;
pub mod error;
pub mod handshake;
pub mod message;

pub use codec::{Decoder, Packet, PacketType};
pub use dictionary::RouteDictionary;
pub use error::CodecError;
pub use message::{Message, MessageType};

/// A version string's short form: the 32-bit hash suffix parsed from
/// `…-HHHHHHHH` (hex). Returns 0 if the version has no `-` or the suffix
/// isn't valid hex, mirroring the original's lenient `ShortVersion`.
pub fn short_version(version: &str) -> u32 {
    match version.rsplit_once('-') {
        Some((_, suffix)) => u32::from_str_radix(suffix, 16).unwrap_or(0),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_version_parses_hex_suffix() {
        assert_eq!(short_version("1.0-aaaaaaaa"), 0xaaaaaaaa);
        assert_eq!(short_version("1.0-bbbbbbbb"), 0xbbbbbbbb);
    }

    #[test]
    fn short_version_defaults_to_zero() {
        assert_eq!(short_version("1.0"), 0);
        assert_eq!(short_version("1.0-zzzz"), 0);
    }
}
