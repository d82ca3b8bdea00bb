//! Wire-format definitions for protocol packets.
//!
//! Every unit exchanged between the two endpoints is a [`Packet`]; every
//! unit exchanged with the application layer is a [`Message`].  This module
//! is responsible for:
//! - Defining the fixed-size on-wire layout (three header words + payload).
//! - Building data and acknowledgement packets with a valid checksum.
//! - Serialising a [`Packet`] into bytes and parsing it back.
//!
//! No I/O happens here; this is pure data transformation.  Decoding does
//! **not** verify the checksum: a corrupted packet still parses, and it is
//! the windows' job to notice (see [`crate::checksum`]).
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           Checksum                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Payload (20 bytes) ...                    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total size: [`WIRE_LEN`] = 32 bytes.

use std::fmt;

use thiserror::Error;

use crate::checksum;

/// Bytes of application data carried by every packet.
pub const PAYLOAD_LEN: usize = 20;

/// Byte length of the fixed header on the wire.
pub const HEADER_LEN: usize = 12;

/// Byte length of an encoded packet.
pub const WIRE_LEN: usize = HEADER_LEN + PAYLOAD_LEN;

/// Placeholder for header fields a packet does not use (the `acknum` of a
/// data packet).
pub const NOT_IN_USE: u32 = u32::MAX;

// Byte offsets of each field within the serialised packet.
const OFF_SEQ: usize = 0;
const OFF_ACK: usize = 4;
const OFF_CHECKSUM: usize = 8;

/// Application-layer unit: exactly [`PAYLOAD_LEN`] bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Message {
    pub data: [u8; PAYLOAD_LEN],
}

impl Message {
    pub fn new(data: [u8; PAYLOAD_LEN]) -> Self {
        Self { data }
    }

    /// A message with every byte set to `byte`.
    pub fn filled(byte: u8) -> Self {
        Self {
            data: [byte; PAYLOAD_LEN],
        }
    }

    /// Copy up to [`PAYLOAD_LEN`] bytes of `bytes`, zero-padding the rest.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut data = [0u8; PAYLOAD_LEN];
        let n = bytes.len().min(PAYLOAD_LEN);
        data[..n].copy_from_slice(&bytes[..n]);
        Self { data }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message({:?})", String::from_utf8_lossy(&self.data))
    }
}

/// A protocol packet.
///
/// Fields are public so a channel may tamper with them; a packet built by
/// [`Packet::data`] or [`Packet::ack`] always carries a matching checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    /// Sequence number, modulo the configured sequence space.
    pub seqnum: u32,
    /// Sequence number being acknowledged, or [`NOT_IN_USE`].
    pub acknum: u32,
    /// See [`crate::checksum::compute`].
    pub checksum: u32,
    pub payload: [u8; PAYLOAD_LEN],
}

impl Packet {
    /// Build a data packet carrying `message`.
    pub fn data(seqnum: u32, message: &Message) -> Self {
        Self::sealed(seqnum, NOT_IN_USE, message.data)
    }

    /// Build an acknowledgement for `acknum` with a zero-filled payload.
    pub fn ack(seqnum: u32, acknum: u32) -> Self {
        Self::sealed(seqnum, acknum, [0u8; PAYLOAD_LEN])
    }

    fn sealed(seqnum: u32, acknum: u32, payload: [u8; PAYLOAD_LEN]) -> Self {
        let mut packet = Self {
            seqnum,
            acknum,
            checksum: 0,
            payload,
        };
        packet.checksum = checksum::compute(&packet);
        packet
    }

    /// The payload as an application [`Message`].
    pub fn message(&self) -> Message {
        Message::new(self.payload)
    }

    /// Serialise into the fixed [`WIRE_LEN`]-byte layout.
    ///
    /// Fields are written exactly as stored; the checksum is not recomputed.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; WIRE_LEN];
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seqnum.to_be_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&self.acknum.to_be_bytes());
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 4].copy_from_slice(&self.checksum.to_be_bytes());
        buf[HEADER_LEN..].copy_from_slice(&self.payload);
        buf
    }

    /// Parse a [`Packet`] from a raw byte slice.
    ///
    /// Returns [`Err`] if `buf` is not exactly [`WIRE_LEN`] bytes long.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() != WIRE_LEN {
            return Err(PacketError::LengthMismatch {
                expected: WIRE_LEN,
                actual: buf.len(),
            });
        }

        let word = |off: usize| u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]);
        let mut payload = [0u8; PAYLOAD_LEN];
        payload.copy_from_slice(&buf[HEADER_LEN..]);

        Ok(Packet {
            seqnum: word(OFF_SEQ),
            acknum: word(OFF_ACK),
            checksum: word(OFF_CHECKSUM),
            payload,
        })
    }
}

/// Errors that can arise when parsing a raw packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// The buffer is not exactly one packet long.
    #[error("expected a {expected}-byte packet, got {actual} bytes")]
    LengthMismatch { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_packet_marks_acknum_unused() {
        let pkt = Packet::data(3, &Message::filled(b'c'));
        assert_eq!(pkt.seqnum, 3);
        assert_eq!(pkt.acknum, NOT_IN_USE);
        assert_eq!(pkt.payload, [b'c'; PAYLOAD_LEN]);
        assert!(!checksum::is_corrupted(&pkt));
    }

    #[test]
    fn ack_packet_has_zero_payload() {
        let pkt = Packet::ack(1, 4);
        assert_eq!(pkt.acknum, 4);
        assert_eq!(pkt.payload, [0u8; PAYLOAD_LEN]);
        assert!(!checksum::is_corrupted(&pkt));
    }

    #[test]
    fn encode_decode_roundtrip() {
        let pkt = Packet::data(6, &Message::from_slice(b"hello, selective"));
        let decoded = Packet::decode(&pkt.encode()).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn encoded_length_is_fixed() {
        assert_eq!(Packet::ack(0, 0).encode().len(), WIRE_LEN);
        assert_eq!(WIRE_LEN, 32);
    }

    #[test]
    fn header_fields_big_endian_on_wire() {
        let mut pkt = Packet::ack(0x0102_0304, 0x0506_0708);
        pkt.checksum = 0x090a_0b0c;
        let bytes = pkt.encode();
        assert_eq!(&bytes[OFF_SEQ..OFF_SEQ + 4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[OFF_ACK..OFF_ACK + 4], &[0x05, 0x06, 0x07, 0x08]);
        assert_eq!(&bytes[OFF_CHECKSUM..OFF_CHECKSUM + 4], &[0x09, 0x0a, 0x0b, 0x0c]);
    }

    #[test]
    fn decode_keeps_tampered_bytes() {
        let pkt = Packet::data(2, &Message::filled(b'x'));
        let mut bytes = pkt.encode();
        bytes[HEADER_LEN] = b'z';
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded.payload[0], b'z');
        assert!(checksum::is_corrupted(&decoded));
    }

    #[test]
    fn decode_wrong_length_returns_error() {
        assert_eq!(
            Packet::decode(&[0u8; WIRE_LEN - 1]),
            Err(PacketError::LengthMismatch {
                expected: WIRE_LEN,
                actual: WIRE_LEN - 1
            })
        );
        assert!(Packet::decode(&[]).is_err());
        assert!(Packet::decode(&[0u8; WIRE_LEN + 1]).is_err());
    }

    #[test]
    fn message_from_short_slice_is_zero_padded() {
        let m = Message::from_slice(b"hi");
        assert_eq!(&m.data[..2], b"hi");
        assert!(m.data[2..].iter().all(|&b| b == 0));
    }
}
