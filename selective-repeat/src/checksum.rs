//! Packet integrity check shared by sender and receiver.
//!
//! The code is the wrapping sum of `seqnum`, `acknum` and every payload
//! byte.  It is recomputed from the fields on receipt and compared with the
//! stored `checksum`, so any single changed byte anywhere in the packet
//! (including the checksum word itself) is detected.  It is not meant to
//! resist deliberate forgery.

use crate::packet::Packet;

/// Integrity code for `packet`, ignoring its stored `checksum` field.
pub fn compute(packet: &Packet) -> u32 {
    packet
        .payload
        .iter()
        .fold(packet.seqnum.wrapping_add(packet.acknum), |sum, &b| {
            sum.wrapping_add(u32::from(b))
        })
}

/// `true` when the stored checksum disagrees with the recomputed one.
pub fn is_corrupted(packet: &Packet) -> bool {
    compute(packet) != packet.checksum
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Message, WIRE_LEN};

    #[test]
    fn sums_header_and_payload() {
        let pkt = Packet::ack(2, 5);
        assert_eq!(compute(&pkt), 7);

        let pkt = Packet::data(1, &Message::filled(1));
        // 1 + u32::MAX (unused acknum) + 20 wraps to 20.
        assert_eq!(compute(&pkt), 20);
    }

    #[test]
    fn fresh_packets_are_intact() {
        assert!(!is_corrupted(&Packet::ack(0, 6)));
        assert!(!is_corrupted(&Packet::data(6, &Message::filled(b'q'))));
    }

    #[test]
    fn any_single_byte_change_is_detected() {
        let original = Packet::data(4, &Message::from_slice(b"abcdefghijklmnopqrst"));
        let wire = original.encode();
        for pos in 0..WIRE_LEN {
            for delta in [1u8, 0x55, 0x80, 0xff] {
                let mut bytes = wire.clone();
                bytes[pos] ^= delta;
                let tampered = Packet::decode(&bytes).unwrap();
                assert!(
                    is_corrupted(&tampered),
                    "byte {pos} xor {delta:#04x} went unnoticed"
                );
            }
        }
    }

    #[test]
    fn field_overwrite_is_detected() {
        let mut pkt = Packet::ack(1, 3);
        pkt.acknum = 999_999;
        assert!(is_corrupted(&pkt));

        let mut pkt = Packet::data(0, &Message::filled(b'a'));
        pkt.payload[0] = b'Z';
        assert!(is_corrupted(&pkt));
    }
}
