//! Selective Repeat receive-side state machine.
//!
//! [`ReceiverWindow`] implements the receiver side of Selective Repeat:
//!
//! - Packets anywhere in the `window_size` numbers starting at `base` are
//!   **buffered**, in order or not, and acknowledged **individually**.
//! - When the packet at `base` is present, it and every buffered packet
//!   directly behind it are delivered in one cascade and `base` advances.
//! - A packet outside the window is always an old retransmission; it is
//!   never buffered or delivered again.  Whether it is re-acknowledged is
//!   set by [`OutOfWindowPolicy`].
//! - Corrupted packets are dropped; [`CorruptPolicy`] decides whether an
//!   ACK for the last delivered packet goes out anyway.
//!
//! ```text
//!   base (offset 0)
//!    │
//!  ──┼────┬────┬────┬────┬────┬────┬──▶ seq space
//!    │ ·  │ B  │ ·  │ B  │ ·  │ ·  │   B = buffered, · = empty
//!    └────┴────┴────┴────┴────┴────┘
//!    <──────── window_size ────────▶
//! ```

use crate::channel::{Application, Channel};
use crate::checksum;
use crate::config::{ConfigError, CorruptPolicy, OutOfWindowPolicy, SrConfig};
use crate::packet::{Message, Packet};
use crate::ring::Ring;
use crate::seq::SeqSpace;

/// One slot of the reorder buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvSlot {
    Empty,
    Buffered(Message),
}

/// Counters kept by the receiver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Uncorrupted packets that fell inside the window.
    pub packets_received: u64,
    /// In-window packets that were already buffered.
    pub duplicates: u64,
    pub corrupted: u64,
    pub out_of_window: u64,
    /// Messages handed to the application.
    pub delivered: u64,
    pub acks_sent: u64,
}

/// How an inbound packet was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receipt {
    Corrupted,
    /// In the window; `delivered` messages went up to the application.
    Accepted { seqnum: u32, delivered: usize },
    /// In the window but already buffered.
    Duplicate { seqnum: u32 },
    /// Behind the window (already delivered).
    OutOfWindow { seqnum: u32 },
}

/// Selective Repeat receive-side state for one session.
#[derive(Debug)]
pub struct ReceiverWindow {
    config: SrConfig,
    space: SeqSpace,

    /// Next sequence number owed to the application.
    base: u32,

    /// Reorder buffer; offset `k` holds sequence number `base + k`.  Always
    /// exactly `window_size` slots long.
    slots: Ring<RecvSlot>,

    /// Sequence number for the next ACK, alternating 1, 0, 1, ...
    ack_toggle: u32,

    stats: ReceiverStats,
}

impl ReceiverWindow {
    /// Create a receiver expecting sequence number 0.
    pub fn new(config: SrConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SrConfig) -> Self {
        let mut slots = Ring::with_capacity(config.window_size);
        while slots.push(RecvSlot::Empty).is_ok() {}
        Self {
            space: SeqSpace::new(config.seq_space),
            slots,
            base: 0,
            ack_toggle: 1,
            stats: ReceiverStats::default(),
            config,
        }
    }

    pub fn config(&self) -> &SrConfig {
        &self.config
    }

    /// Next sequence number owed to the application.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Number of out-of-order packets waiting for a gap to fill.
    pub fn buffered(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, RecvSlot::Buffered(_)))
            .count()
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    /// Process one packet from the channel.
    ///
    /// Delivers whatever became in-order to `app` and emits at most one ACK
    /// on `channel`.
    pub fn on_packet_received<C, A>(
        &mut self,
        packet: &Packet,
        channel: &mut C,
        app: &mut A,
    ) -> Receipt
    where
        C: Channel + ?Sized,
        A: Application + ?Sized,
    {
        if checksum::is_corrupted(packet) {
            self.stats.corrupted += 1;
            match self.config.corrupt_policy {
                CorruptPolicy::Drop => {
                    log::debug!("[sr:receiver] ← corrupted packet, dropped");
                }
                CorruptPolicy::AckLastDelivered => {
                    let last = self.space.prev(self.base);
                    log::debug!("[sr:receiver] ← corrupted packet; → ACK ack={last}");
                    self.send_ack(last, channel);
                }
            }
            return Receipt::Corrupted;
        }

        let seqnum = packet.seqnum;
        if !self.space.contains(self.base, self.config.window_size, seqnum) {
            self.stats.out_of_window += 1;
            let ack = match self.config.out_of_window_policy {
                OutOfWindowPolicy::Ignore => None,
                OutOfWindowPolicy::AckPacket => Some(seqnum),
                OutOfWindowPolicy::AckLastDelivered => Some(self.space.prev(self.base)),
            };
            match ack {
                Some(acknum) => {
                    log::debug!(
                        "[sr:receiver] ← DATA seq={seqnum} outside window; → ACK ack={acknum}"
                    );
                    self.send_ack(acknum, channel);
                }
                None => log::debug!("[sr:receiver] ← DATA seq={seqnum} outside window, ignored"),
            }
            return Receipt::OutOfWindow { seqnum };
        }

        self.stats.packets_received += 1;
        let offset = self.space.offset(self.base, seqnum) as usize;

        let fresh = match self.slots.peek_mut(offset) {
            Some(slot) if *slot == RecvSlot::Empty => {
                *slot = RecvSlot::Buffered(packet.message());
                true
            }
            _ => false,
        };

        let delivered = if offset == 0 { self.drain(app) } else { 0 };

        log::debug!(
            "[sr:receiver] ← DATA seq={} {}; delivered={} → ACK ack={}",
            seqnum,
            if fresh { "buffered" } else { "duplicate" },
            delivered,
            seqnum
        );
        self.send_ack(seqnum, channel);

        if fresh {
            Receipt::Accepted { seqnum, delivered }
        } else {
            self.stats.duplicates += 1;
            Receipt::Duplicate { seqnum }
        }
    }

    /// Deliver the buffered run starting at `base`, advancing `base` past it.
    fn drain<A>(&mut self, app: &mut A) -> usize
    where
        A: Application + ?Sized,
    {
        let mut delivered = 0;
        while let Some(RecvSlot::Buffered(message)) = self.slots.peek(0).copied() {
            app.deliver(message);
            self.slots.pop_front();
            let refilled = self.slots.push(RecvSlot::Empty);
            debug_assert!(refilled.is_ok(), "reorder buffer full after pop");
            self.base = self.space.next(self.base);
            delivered += 1;
        }
        self.stats.delivered += delivered as u64;
        delivered
    }

    fn send_ack<C>(&mut self, acknum: u32, channel: &mut C)
    where
        C: Channel + ?Sized,
    {
        let ack = Packet::ack(self.ack_toggle, acknum);
        self.ack_toggle ^= 1;
        self.stats.acks_sent += 1;
        channel.transmit(ack);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::NOT_IN_USE;

    fn msg(i: u8) -> Message {
        Message::filled(b'a' + i)
    }

    fn data(seq: u32, i: u8) -> Packet {
        Packet::data(seq, &msg(i))
    }

    fn receiver(config: SrConfig) -> ReceiverWindow {
        ReceiverWindow::new(config).unwrap()
    }

    fn acknums(wire: &[Packet]) -> Vec<u32> {
        wire.iter().map(|p| p.acknum).collect()
    }

    #[test]
    fn initial_state() {
        let r = receiver(SrConfig::default());
        assert_eq!(r.base(), 0);
        assert_eq!(r.buffered(), 0);
        assert_eq!(r.stats(), &ReceiverStats::default());
    }

    #[test]
    fn invalid_config_rejected() {
        assert!(ReceiverWindow::new(SrConfig::new(4, 4)).is_err());
    }

    #[test]
    fn in_order_packet_delivered_and_acked() {
        let mut r = receiver(SrConfig::default());
        let (mut wire, mut app) = (Vec::<Packet>::new(), Vec::<Message>::new());

        let receipt = r.on_packet_received(&data(0, 0), &mut wire, &mut app);
        assert_eq!(receipt, Receipt::Accepted { seqnum: 0, delivered: 1 });
        assert_eq!(app, vec![msg(0)]);
        assert_eq!(r.base(), 1);
        assert_eq!(acknums(&wire), vec![0]);
    }

    #[test]
    fn ack_packets_are_well_formed() {
        let mut r = receiver(SrConfig::default());
        let (mut wire, mut app) = (Vec::<Packet>::new(), Vec::<Message>::new());
        r.on_packet_received(&data(0, 0), &mut wire, &mut app);
        r.on_packet_received(&data(1, 1), &mut wire, &mut app);
        r.on_packet_received(&data(2, 2), &mut wire, &mut app);

        let seqs: Vec<u32> = wire.iter().map(|p| p.seqnum).collect();
        assert_eq!(seqs, vec![1, 0, 1]);
        for ack in &wire {
            assert_ne!(ack.acknum, NOT_IN_USE);
            assert_eq!(ack.payload, [0u8; crate::packet::PAYLOAD_LEN]);
            assert!(!checksum::is_corrupted(ack));
        }
    }

    #[test]
    fn out_of_order_packets_buffered_then_cascade() {
        let mut r = receiver(SrConfig::default());
        let (mut wire, mut app) = (Vec::<Packet>::new(), Vec::<Message>::new());

        assert_eq!(
            r.on_packet_received(&data(2, 2), &mut wire, &mut app),
            Receipt::Accepted { seqnum: 2, delivered: 0 }
        );
        assert_eq!(
            r.on_packet_received(&data(1, 1), &mut wire, &mut app),
            Receipt::Accepted { seqnum: 1, delivered: 0 }
        );
        assert!(app.is_empty());
        assert_eq!(r.buffered(), 2);

        assert_eq!(
            r.on_packet_received(&data(0, 0), &mut wire, &mut app),
            Receipt::Accepted { seqnum: 0, delivered: 3 }
        );
        assert_eq!(app, vec![msg(0), msg(1), msg(2)]);
        assert_eq!(r.base(), 3);
        assert_eq!(r.buffered(), 0);
        assert_eq!(acknums(&wire), vec![2, 1, 0]);
    }

    #[test]
    fn cascade_stops_at_gap() {
        let mut r = receiver(SrConfig::default());
        let (mut wire, mut app) = (Vec::<Packet>::new(), Vec::<Message>::new());

        r.on_packet_received(&data(1, 1), &mut wire, &mut app);
        r.on_packet_received(&data(3, 3), &mut wire, &mut app);
        r.on_packet_received(&data(0, 0), &mut wire, &mut app);

        assert_eq!(app, vec![msg(0), msg(1)]);
        assert_eq!(r.base(), 2);
        assert_eq!(r.buffered(), 1);
    }

    #[test]
    fn buffered_duplicate_not_stored_twice() {
        let mut r = receiver(SrConfig::default());
        let (mut wire, mut app) = (Vec::<Packet>::new(), Vec::<Message>::new());

        r.on_packet_received(&data(1, 1), &mut wire, &mut app);
        let dup = r.on_packet_received(&data(1, 1), &mut wire, &mut app);
        assert_eq!(dup, Receipt::Duplicate { seqnum: 1 });
        assert_eq!(acknums(&wire), vec![1, 1]);

        r.on_packet_received(&data(0, 0), &mut wire, &mut app);
        assert_eq!(app, vec![msg(0), msg(1)]);
        assert_eq!(r.stats().duplicates, 1);
        assert_eq!(r.stats().delivered, 2);
    }

    #[test]
    fn corrupted_packet_dropped_silently_by_default() {
        let mut r = receiver(SrConfig::default());
        let (mut wire, mut app) = (Vec::<Packet>::new(), Vec::<Message>::new());

        let mut pkt = data(0, 0);
        pkt.payload[3] = b'z';
        assert_eq!(r.on_packet_received(&pkt, &mut wire, &mut app), Receipt::Corrupted);
        assert!(wire.is_empty());
        assert!(app.is_empty());
        assert_eq!(r.base(), 0);
        assert_eq!(r.stats().corrupted, 1);
    }

    #[test]
    fn corrupted_packet_acks_last_delivered_when_configured() {
        let cfg = SrConfig::default().with_corrupt_policy(CorruptPolicy::AckLastDelivered);
        let mut r = receiver(cfg);
        let (mut wire, mut app) = (Vec::<Packet>::new(), Vec::<Message>::new());

        let mut bad = data(0, 0);
        bad.seqnum = 999_999;
        r.on_packet_received(&bad, &mut wire, &mut app);
        // Nothing delivered yet: the number before base wraps to the top.
        assert_eq!(acknums(&wire), vec![6]);

        r.on_packet_received(&data(0, 0), &mut wire, &mut app);
        r.on_packet_received(&bad, &mut wire, &mut app);
        assert_eq!(acknums(&wire), vec![6, 0, 0]);
        assert_eq!(app.len(), 1);
    }

    fn deliver_six(r: &mut ReceiverWindow, wire: &mut Vec<Packet>, app: &mut Vec<Message>) {
        for i in 0..6 {
            r.on_packet_received(&data(u32::from(i), i), wire, app);
        }
        wire.clear();
    }

    #[test]
    fn old_packet_reacked_with_own_seqnum_by_default() {
        let mut r = receiver(SrConfig::default());
        let (mut wire, mut app) = (Vec::<Packet>::new(), Vec::<Message>::new());
        deliver_six(&mut r, &mut wire, &mut app);
        assert_eq!(r.base(), 6);

        // Window is now 6,0,1,2,3,4; only 5 lies outside it.
        let receipt = r.on_packet_received(&data(5, 5), &mut wire, &mut app);
        assert_eq!(receipt, Receipt::OutOfWindow { seqnum: 5 });
        assert_eq!(acknums(&wire), vec![5]);
        assert_eq!(app.len(), 6);
        assert_eq!(r.stats().out_of_window, 1);
    }

    #[test]
    fn old_packet_ignored_when_configured() {
        let cfg = SrConfig::default().with_out_of_window_policy(OutOfWindowPolicy::Ignore);
        let mut r = receiver(cfg);
        let (mut wire, mut app) = (Vec::<Packet>::new(), Vec::<Message>::new());
        deliver_six(&mut r, &mut wire, &mut app);

        let receipt = r.on_packet_received(&data(5, 5), &mut wire, &mut app);
        assert_eq!(receipt, Receipt::OutOfWindow { seqnum: 5 });
        assert!(wire.is_empty());
    }

    #[test]
    fn old_packet_acks_last_delivered_when_configured() {
        let cfg = SrConfig::new(3, 8).with_out_of_window_policy(OutOfWindowPolicy::AckLastDelivered);
        let mut r = receiver(cfg);
        let (mut wire, mut app) = (Vec::<Packet>::new(), Vec::<Message>::new());
        for i in 0..5 {
            r.on_packet_received(&data(u32::from(i), i), &mut wire, &mut app);
        }
        wire.clear();

        // Base is 5; packet 2 is old and the last delivered is 4.
        r.on_packet_received(&data(2, 2), &mut wire, &mut app);
        assert_eq!(acknums(&wire), vec![4]);
    }

    #[test]
    fn window_wraps_around_sequence_space() {
        let mut r = receiver(SrConfig::default());
        let (mut wire, mut app) = (Vec::<Packet>::new(), Vec::<Message>::new());
        deliver_six(&mut r, &mut wire, &mut app);

        // 0 and 1 now belong to the next lap; 6 is the base.
        r.on_packet_received(&data(1, 8), &mut wire, &mut app);
        r.on_packet_received(&data(0, 7), &mut wire, &mut app);
        assert_eq!(app.len(), 6);
        r.on_packet_received(&data(6, 6), &mut wire, &mut app);

        assert_eq!(&app[6..], &[msg(6), msg(7), msg(8)]);
        assert_eq!(r.base(), 2);
    }

    #[test]
    fn reorder_buffer_keeps_full_width_across_cascades() {
        let cfg = SrConfig::new(4, 8);
        let mut r = receiver(cfg.clone());
        let (mut wire, mut app) = (Vec::<Packet>::new(), Vec::<Message>::new());

        for lap in 0..5u32 {
            // Newest first, so each lap ends in a four-message cascade.
            for k in (0..4).rev() {
                let seq = (lap * 4 + k) % cfg.seq_space;
                r.on_packet_received(&data(seq, k as u8), &mut wire, &mut app);
            }
            assert_eq!(r.slots.len(), cfg.window_size);
            assert_eq!(r.buffered(), 0);
        }
        assert_eq!(app.len(), 20);
        assert_eq!(r.base(), 20 % cfg.seq_space);
    }

    #[test]
    fn undersized_sequence_space_aliases_old_packet() {
        // Skip validation to show why seq_space >= window_size + 1 is enforced.
        let mut r = ReceiverWindow::build(SrConfig::new(6, 6));
        let (mut wire, mut app) = (Vec::<Packet>::new(), Vec::<Message>::new());
        deliver_six(&mut r, &mut wire, &mut app);

        // Every ACK was lost, so the sender resends its packet 0.  With only
        // six numbers the receiver's base has wrapped to 0 and the stale
        // copy is delivered as the next message.
        r.on_packet_received(&data(0, 0), &mut wire, &mut app);
        assert_eq!(app.len(), 7);
        assert_eq!(app[6], app[0], "old payload delivered a second time");
    }

    #[test]
    fn minimal_sequence_space_buffers_stale_resend() {
        let mut r = receiver(SrConfig::new(6, 7));
        let (mut wire, mut app) = (Vec::<Packet>::new(), Vec::<Message>::new());
        deliver_six(&mut r, &mut wire, &mut app);

        // Base is 6 and the window 6,0,1,2,3,4 already covers the next lap,
        // so a resend of the first 0 is buffered as if it were new.
        let receipt = r.on_packet_received(&data(0, 0), &mut wire, &mut app);
        assert_eq!(receipt, Receipt::Accepted { seqnum: 0, delivered: 0 });
        assert_eq!(r.buffered(), 1);
        assert!(!r.config().is_alias_free());
    }

    #[test]
    fn doubled_sequence_space_recognises_stale_resend() {
        let mut r = receiver(SrConfig::new(6, 12));
        let (mut wire, mut app) = (Vec::<Packet>::new(), Vec::<Message>::new());
        deliver_six(&mut r, &mut wire, &mut app);

        for seq in 0..6 {
            let receipt = r.on_packet_received(&data(seq, seq as u8), &mut wire, &mut app);
            assert_eq!(receipt, Receipt::OutOfWindow { seqnum: seq });
        }
        assert_eq!(r.buffered(), 0);
        assert_eq!(app.len(), 6);
        assert_eq!(acknums(&wire), vec![0, 1, 2, 3, 4, 5]);
        assert!(r.config().is_alias_free());
    }
}
