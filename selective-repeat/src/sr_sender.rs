//! Selective Repeat send-side state machine.
//!
//! [`SenderWindow`] keeps up to `window_size` packets in flight, tracks an
//! acknowledgement flag per packet, and drives a single retransmission
//! timer.
//!
//! # Protocol contract
//!
//! - At most `window_size` packets may be unacknowledged at once; a
//!   [`submit`](SenderWindow::submit) beyond that is rejected, not queued.
//! - ACKs are **individual**: `acknum = K` acknowledges exactly the packet
//!   with sequence number `K`.
//! - The window base slides over the longest acknowledged prefix only;
//!   acknowledged packets behind an unacknowledged one stay in the window.
//! - One timer exists at a time and always covers the oldest
//!   unacknowledged packet.  On expiry only that packet is retransmitted.
//!
//! ```text
//!  base                          next_seq
//!   │                               │
//!  ─┼───┬───┬───┬───┬───────────────┼──▶ seq space (mod seq_space)
//!   │ U │ A │ U │ A │               │
//!   └─▲─┴───┴───┴───┘
//!     └ timer
//! ```

use thiserror::Error;

use crate::channel::{Channel, Timer};
use crate::checksum;
use crate::config::{ConfigError, SrConfig};
use crate::packet::{Message, Packet};
use crate::ring::Ring;
use crate::seq::SeqSpace;

/// Acknowledgement state of one in-flight packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    Unacked,
    Acked,
}

/// A packet occupying one slot of the send window.
#[derive(Debug, Clone)]
pub struct SendSlot {
    pub packet: Packet,
    pub status: AckStatus,
}

/// Counters kept by the sender.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderStats {
    /// Messages accepted into the window.
    pub submitted: u64,
    /// Submissions rejected because the window was full.
    pub window_full: u64,
    /// Uncorrupted ACKs received.
    pub acks_received: u64,
    /// ACKs that acknowledged a packet for the first time.
    pub new_acks: u64,
    /// ACKs for packets already acknowledged or no longer in the window.
    pub duplicate_acks: u64,
    pub corrupted_acks: u64,
    pub retransmissions: u64,
}

/// How an inbound ACK was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Checksum mismatch; discarded.
    Corrupted,
    /// Nothing outstanding matches; no state changed.
    Duplicate { acknum: u32 },
    /// A packet was acknowledged; `slid` slots left the window.
    New { acknum: u32, slid: usize },
}

/// Why [`SenderWindow::submit`] turned a message away.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error("send window full ({in_flight} packets awaiting acknowledgement)")]
    WindowFull { in_flight: usize },
}

/// Selective Repeat send-side state for one session.
#[derive(Debug)]
pub struct SenderWindow {
    config: SrConfig,
    space: SeqSpace,

    /// Sequence number for the next new packet.
    next_seq: u32,

    /// In-flight packets, front = window base.  The front slot is always
    /// `Unacked` while the window is non-empty.
    window: Ring<SendSlot>,

    /// Sequence number covered by the armed timer; `None` while idle.
    timed: Option<u32>,

    stats: SenderStats,
}

impl SenderWindow {
    /// Create an empty window; the first packet carries sequence number 0.
    pub fn new(config: SrConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            space: SeqSpace::new(config.seq_space),
            window: Ring::with_capacity(config.window_size),
            next_seq: 0,
            timed: None,
            stats: SenderStats::default(),
            config,
        })
    }

    pub fn config(&self) -> &SrConfig {
        &self.config
    }

    /// Sequence number the next accepted message will carry.
    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    /// Sequence number of the oldest unacknowledged packet.
    pub fn base_seq(&self) -> Option<u32> {
        self.window.peek(0).map(|slot| slot.packet.seqnum)
    }

    /// Number of packets occupying the window.
    pub fn in_flight(&self) -> usize {
        self.window.len()
    }

    /// `true` when a [`submit`](Self::submit) would be accepted.
    pub fn can_send(&self) -> bool {
        !self.window.is_full()
    }

    /// `true` while at least one packet awaits acknowledgement.
    pub fn has_unacked(&self) -> bool {
        !self.window.is_empty()
    }

    /// Sequence number the retransmission timer currently covers.
    pub fn timed_seq(&self) -> Option<u32> {
        self.timed
    }

    pub fn timer_armed(&self) -> bool {
        self.timed.is_some()
    }

    pub fn stats(&self) -> &SenderStats {
        &self.stats
    }

    /// In-flight slots from base to newest.
    pub fn slots(&self) -> impl Iterator<Item = &SendSlot> + '_ {
        self.window.iter()
    }

    /// Accept `message` for transmission.
    ///
    /// On success the packet is transmitted immediately and its sequence
    /// number returned.  If no timer is running it is armed for this packet.
    /// When the window is full nothing is sent and the caller keeps the
    /// message to resubmit later.
    pub fn submit<C, T>(
        &mut self,
        message: Message,
        channel: &mut C,
        timer: &mut T,
    ) -> Result<u32, SubmitError>
    where
        C: Channel + ?Sized,
        T: Timer + ?Sized,
    {
        let seq = self.next_seq;
        let packet = Packet::data(seq, &message);
        let slot = SendSlot {
            packet,
            status: AckStatus::Unacked,
        };

        if self.window.push(slot).is_err() {
            self.stats.window_full += 1;
            log::debug!(
                "[sr:sender] window full ({}/{}), message rejected",
                self.window.len(),
                self.config.window_size
            );
            return Err(SubmitError::WindowFull {
                in_flight: self.window.len(),
            });
        }
        self.stats.submitted += 1;

        log::debug!(
            "[sr:sender] → DATA seq={} in_flight={}",
            seq,
            self.window.len()
        );
        channel.transmit(packet);

        if self.timed.is_none() {
            timer.arm(self.config.timeout);
            self.timed = Some(seq);
        }

        self.next_seq = self.space.next(seq);
        Ok(seq)
    }

    /// Process an inbound acknowledgement.
    pub fn on_ack_received<T>(&mut self, packet: &Packet, timer: &mut T) -> AckOutcome
    where
        T: Timer + ?Sized,
    {
        if checksum::is_corrupted(packet) {
            self.stats.corrupted_acks += 1;
            log::debug!("[sr:sender] ← corrupted ACK, ignored");
            return AckOutcome::Corrupted;
        }
        self.stats.acks_received += 1;

        let acknum = packet.acknum;
        let offset = (0..self.window.len()).find(|&i| {
            self.window
                .peek(i)
                .is_some_and(|slot| slot.packet.seqnum == acknum)
        });

        let Some(offset) = offset else {
            self.stats.duplicate_acks += 1;
            log::debug!("[sr:sender] ← ACK {acknum} not in window, duplicate");
            return AckOutcome::Duplicate { acknum };
        };
        let Some(slot) = self.window.peek_mut(offset) else {
            return AckOutcome::Duplicate { acknum };
        };
        if slot.status == AckStatus::Acked {
            self.stats.duplicate_acks += 1;
            log::debug!("[sr:sender] ← ACK {acknum} already seen, duplicate");
            return AckOutcome::Duplicate { acknum };
        }

        slot.status = AckStatus::Acked;
        self.stats.new_acks += 1;

        let was_timed = self.timed == Some(acknum);
        if was_timed {
            timer.disarm();
            self.timed = None;
        }

        let mut slid = 0;
        if offset == 0 {
            while self
                .window
                .peek(0)
                .is_some_and(|slot| slot.status == AckStatus::Acked)
            {
                self.window.pop_front();
                slid += 1;
            }
        }

        if was_timed {
            self.arm_for_oldest_unacked(timer);
        }

        log::debug!(
            "[sr:sender] ← ACK {} new, slid={} in_flight={}",
            acknum,
            slid,
            self.window.len()
        );
        AckOutcome::New { acknum, slid }
    }

    /// Handle expiry of the retransmission timer.
    ///
    /// Retransmits only the oldest unacknowledged packet and re-arms the
    /// timer for it.  The timer is treated as idle on entry since it has
    /// just fired.
    pub fn on_timer_expired<C, T>(&mut self, channel: &mut C, timer: &mut T)
    where
        C: Channel + ?Sized,
        T: Timer + ?Sized,
    {
        if self.timed.take().is_none() {
            log::warn!("[sr:sender] timer expired while none was armed");
        }

        let Some(packet) = self.oldest_unacked().map(|slot| slot.packet) else {
            log::debug!("[sr:sender] timeout with nothing outstanding");
            return;
        };

        log::debug!("[sr:sender] timeout, → resend DATA seq={}", packet.seqnum);
        channel.transmit(packet);
        self.stats.retransmissions += 1;

        timer.arm(self.config.timeout);
        self.timed = Some(packet.seqnum);
    }

    /// Arm an idle timer for the oldest unacknowledged packet, if any.
    fn arm_for_oldest_unacked<T>(&mut self, timer: &mut T)
    where
        T: Timer + ?Sized,
    {
        debug_assert!(self.timed.is_none(), "timer retargeted while armed");
        match self.oldest_unacked().map(|slot| slot.packet.seqnum) {
            Some(seq) => {
                log::trace!("[sr:sender] timer now covers seq={seq}");
                timer.arm(self.config.timeout);
                self.timed = Some(seq);
            }
            None => log::trace!("[sr:sender] all packets acknowledged, timer idle"),
        }
    }

    fn oldest_unacked(&self) -> Option<&SendSlot> {
        self.window
            .iter()
            .find(|slot| slot.status == AckStatus::Unacked)
    }
}
