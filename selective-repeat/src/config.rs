//! Protocol parameters and receiver policies.
//!
//! One [`SrConfig`] is shared by a sender/receiver pair.  Both windows
//! validate it on construction, so an endpoint can never run with a
//! sequence space small enough for two in-flight packets to share a number.

use std::time::Duration;

use thiserror::Error;

/// What the receiver does with a packet whose checksum does not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptPolicy {
    /// Emit nothing; the sender's timeout recovers.
    #[default]
    Drop,
    /// Acknowledge the last in-order delivered sequence number.
    AckLastDelivered,
}

/// What the receiver does with an uncorrupted packet outside its window.
///
/// Such a packet is always a retransmission of something already delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutOfWindowPolicy {
    /// Emit nothing.
    ///
    /// A sender whose ACK for that packet was lost retransmits it forever.
    Ignore,
    /// Acknowledge the packet's own sequence number.
    #[default]
    AckPacket,
    /// Acknowledge the last in-order delivered sequence number.
    AckLastDelivered,
}

/// Parameters for one sender/receiver pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrConfig {
    /// Maximum number of unacknowledged packets (and receive window width).
    pub window_size: usize,
    /// Number of distinct sequence numbers; must exceed `window_size`.
    pub seq_space: u32,
    /// Retransmission timeout armed for the oldest unacknowledged packet.
    pub timeout: Duration,
    pub corrupt_policy: CorruptPolicy,
    pub out_of_window_policy: OutOfWindowPolicy,
}

impl Default for SrConfig {
    fn default() -> Self {
        Self {
            window_size: 6,
            seq_space: 7,
            timeout: Duration::from_millis(16),
            corrupt_policy: CorruptPolicy::default(),
            out_of_window_policy: OutOfWindowPolicy::default(),
        }
    }
}

impl SrConfig {
    /// Default policies with the given window geometry.
    pub fn new(window_size: usize, seq_space: u32) -> Self {
        Self {
            window_size,
            seq_space,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_corrupt_policy(mut self, policy: CorruptPolicy) -> Self {
        self.corrupt_policy = policy;
        self
    }

    pub fn with_out_of_window_policy(mut self, policy: OutOfWindowPolicy) -> Self {
        self.out_of_window_policy = policy;
        self
    }

    /// `true` when the sequence space is at least twice the window.
    ///
    /// [`validate`](Self::validate) only demands `window_size + 1` numbers,
    /// which keeps every in-flight packet distinct at the sender.  When ACKs
    /// are lost the sender's window can trail the receiver's by a full
    /// window, and only a doubled space keeps a stale resend from landing
    /// inside the receiver's next window.
    pub fn is_alias_free(&self) -> bool {
        self.seq_space as u64 >= 2 * self.window_size as u64
    }

    /// Check the parameters for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        if (self.seq_space as u64) < self.window_size as u64 + 1 {
            return Err(ConfigError::SequenceSpaceTooSmall {
                window_size: self.window_size,
                seq_space: self.seq_space,
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// Reasons an [`SrConfig`] is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("window size must be at least 1")]
    EmptyWindow,
    #[error("sequence space {seq_space} is too small for window {window_size}; need at least window + 1")]
    SequenceSpaceTooSmall { window_size: usize, seq_space: u32 },
    #[error("retransmission timeout must be non-zero")]
    ZeroTimeout,
}
