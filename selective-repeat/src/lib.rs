//! `selective-repeat`: Selective Repeat sliding-window ARQ over an
//! unreliable channel.
//!
//! # Architecture
//!
//! ```text
//!  Application A                                     Application B
//!      │ submit(msg)                                      ▲ deliver(msg)
//!  ┌───▼──────────┐   DATA (seq, checksum)   ┌────────────┴───┐
//!  │ SenderWindow │─────────────────────────▶│ ReceiverWindow │
//!  │  + one Timer │◀─────────────────────────│  reorder buffer│
//!  └──────────────┘     ACK (acknum)         └────────────────┘
//!          unreliable Channel: loss, corruption, delay, no reordering
//! ```
//!
//! The windows are synchronous state machines.  Every entry point takes the
//! collaborators it needs ([`channel::Channel`], [`channel::Timer`],
//! [`channel::Application`]) as arguments, so the same core runs under the
//! discrete-event [`simulator`] and the tokio [`sr_session`].
//!
//! Each module has a single responsibility:
//! - [`seq`]         : modular sequence-number arithmetic
//! - [`checksum`]    : additive packet checksum
//! - [`packet`]      : messages, packets and the 32-byte wire format
//! - [`ring`]        : fixed-capacity circular buffer backing both windows
//! - [`config`]      : window geometry, timeout and receiver policies
//! - [`channel`]     : collaborator traits
//! - [`sr_sender`]   : send window, per-packet ACKs, single timer
//! - [`sr_receiver`] : receive window, buffering and in-order delivery
//! - [`simulator`]   : seeded discrete-event network for tests and the CLI
//! - [`timer`]       : [`channel::Timer`] on the tokio clock
//! - [`sr_session`]  : sender, receiver and link tasks over `mpsc`

pub mod channel;
pub mod checksum;
pub mod config;
pub mod packet;
pub mod ring;
pub mod seq;
pub mod simulator;
pub mod sr_receiver;
pub mod sr_sender;
pub mod sr_session;
pub mod timer;

pub use config::{ConfigError, CorruptPolicy, OutOfWindowPolicy, SrConfig};
pub use packet::{Message, Packet};
pub use sr_receiver::ReceiverWindow;
pub use sr_sender::SenderWindow;
