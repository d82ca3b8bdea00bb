//! Contracts the protocol core consumes from its surroundings.
//!
//! The windows never talk to a socket, a clock or the application
//! directly.  Each entry point receives the collaborators it needs:
//!
//! | Entry point                      | Collaborators             |
//! |----------------------------------|---------------------------|
//! | `SenderWindow::submit`           | [`Channel`] + [`Timer`]   |
//! | `SenderWindow::on_ack_received`  | [`Timer`]                 |
//! | `SenderWindow::on_timer_expired` | [`Channel`] + [`Timer`]   |
//! | `ReceiverWindow::on_packet_received` | [`Channel`] + [`Application`] |
//!
//! Implementations live in [`crate::simulator`] (virtual time) and
//! [`crate::sr_session`] (tokio).

use std::time::Duration;

use crate::packet::{Message, Packet};

/// The unreliable channel towards the peer.
///
/// It may drop, corrupt or delay the packet but keeps send order.
pub trait Channel {
    fn transmit(&mut self, packet: Packet);
}

/// The application layer above the receiver.
pub trait Application {
    /// Hand up the next in-order message.  Called once per logical message.
    fn deliver(&mut self, message: Message);
}

/// A single-shot timer owned by one sender.
///
/// Callers must never arm a timer that is already armed, nor disarm one
/// that is idle; [`crate::sr_sender::SenderWindow`] tracks this itself.
pub trait Timer {
    fn arm(&mut self, duration: Duration);
    fn disarm(&mut self);
}

impl<C: Channel + ?Sized> Channel for &mut C {
    fn transmit(&mut self, packet: Packet) {
        (**self).transmit(packet)
    }
}

impl<A: Application + ?Sized> Application for &mut A {
    fn deliver(&mut self, message: Message) {
        (**self).deliver(message)
    }
}

impl<T: Timer + ?Sized> Timer for &mut T {
    fn arm(&mut self, duration: Duration) {
        (**self).arm(duration)
    }

    fn disarm(&mut self) {
        (**self).disarm()
    }
}

impl Channel for Vec<Packet> {
    fn transmit(&mut self, packet: Packet) {
        self.push(packet);
    }
}

impl Application for Vec<Message> {
    fn deliver(&mut self, message: Message) {
        self.push(message);
    }
}
