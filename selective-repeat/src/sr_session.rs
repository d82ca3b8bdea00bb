//! Concurrent Selective Repeat session on tokio.
//!
//! # Architecture
//!
//! ```text
//!  Session::send ──▶ app_rx ┌─────────────┐ data  ┌──────┐ packets ┌───────────────┐
//!                          │ sender task │──────▶│ link │────────▶│ receiver task │──▶ Session::recv
//!                          │ SenderWindow│       └──────┘         │ ReceiverWindow│
//!                          │ TokioTimer  │◀──────┌──────┐◀────────│               │
//!                          └─────────────┘ acks  │ link │  acks   └───────────────┘
//!                                                └──────┘
//! ```
//!
//! Each window is owned by exactly one task, so its entry points never run
//! concurrently.  The link tasks stand in for the unreliable network: they
//! drop and damage packets with seeded probabilities and delay each by the
//! same fixed latency, measured from when it entered the link, without
//! reordering.
//!
//! # Shutdown
//!
//! [`Session::finish`] closes the application side.  The sender task exits
//! once everything it accepted is acknowledged; dropping its data handle
//! then unwinds the link and receiver tasks in turn.

use std::collections::VecDeque;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use crate::channel::{Application, Channel};
use crate::config::{ConfigError, SrConfig};
use crate::packet::{Message, Packet};
use crate::simulator;
use crate::sr_receiver::{ReceiverStats, ReceiverWindow};
use crate::sr_sender::{SenderStats, SenderWindow};
use crate::timer::TokioTimer;

/// Capacity of the application → sender queue.
const APP_QUEUE: usize = 64;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("session already shut down")]
    Closed,
    #[error("acknowledgement path closed with {unacked} packet(s) outstanding")]
    LinkClosed { unacked: usize },
    #[error("session task failed: {0}")]
    Task(#[from] JoinError),
}

/// Fault model for one direction of the link.
#[derive(Debug, Clone)]
pub struct LinkFaults {
    pub loss_prob: f64,
    pub corrupt_prob: f64,
    /// One-way delay applied to every surviving packet.
    pub latency: Duration,
}

impl Default for LinkFaults {
    fn default() -> Self {
        Self {
            loss_prob: 0.0,
            corrupt_prob: 0.0,
            latency: Duration::from_millis(1),
        }
    }
}

impl LinkFaults {
    /// A link that only delays.
    pub fn reliable(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborators over mpsc
// ---------------------------------------------------------------------------

/// Outbound packets.  A closed peer behaves like a lossy channel.
struct PacketTx(mpsc::UnboundedSender<Packet>);

impl Channel for PacketTx {
    fn transmit(&mut self, packet: Packet) {
        if self.0.send(packet).is_err() {
            log::trace!("[sr:session] packet seq={} dropped, link closed", packet.seqnum);
        }
    }
}

struct DeliverTx(mpsc::UnboundedSender<Message>);

impl Application for DeliverTx {
    fn deliver(&mut self, message: Message) {
        if self.0.send(message).is_err() {
            log::debug!("[sr:session] application gone, message discarded");
        }
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Spawn the task that owns the send window.
///
/// Application messages are only pulled while the window has room, so the
/// bounded `app_rx` queue applies back-pressure to [`Session::send`].
pub fn spawn_sender(
    config: SrConfig,
    app_rx: mpsc::Receiver<Message>,
    ack_rx: mpsc::UnboundedReceiver<Packet>,
    data_tx: mpsc::UnboundedSender<Packet>,
) -> Result<JoinHandle<Result<SenderStats, SessionError>>, ConfigError> {
    let sender = SenderWindow::new(config)?;
    Ok(tokio::spawn(sender_loop(sender, app_rx, ack_rx, data_tx)))
}

async fn sender_loop(
    mut sender: SenderWindow,
    mut app_rx: mpsc::Receiver<Message>,
    mut ack_rx: mpsc::UnboundedReceiver<Packet>,
    data_tx: mpsc::UnboundedSender<Packet>,
) -> Result<SenderStats, SessionError> {
    let mut channel = PacketTx(data_tx);
    let mut timer = TokioTimer::new();
    let mut app_open = true;

    loop {
        if !app_open && !sender.has_unacked() {
            log::debug!("[sr:session] sender drained, exiting");
            return Ok(sender.stats().clone());
        }

        let expiry = timer.expired();
        let armed = timer.is_armed();

        tokio::select! {
            maybe = app_rx.recv(), if app_open && sender.can_send() => match maybe {
                Some(message) => {
                    // The guard checked for room; a rejection here means the
                    // window changed underneath, which cannot happen in one task.
                    if let Err(err) = sender.submit(message, &mut channel, &mut timer) {
                        log::error!("[sr:session] {err}");
                    }
                }
                None => {
                    log::debug!(
                        "[sr:session] application closed, {} packet(s) outstanding",
                        sender.in_flight()
                    );
                    app_open = false;
                }
            },

            maybe = ack_rx.recv() => match maybe {
                Some(ack) => {
                    sender.on_ack_received(&ack, &mut timer);
                }
                None => {
                    return Err(SessionError::LinkClosed {
                        unacked: sender.in_flight(),
                    });
                }
            },

            _ = expiry, if armed => {
                timer.fired();
                sender.on_timer_expired(&mut channel, &mut timer);
            }
        }
    }
}

/// Spawn the task that owns the receive window.
///
/// It runs until `packet_rx` closes and returns the receiver's counters.
pub fn spawn_receiver(
    config: SrConfig,
    mut packet_rx: mpsc::UnboundedReceiver<Packet>,
    ack_tx: mpsc::UnboundedSender<Packet>,
    deliver_tx: mpsc::UnboundedSender<Message>,
) -> Result<JoinHandle<ReceiverStats>, ConfigError> {
    let mut receiver = ReceiverWindow::new(config)?;
    Ok(tokio::spawn(async move {
        let mut channel = PacketTx(ack_tx);
        let mut app = DeliverTx(deliver_tx);
        while let Some(packet) = packet_rx.recv().await {
            receiver.on_packet_received(&packet, &mut channel, &mut app);
        }
        log::debug!("[sr:session] receiver input closed, exiting");
        receiver.stats().clone()
    }))
}

/// Spawn one direction of the unreliable link.
///
/// Each surviving packet is stamped with `now + latency` on entry and
/// forwarded when that instant passes, so a burst arrives together and
/// order is preserved.  The task ends once its input closes and everything
/// in flight is forwarded, or as soon as the output side is gone.
pub fn spawn_link(
    faults: LinkFaults,
    seed: u64,
    mut rx: mpsc::UnboundedReceiver<Packet>,
    tx: mpsc::UnboundedSender<Packet>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut in_flight: VecDeque<(Instant, Packet)> = VecDeque::new();
        let mut input_open = true;

        loop {
            if !input_open && in_flight.is_empty() {
                break;
            }
            let next_due = in_flight.front().map(|(due, _)| *due);

            tokio::select! {
                maybe = rx.recv(), if input_open => match maybe {
                    Some(packet) => {
                        if let Some(packet) = apply_faults(&faults, &mut rng, packet) {
                            in_flight.push_back((Instant::now() + faults.latency, packet));
                        }
                    }
                    None => input_open = false,
                },

                _ = tokio::time::sleep_until(next_due.unwrap_or_else(Instant::now)),
                    if next_due.is_some() =>
                {
                    if let Some((_, packet)) = in_flight.pop_front() {
                        if tx.send(packet).is_err() {
                            break;
                        }
                    }
                }
            }
        }
    })
}

/// Drop or damage `packet` according to `faults`.
fn apply_faults(faults: &LinkFaults, rng: &mut StdRng, packet: Packet) -> Option<Packet> {
    if faults.loss_prob > 0.0 && rng.random::<f64>() < faults.loss_prob {
        log::debug!("[sr:link] packet seq={} ack={} lost", packet.seqnum, packet.acknum);
        return None;
    }
    if faults.corrupt_prob > 0.0 && rng.random::<f64>() < faults.corrupt_prob {
        log::debug!("[sr:link] packet seq={} corrupted", packet.seqnum);
        return Some(simulator::corrupt(packet, rng));
    }
    Some(packet)
}

// ---------------------------------------------------------------------------
// Session handle
// ---------------------------------------------------------------------------

/// Counters collected when a session finishes.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub sender: SenderStats,
    pub receiver: ReceiverStats,
    /// Messages delivered but never taken with [`Session::recv`].
    pub unread: Vec<Message>,
}

/// A running sender/receiver pair joined by two faulty links.
///
/// Must be started from within a tokio runtime.
pub struct Session {
    app_tx: mpsc::Sender<Message>,
    deliver_rx: mpsc::UnboundedReceiver<Message>,
    sender: JoinHandle<Result<SenderStats, SessionError>>,
    receiver: JoinHandle<ReceiverStats>,
}

impl Session {
    /// Wire up and spawn all tasks.  Each link direction gets its own seed.
    pub fn start(config: SrConfig, faults: LinkFaults, seed: u64) -> Result<Self, SessionError> {
        config.validate()?;
        if !config.is_alias_free() {
            log::warn!(
                "[sr:session] sequence space {} < 2 x window {}; stale retransmissions may alias",
                config.seq_space,
                config.window_size
            );
        }

        let (app_tx, app_rx) = mpsc::channel(APP_QUEUE);
        let (data_tx, data_link_rx) = mpsc::unbounded_channel();
        let (data_link_tx, packet_rx) = mpsc::unbounded_channel();
        let (ack_tx, ack_link_rx) = mpsc::unbounded_channel();
        let (ack_link_tx, ack_rx) = mpsc::unbounded_channel();
        let (deliver_tx, deliver_rx) = mpsc::unbounded_channel();

        spawn_link(faults.clone(), seed, data_link_rx, data_link_tx);
        spawn_link(faults, seed.wrapping_add(1), ack_link_rx, ack_link_tx);
        let receiver = spawn_receiver(config.clone(), packet_rx, ack_tx, deliver_tx)?;
        let sender = spawn_sender(config, app_rx, ack_rx, data_tx)?;

        Ok(Self {
            app_tx,
            deliver_rx,
            sender,
            receiver,
        })
    }

    /// Queue a message for transmission; waits while the queue is full.
    pub async fn send(&self, message: Message) -> Result<(), SessionError> {
        self.app_tx
            .send(message)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Next message delivered in order at the receiving side.
    ///
    /// Returns `None` once the session has shut down and everything was read.
    pub async fn recv(&mut self) -> Option<Message> {
        self.deliver_rx.recv().await
    }

    /// Close the application side and wait for every task to finish.
    pub async fn finish(self) -> Result<SessionSummary, SessionError> {
        let Self {
            app_tx,
            mut deliver_rx,
            sender,
            receiver,
        } = self;
        drop(app_tx);

        let sender = sender.await??;
        let receiver = receiver.await?;

        let mut unread = Vec::new();
        while let Some(message) = deliver_rx.recv().await {
            unread.push(message);
        }

        log::info!(
            "[sr:session] finished: submitted={} retransmissions={} delivered={}",
            sender.submitted,
            sender.retransmissions,
            receiver.delivered
        );
        Ok(SessionSummary {
            sender,
            receiver,
            unread,
        })
    }
}
