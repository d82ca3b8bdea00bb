//! Discrete-event network simulator.
//!
//! Real networks drop and damage packets.  To exercise the reliability
//! mechanisms deterministically, [`Simulator`] runs a [`SenderWindow`] and a
//! [`ReceiverWindow`] against a virtual clock and a seeded fault model:
//!
//! | Fault       | Description                                              |
//! |-------------|----------------------------------------------------------|
//! | Loss        | Drop a packet with probability `loss_prob`.              |
//! | Corruption  | Change one byte of the encoded packet with probability   |
//! |             | `corrupt_prob`.                                          |
//! | Delay       | One-way delay uniform in 1..10 time units (1 unit = 1 ms), |
//! |             | never overtaking an earlier packet in the same direction. |
//!
//! The simulator also plays the application layer on both sides and the
//! sender's single timer.  Messages the window rejects wait in an outbox and
//! are resubmitted on the next application tick or ACK arrival.
//!
//! The same seed always yields the same run.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::channel::{Channel, Timer};
use crate::config::{ConfigError, SrConfig};
use crate::packet::{Message, Packet, WIRE_LEN};
use crate::sr_receiver::{ReceiverStats, ReceiverWindow};
use crate::sr_sender::{SenderStats, SenderWindow};

/// Virtual time unit.
const UNIT: Duration = Duration::from_millis(1);

/// Fault model and workload.
///
/// Probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Number of messages the sending application produces.
    pub messages: usize,
    /// Probability that any given packet is silently dropped.
    pub loss_prob: f64,
    /// Probability that a surviving packet has one byte altered.
    pub corrupt_prob: f64,
    /// Mean time between application messages.
    pub interarrival: Duration,
    /// Virtual time after which the run is abandoned.
    pub max_time: Duration,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default; the channel only delays.
        Self {
            messages: 20,
            loss_prob: 0.0,
            corrupt_prob: 0.0,
            interarrival: UNIT * 10,
            max_time: Duration::from_secs(3600),
            seed: 1234,
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<(), SimulationError> {
        for (name, value) in [("loss", self.loss_prob), ("corruption", self.corrupt_prob)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SimulationError::InvalidProbability { name, value });
            }
        }
        Ok(())
    }
}

/// Errors raised while setting up a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("{name} probability {value} is outside 0.0..=1.0")]
    InvalidProbability { name: &'static str, value: f64 },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Counters kept by the simulated channel (both directions).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub transmitted: u64,
    pub lost: u64,
    pub corrupted: u64,
}

/// Outcome of [`Simulator::run`].
#[derive(Debug, Clone)]
pub struct SimulationReport {
    /// Messages the sender accepted, in submission order.
    pub accepted: Vec<Message>,
    /// Messages the receiver delivered, in delivery order.
    pub delivered: Vec<Message>,
    pub sender: SenderStats,
    pub receiver: ReceiverStats,
    pub channel: ChannelStats,
    /// Times the sender armed an armed timer or disarmed an idle one.
    pub timer_violations: u64,
    /// Virtual time when the run ended.
    pub elapsed: Duration,
    /// `false` when the run hit `max_time` with work outstanding.
    pub completed: bool,
}

impl SimulationReport {
    /// `true` when delivery matches submission exactly.
    pub fn in_order(&self) -> bool {
        self.accepted == self.delivered
    }
}

// ---------------------------------------------------------------------------
// Event queue
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum EventKind {
    AppTick,
    ToSender(Packet),
    ToReceiver(Packet),
}

#[derive(Debug)]
struct Event {
    at: Duration,
    /// Insertion counter; breaks ties so equal times stay FIFO.
    order: u64,
    kind: EventKind,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        (self.at, self.order) == (other.at, other.order)
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    // Reversed so the max-heap pops the earliest event.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.at, other.order).cmp(&(self.at, self.order))
    }
}

#[derive(Debug, Default)]
struct EventQueue {
    heap: BinaryHeap<Event>,
    counter: u64,
}

impl EventQueue {
    fn push(&mut self, at: Duration, kind: EventKind) {
        self.counter += 1;
        self.heap.push(Event {
            at,
            order: self.counter,
            kind,
        });
    }

    fn next_at(&self) -> Option<Duration> {
        self.heap.peek().map(|e| e.at)
    }

    fn pop(&mut self) -> Option<Event> {
        self.heap.pop()
    }
}

// ---------------------------------------------------------------------------
// Collaborators handed to the windows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ToReceiver,
    ToSender,
}

/// One direction of the lossy channel, borrowed for a single entry point.
struct Wire<'a> {
    now: Duration,
    direction: Direction,
    loss_prob: f64,
    corrupt_prob: f64,
    rng: &'a mut StdRng,
    last_arrival: &'a mut Duration,
    queue: &'a mut EventQueue,
    stats: &'a mut ChannelStats,
}

impl Channel for Wire<'_> {
    fn transmit(&mut self, packet: Packet) {
        self.stats.transmitted += 1;

        if self.rng.random_bool(self.loss_prob) {
            self.stats.lost += 1;
            log::debug!(
                "[sim] {:?} packet lost (seq={} ack={})",
                self.direction,
                packet.seqnum,
                packet.acknum
            );
            return;
        }

        let mut packet = packet;
        if self.rng.random_bool(self.corrupt_prob) {
            self.stats.corrupted += 1;
            packet = corrupt(packet, self.rng);
            log::debug!("[sim] {:?} packet corrupted", self.direction);
        }

        // Never overtake a packet already in flight in this direction.
        let depart = self.now.max(*self.last_arrival);
        let arrival = depart + UNIT + UNIT.mul_f64(9.0 * self.rng.random::<f64>());
        *self.last_arrival = arrival;

        let kind = match self.direction {
            Direction::ToReceiver => EventKind::ToReceiver(packet),
            Direction::ToSender => EventKind::ToSender(packet),
        };
        self.queue.push(arrival, kind);
    }
}

/// Alter one byte of the encoded packet to a different value.
pub(crate) fn corrupt(packet: Packet, rng: &mut StdRng) -> Packet {
    let mut bytes = packet.encode();
    let pos = rng.random_range(0..WIRE_LEN);
    bytes[pos] ^= rng.random_range(1..=u8::MAX);
    Packet::decode(&bytes).unwrap_or(packet)
}

/// The sender's single-shot timer on the virtual clock.
#[derive(Debug, Default)]
struct SimTimer {
    now: Duration,
    deadline: Option<Duration>,
    violations: u64,
}

impl Timer for SimTimer {
    fn arm(&mut self, duration: Duration) {
        if self.deadline.is_some() {
            log::warn!("[sim] attempt to arm a timer that is already armed");
            self.violations += 1;
        }
        self.deadline = Some(self.now + duration);
    }

    fn disarm(&mut self) {
        if self.deadline.is_none() {
            log::warn!("[sim] attempt to disarm a timer that is not armed");
            self.violations += 1;
        }
        self.deadline = None;
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// A sender/receiver pair joined by a simulated unreliable channel.
#[derive(Debug)]
pub struct Simulator {
    config: SimulatorConfig,
    rng: StdRng,
    clock: Duration,
    queue: EventQueue,
    timer: SimTimer,

    sender: SenderWindow,
    receiver: ReceiverWindow,

    last_to_receiver: Duration,
    last_to_sender: Duration,
    channel: ChannelStats,

    generated: usize,
    outbox: VecDeque<Message>,
    accepted: Vec<Message>,
    delivered: Vec<Message>,
}

impl Simulator {
    pub fn new(protocol: SrConfig, config: SimulatorConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        if !protocol.is_alias_free() {
            log::warn!(
                "[sim] sequence space {} < 2 × window {}; stale retransmissions can alias",
                protocol.seq_space,
                protocol.window_size
            );
        }
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            sender: SenderWindow::new(protocol.clone())?,
            receiver: ReceiverWindow::new(protocol)?,
            clock: Duration::ZERO,
            queue: EventQueue::default(),
            timer: SimTimer::default(),
            last_to_receiver: Duration::ZERO,
            last_to_sender: Duration::ZERO,
            channel: ChannelStats::default(),
            generated: 0,
            outbox: VecDeque::new(),
            accepted: Vec::new(),
            delivered: Vec::new(),
            config,
        })
    }

    /// Run until every message is delivered and acknowledged, or until
    /// `max_time` passes.
    pub fn run(mut self) -> SimulationReport {
        if self.config.messages > 0 {
            let first = self.next_interarrival();
            self.queue.push(first, EventKind::AppTick);
        }

        let completed = loop {
            let next_event = self.queue.next_at();
            let timer_due = self.timer.deadline;

            let at = match (next_event, timer_due) {
                (None, None) => break true,
                (Some(e), Some(t)) => e.min(t),
                (Some(e), None) => e,
                (None, Some(t)) => t,
            };
            if at > self.config.max_time {
                log::warn!("[sim] gave up at {:?} with work outstanding", self.config.max_time);
                break false;
            }
            self.clock = at;
            self.timer.now = at;

            // Packet and application events scheduled for the same instant
            // run before the timer.
            if next_event == Some(at) {
                if let Some(event) = self.queue.pop() {
                    self.dispatch(event.kind);
                }
            } else {
                self.fire_timer();
            }
        };

        SimulationReport {
            accepted: self.accepted,
            delivered: self.delivered,
            sender: self.sender.stats().clone(),
            receiver: self.receiver.stats().clone(),
            channel: self.channel,
            timer_violations: self.timer.violations,
            elapsed: self.clock,
            completed,
        }
    }

    fn dispatch(&mut self, kind: EventKind) {
        match kind {
            EventKind::AppTick => {
                let i = self.generated;
                self.generated += 1;
                self.outbox.push_back(Message::filled(b'a' + (i % 26) as u8));
                if self.generated < self.config.messages {
                    let at = self.clock + self.next_interarrival();
                    self.queue.push(at, EventKind::AppTick);
                }
                self.flush_outbox();
            }
            EventKind::ToSender(packet) => {
                self.sender.on_ack_received(&packet, &mut self.timer);
                self.flush_outbox();
            }
            EventKind::ToReceiver(packet) => {
                let mut wire = Wire {
                    now: self.clock,
                    direction: Direction::ToSender,
                    loss_prob: self.config.loss_prob,
                    corrupt_prob: self.config.corrupt_prob,
                    rng: &mut self.rng,
                    last_arrival: &mut self.last_to_sender,
                    queue: &mut self.queue,
                    stats: &mut self.channel,
                };
                self.receiver
                    .on_packet_received(&packet, &mut wire, &mut self.delivered);
            }
        }
    }

    fn fire_timer(&mut self) {
        self.timer.deadline = None;
        let mut wire = Wire {
            now: self.clock,
            direction: Direction::ToReceiver,
            loss_prob: self.config.loss_prob,
            corrupt_prob: self.config.corrupt_prob,
            rng: &mut self.rng,
            last_arrival: &mut self.last_to_receiver,
            queue: &mut self.queue,
            stats: &mut self.channel,
        };
        self.sender.on_timer_expired(&mut wire, &mut self.timer);
    }

    /// Submit waiting messages until the window refuses one.
    fn flush_outbox(&mut self) {
        let mut wire = Wire {
            now: self.clock,
            direction: Direction::ToReceiver,
            loss_prob: self.config.loss_prob,
            corrupt_prob: self.config.corrupt_prob,
            rng: &mut self.rng,
            last_arrival: &mut self.last_to_receiver,
            queue: &mut self.queue,
            stats: &mut self.channel,
        };
        while let Some(&message) = self.outbox.front() {
            if self.sender.submit(message, &mut wire, &mut self.timer).is_err() {
                break;
            }
            self.outbox.pop_front();
            self.accepted.push(message);
        }
    }

    /// Uniform in `[0, 2 × interarrival)`, so the mean is `interarrival`.
    fn next_interarrival(&mut self) -> Duration {
        self.config.interarrival.mul_f64(2.0 * self.rng.random::<f64>())
    }
}
