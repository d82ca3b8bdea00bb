//! Entry point for `sr-sim`.
//!
//! Runs one Selective Repeat transfer through the discrete-event simulator
//! and prints the counters.  All protocol work is delegated to the library;
//! `main.rs` owns only process setup (logging, argument parsing).
//!
//! ```text
//! RUST_LOG=debug sr-sim --messages 50 --loss 0.2 --corrupt 0.1 --seq-space 12
//! ```

use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};

use selective_repeat::simulator::{SimulationReport, Simulator, SimulatorConfig};
use selective_repeat::{CorruptPolicy, OutOfWindowPolicy, SrConfig};

/// Selective Repeat ARQ over a simulated lossy channel.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Number of messages the sending application produces.
    #[arg(short, long, default_value_t = 20)]
    messages: usize,

    /// Packet loss probability (0.0 to 1.0).
    #[arg(short, long, default_value_t = 0.0)]
    loss: f64,

    /// Packet corruption probability (0.0 to 1.0).
    #[arg(short, long, default_value_t = 0.0)]
    corrupt: f64,

    /// Mean time between application messages, in milliseconds.
    #[arg(long, default_value_t = 10)]
    interarrival: u64,

    /// Send/receive window size.
    #[arg(short, long, default_value_t = 6)]
    window: usize,

    /// Number of distinct sequence numbers.
    #[arg(short, long, default_value_t = 7)]
    seq_space: u32,

    /// Retransmission timeout, in milliseconds.
    #[arg(short, long, default_value_t = 16)]
    timeout: u64,

    /// Seed for the channel's random faults.
    #[arg(long, default_value_t = 1234)]
    seed: u64,

    /// Give up after this much virtual time, in seconds.
    #[arg(long, default_value_t = 3600)]
    max_time: u64,

    /// Receiver reaction to corrupted packets.
    #[arg(long, value_enum, default_value_t = CorruptArg::Drop)]
    on_corrupt: CorruptArg,

    /// Receiver reaction to packets behind its window.
    #[arg(long, value_enum, default_value_t = OutOfWindowArg::AckPacket)]
    on_out_of_window: OutOfWindowArg,
}

#[derive(Clone, Copy, ValueEnum)]
enum CorruptArg {
    Drop,
    AckLastDelivered,
}

impl From<CorruptArg> for CorruptPolicy {
    fn from(arg: CorruptArg) -> Self {
        match arg {
            CorruptArg::Drop => CorruptPolicy::Drop,
            CorruptArg::AckLastDelivered => CorruptPolicy::AckLastDelivered,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutOfWindowArg {
    Ignore,
    AckPacket,
    AckLastDelivered,
}

impl From<OutOfWindowArg> for OutOfWindowPolicy {
    fn from(arg: OutOfWindowArg) -> Self {
        match arg {
            OutOfWindowArg::Ignore => OutOfWindowPolicy::Ignore,
            OutOfWindowArg::AckPacket => OutOfWindowPolicy::AckPacket,
            OutOfWindowArg::AckLastDelivered => OutOfWindowPolicy::AckLastDelivered,
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    let protocol = SrConfig::new(cli.window, cli.seq_space)
        .with_timeout(Duration::from_millis(cli.timeout))
        .with_corrupt_policy(cli.on_corrupt.into())
        .with_out_of_window_policy(cli.on_out_of_window.into());
    let sim = SimulatorConfig {
        messages: cli.messages,
        loss_prob: cli.loss,
        corrupt_prob: cli.corrupt,
        interarrival: Duration::from_millis(cli.interarrival),
        max_time: Duration::from_secs(cli.max_time),
        seed: cli.seed,
    };

    log::info!(
        "Simulating {} message(s): window={} seq_space={} loss={} corrupt={}",
        sim.messages,
        protocol.window_size,
        protocol.seq_space,
        sim.loss_prob,
        sim.corrupt_prob
    );

    let report = Simulator::new(protocol, sim)
        .context("invalid simulation parameters")?
        .run();
    print_report(&report);

    if !report.completed {
        bail!("transfer did not complete within {}s", cli.max_time);
    }
    if !report.in_order() {
        bail!(
            "delivered stream differs from submitted stream ({} sent, {} delivered)",
            report.accepted.len(),
            report.delivered.len()
        );
    }
    Ok(())
}

fn print_report(report: &SimulationReport) {
    let s = &report.sender;
    let r = &report.receiver;
    let c = &report.channel;
    println!("elapsed            {:?}", report.elapsed);
    println!("messages accepted  {}", report.accepted.len());
    println!("messages delivered {}", report.delivered.len());
    println!("in order           {}", report.in_order());
    println!();
    println!(
        "sender   submitted={} window_full={} retransmissions={}",
        s.submitted, s.window_full, s.retransmissions
    );
    println!(
        "         acks={} new={} duplicate={} corrupted={}",
        s.acks_received, s.new_acks, s.duplicate_acks, s.corrupted_acks
    );
    println!(
        "receiver packets={} duplicates={} out_of_window={} corrupted={} acks_sent={}",
        r.packets_received, r.duplicates, r.out_of_window, r.corrupted, r.acks_sent
    );
    println!(
        "channel  transmitted={} lost={} corrupted={}",
        c.transmitted, c.lost, c.corrupted
    );
    println!("timer violations   {}", report.timer_violations);

    log::info!(
        "done: delivered={} retransmissions={} completed={}",
        report.delivered.len(),
        s.retransmissions,
        report.completed
    );
}
