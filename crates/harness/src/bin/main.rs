//! Gridlock CLI
//!
//! Runs contention phases and prints a summary for each. By default it runs
//! an unordered phase, which is expected to deadlock and be diagnosed by the
//! monitor, followed by a total-order phase, which is not.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use gridlock_harness::{Phase, PhaseConfig, PhaseSummary};
use gridlock_types::{AcquisitionMode, PairingRule};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gridlock")]
#[command(about = "Resource contention harness with deadlock avoidance and detection")]
#[command(version)]
struct Cli {
    /// Number of resources (minimum 2)
    #[arg(short, long, default_value = "5")]
    resources: usize,

    /// Number of workers (minimum 2)
    #[arg(short, long, default_value = "5")]
    workers: usize,

    /// Seconds without progress before a stall is declared (minimum 1)
    #[arg(short = 't', long, default_value = "3")]
    stall_timeout: u64,

    /// Seconds each phase runs (minimum 3)
    #[arg(short, long, default_value = "12")]
    duration: u64,

    /// Which phases to run
    #[arg(long, value_enum, default_value = "both")]
    mode: ModeArg,

    /// Resource pairing rule (paired, adjacent)
    #[arg(long, default_value = "paired")]
    pairing: PairingRule,

    /// Seed for worker delays
    #[arg(long, default_value = "12345")]
    seed: u64,

    /// Print each summary as a JSON line instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Unordered, then total order
    Both,
    /// Parity-dependent lock order; may deadlock
    Unordered,
    /// Ascending lock order; cannot deadlock
    TotalOrder,
}

impl ModeArg {
    fn modes(self) -> &'static [AcquisitionMode] {
        match self {
            ModeArg::Both => &AcquisitionMode::ALL,
            ModeArg::Unordered => &[AcquisitionMode::Unordered],
            ModeArg::TotalOrder => &[AcquisitionMode::TotalOrder],
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let base = PhaseConfig::new(cli.resources, cli.workers)
        .with_stall_timeout(Duration::from_secs(cli.stall_timeout))
        .with_duration(Duration::from_secs(cli.duration))
        .with_pairing(cli.pairing)
        .with_seed(cli.seed);
    let (base, _) = base.validated();

    for (label, mode) in ('A'..).zip(cli.mode.modes()) {
        let config = base.clone().with_mode(*mode);
        if !cli.json {
            println!(
                "=== Phase {label}: {mode} === (R={}, W={}, stall timeout={}s, duration={}s)",
                config.resources,
                config.workers,
                config.stall_timeout.as_secs(),
                config.duration.as_secs()
            );
        }

        let phase = Phase::start(config).with_context(|| format!("starting {mode} phase"))?;
        let summary = phase.await_completion();
        print_summary(&summary, cli.json)?;
    }

    if !cli.json {
        println!("Done.");
    }
    Ok(())
}

fn print_summary(summary: &PhaseSummary, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(summary)?);
        return Ok(());
    }

    if let Some(stall) = &summary.stall {
        eprint!("{stall}");
    }
    println!("{summary}\n");
    Ok(())
}
