//! Entry point for `gbn-sim`.
//!
//! Parses CLI arguments into a [`SimConfig`] and plays one run, either on the
//! deterministic virtual clock (default) or in wall time on the tokio driver
//! (`--realtime`).  The log stream goes to stdout through the console
//! presentation; `RUST_LOG` controls the `log` output on stderr.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use gbn_sim::driver::{self, Command};
use gbn_sim::presentation::Console;
use gbn_sim::{ErrorMode, Lifecycle, SimConfig, SimStats, Simulation};

/// Go-Back-N ARQ simulator.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Number of data packets to deliver.
    #[arg(short, long, default_value_t = 10)]
    packets: u32,

    /// Sender window size.
    #[arg(short, long, default_value_t = 4)]
    window: u32,

    /// Per-packet retransmission timeout in milliseconds.
    #[arg(long, default_value_t = 40_000)]
    timeout_ms: u64,

    /// Playback speed multiplier.
    #[arg(long, default_value_t = 2.0)]
    speed: f64,

    /// Loss model: none, random or manual.
    #[arg(long, default_value = "none")]
    error_mode: ErrorMode,

    /// ACK loss percentage in random mode.
    #[arg(long, default_value_t = 10)]
    error_rate: u8,

    /// Seed for the channel RNG (random when omitted).
    #[arg(long)]
    seed: Option<u64>,

    /// Give up after this many seconds of simulated time.
    #[arg(long, default_value_t = 3_600)]
    max_secs: u64,

    /// Play the run in wall time instead of as fast as possible.
    #[arg(long)]
    realtime: bool,

    /// Also print transmissions and window moves.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn sim_config(&self) -> SimConfig {
        let mut cfg = SimConfig::new(self.packets, self.window)
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_animation_speed(self.speed)
            .with_error_mode(self.error_mode)
            .with_error_rate(self.error_rate);
        if let Some(seed) = self.seed {
            cfg = cfg.with_seed(seed);
        }
        cfg
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    if cli.error_mode == ErrorMode::Manual {
        bail!("manual error mode needs an interactive presentation; use none or random");
    }

    let console = Console {
        verbose: cli.verbose,
    };
    let sim = Simulation::new(cli.sim_config(), console).context("invalid configuration")?;
    let limit = Duration::from_secs(cli.max_secs);

    let sim = if cli.realtime {
        run_realtime(sim, limit).await?
    } else {
        run_virtual(sim, limit)
    };

    print_summary(sim.lifecycle(), sim.now(), &sim.stats());
    Ok(())
}

fn run_virtual(mut sim: Simulation<Console>, limit: Duration) -> Simulation<Console> {
    let end = sim.run_to_completion(limit);
    log::info!("[gbn] run ended {end} at {:?}", sim.now());
    sim
}

async fn run_realtime(sim: Simulation<Console>, limit: Duration) -> Result<Simulation<Console>> {
    let mut handle = driver::spawn(sim);
    if !handle.send(Command::Start).await {
        bail!("driver task stopped before the run started");
    }

    let deadline = tokio::time::Instant::now() + limit;
    tokio::select! {
        _ = handle.completed() => {}
        _ = tokio::signal::ctrl_c() => log::info!("[gbn] interrupted"),
        _ = tokio::time::sleep_until(deadline) => log::info!("[gbn] time limit reached"),
    }

    handle.shutdown().await.context("driver task failed")
}

fn print_summary(lifecycle: Lifecycle, at: Duration, stats: &SimStats) {
    println!();
    println!("Run {lifecycle} after {:.1}s of simulated time", at.as_secs_f64());
    println!("  packets sent     {}", stats.packets_sent);
    println!("  retransmissions  {}", stats.retransmissions);
    println!("  ACKs sent        {}", stats.acks_sent);
    println!("  ACKs lost        {}", stats.acks_lost);
    println!("  packets lost     {}", stats.packets_lost);
    println!("  timeouts         {}", stats.timeouts);
}
