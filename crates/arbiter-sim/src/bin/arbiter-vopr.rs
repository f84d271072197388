//! arbiter-vopr: randomized simulation runner for the conflict resolver.
//!
//! # Usage
//!
//! ```bash
//! # Run with a specific seed
//! arbiter-vopr --seed 12345
//!
//! # Run many seeds
//! arbiter-vopr --iterations 1000
//!
//! # Load workload shape from a file
//! arbiter-vopr --config sim.toml -v
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use arbiter_sim::{SimConfig, run_simulation};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "arbiter-vopr", about = "Randomized simulation of the disk conflict resolver")]
struct Cli {
    /// First seed to run.
    #[arg(long)]
    seed: Option<u64>,

    /// Number of consecutive seeds to run.
    #[arg(long, default_value_t = 1)]
    iterations: u64,

    /// TOML file with simulation settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the number of requests per run.
    #[arg(long)]
    requests: Option<usize>,

    /// Log every run, not just failures.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => SimConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => SimConfig::default(),
    };
    if let Some(requests) = cli.requests {
        config = config.with_requests(requests);
    }
    let first_seed = cli.seed.unwrap_or(config.seed);

    let mut failures = 0u64;
    for seed in first_seed..first_seed.saturating_add(cli.iterations) {
        let run = config.clone().with_seed(seed);
        match run_simulation(&run) {
            Ok(report) => {
                if cli.verbose {
                    println!(
                        "seed {seed}: ok ({} requests, {} reads verified, {} max held)",
                        report.requests, report.reads_verified, report.held_high_water
                    );
                }
            }
            Err(error) => {
                failures += 1;
                println!("seed {seed}: FAILED: {error}");
            }
        }
    }

    println!(
        "{} runs, {} passed, {failures} failed",
        cli.iterations,
        cli.iterations - failures
    );
    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
