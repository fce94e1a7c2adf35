//! `qsp`: command-line driver for the state-preparation cost comparison.
//!
//! ```text
//! qsp sweep        run a dual-backend sweep and persist per-eps tables
//! qsp gate-counts  average the cost tool's prep / Clifford+T tallies
//! qsp generate     print a synthetic target state
//! qsp version      print version information
//! ```

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{gate_counts, generate, sweep, version};

/// Compare resource costs of quantum state-preparation synthesizers
#[derive(Parser)]
#[command(name = "qsp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a native vs. reference sweep
    Sweep(sweep::SweepArgs),

    /// Average the cost tool's gate tallies per (n, cardinality)
    GateCounts {
        /// Comma-separated qubit counts, e.g. 3,4,5
        #[arg(long)]
        n: String,

        /// Comma-separated cardinalities, e.g. 2,4,8
        #[arg(long)]
        card: String,

        /// Trials per configuration
        #[arg(long, default_value = "20")]
        trials: u32,

        /// Transpilation epsilon
        #[arg(long, default_value = "1e-3")]
        eps: f64,

        /// Base seed
        #[arg(long, default_value = "1")]
        seed: u64,

        /// Path to the cost-measurement binary
        #[arg(long, default_value = "./build/tools/prepare_state")]
        bin: PathBuf,

        /// Write the aggregate CSV to this path
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Print a generated target state as JSON
    Generate {
        /// Number of qubits
        #[arg(short, long)]
        n: u32,

        /// Nonzero amplitudes
        #[arg(short, long)]
        cardinality: u64,

        /// Seed
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Amplitude mode (uniform, randomized, randomized-complex)
        #[arg(long, default_value = "randomized")]
        mode: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Sweep(args) => sweep::execute(args).await,

        Commands::GateCounts {
            n,
            card,
            trials,
            eps,
            seed,
            bin,
            out,
        } => gate_counts::execute(&n, &card, trials, eps, seed, &bin, out.as_deref()).await,

        Commands::Generate {
            n,
            cardinality,
            seed,
            mode,
        } => generate::execute(n, cardinality, seed, &mode),

        Commands::Version => {
            version::execute();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
