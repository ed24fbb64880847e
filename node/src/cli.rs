//! # CLI Interface
//!
//! Defines the command-line argument structure for `vela-node` using
//! `clap` derive. Supports three subcommands: `replay`, `quote`, and
//! `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Vela ledger host.
///
/// Replays scripted operation sequences against a freshly configured
/// ledger, prints formula quotes, and reports Prometheus counters.
#[derive(Parser, Debug)]
#[command(
    name = "vela-node",
    about = "Vela ledger host",
    version,
    propagate_version = true
)]
pub struct VelaNodeCli {
    /// Log output format: `pretty` or `json`.
    #[arg(long, global = true, env = "VELA_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the Vela node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a JSON operation script against a new ledger.
    Replay(ReplayArgs),
    /// Evaluate one ledger formula without any state.
    #[command(subcommand)]
    Quote(QuoteCommand),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `replay` subcommand.
#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// Path to the operation script (JSON).
    pub script: PathBuf,

    /// Path to the ledger configuration file (JSON).
    #[arg(long, short = 'c', env = "VELA_CONFIG")]
    pub config: PathBuf,

    /// Print Prometheus counters to stderr after the run.
    #[arg(long)]
    pub metrics: bool,

    /// Include every committed event in the report.
    #[arg(long)]
    pub events: bool,
}

/// Stateless formula quotes.
#[derive(Subcommand, Debug)]
pub enum QuoteCommand {
    /// Mana left after spending from a full bucket and waiting.
    Mana {
        /// Mana spent at t = 0.
        #[arg(long)]
        spent: u64,
        /// Seconds waited afterwards.
        #[arg(long, default_value_t = 0)]
        elapsed: i64,
        /// Refill rate, precision 100 (10000 = 100.00/h).
        #[arg(long, default_value_t = vela_protocol::config::DEFAULT_MANA_RATE)]
        rate: u64,
    },
    /// Value a product accrues over a span.
    Yield {
        /// Base daily return.
        #[arg(long)]
        base: u128,
        /// Global factor, precision 100.
        #[arg(long, default_value_t = 100)]
        factor: u128,
        /// Product level.
        #[arg(long, default_value_t = 1)]
        level: u32,
        /// Apply the reward booster.
        #[arg(long)]
        reward_boost: bool,
        /// Span in seconds.
        #[arg(long)]
        seconds: i64,
    },
    /// Amount vested for a balance after some time.
    Vesting {
        /// Snapshot balance.
        #[arg(long)]
        balance: u128,
        /// Seconds since the start date.
        #[arg(long)]
        elapsed: i64,
        /// Period length in seconds.
        #[arg(long, default_value_t = 2_592_000)]
        period_length: u64,
        /// Number of periods.
        #[arg(long, default_value_t = 12)]
        periods: u64,
    },
    /// Claim fee for a level.
    ClaimFee {
        /// Product level.
        #[arg(long)]
        level: u32,
    },
}
