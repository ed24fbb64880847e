// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Vela Node
//!
//! Entry point for the `vela-node` binary. Parses CLI arguments, initializes
//! logging and metrics, and hosts a ledger for scripted replay.
//!
//! The binary supports three subcommands:
//!
//! - `replay`: run a JSON operation script against a configured ledger
//! - `quote`: evaluate a single ledger formula without state
//! - `version`: print build version information

mod cli;
mod logging;
mod metrics;
mod script;

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::de::DeserializeOwned;
use serde_json::json;

use vela_contracts::mana::ManaLedger;
use vela_contracts::product::{self, BoostSet, Boosters, Product};
use vela_contracts::settings::LedgerConfig;
use vela_contracts::vesting::{VestingLedger, VestingSchedule};
use vela_protocol::config::{MANA_MAX, MAX_LEVEL, MIN_LEVEL};

use cli::{Commands, QuoteCommand, ReplayArgs, VelaNodeCli};
use logging::LogFormat;
use metrics::LedgerMetrics;

fn main() -> Result<()> {
    let cli = VelaNodeCli::parse();
    logging::init_logging(
        logging::DEFAULT_DIRECTIVES,
        LogFormat::from_str_lossy(&cli.log_format),
    );

    match cli.command {
        Commands::Replay(args) => replay(args),
        Commands::Quote(quote) => print_quote(quote),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {what} from {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {what} at {}", path.display()))
}

/// Replays a script and prints the report as JSON on stdout.
fn replay(args: ReplayArgs) -> Result<()> {
    let config: LedgerConfig = read_json(&args.config, "ledger config")?;
    let script: script::Script = read_json(&args.script, "script")?;
    tracing::info!(
        config = %args.config.display(),
        script = %args.script.display(),
        steps = script.steps.len(),
        "starting replay"
    );

    let metrics = LedgerMetrics::new().context("failed to create metrics registry")?;
    let report = script::run(config, &script, &metrics, args.events)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if args.metrics {
        eprint!("{}", metrics.encode()?);
    }
    if report.mismatches > 0 {
        bail!("{} step(s) did not go as expected", report.mismatches);
    }
    Ok(())
}

/// Evaluates one formula and prints the result as JSON on stdout.
fn print_quote(quote: QuoteCommand) -> Result<()> {
    let answer = match quote {
        QuoteCommand::Mana {
            spent,
            elapsed,
            rate,
        } => {
            let mut ledger = ManaLedger::new(rate, MANA_MAX);
            ledger.consume("quote", spent, 0)?;
            json!({
                "spent": spent,
                "elapsed": elapsed,
                "rate": rate,
                "available": ledger.available("quote", elapsed),
            })
        }
        QuoteCommand::Yield {
            base,
            factor,
            level,
            reward_boost,
            seconds,
        } => {
            if !(MIN_LEVEL..=MAX_LEVEL).contains(&level) {
                bail!("level {level} outside {MIN_LEVEL}..={MAX_LEVEL}");
            }
            let mut boosters = Boosters::default();
            boosters.apply(BoostSet {
                reward: reward_boost,
                ..BoostSet::default()
            });
            let quoted = Product {
                id: 0,
                product_type: "quote".into(),
                minted_at: 0,
                last_claimed_at: 0,
                total_claimed: 0,
                base_daily_return: base,
                level,
                boosters,
            };
            json!({
                "daily_return": quoted.daily_return(factor)?.to_string(),
                "value": quoted.value_at(factor, 0, seconds)?.to_string(),
                "claim_fee": quoted.claim_fee().to_string(),
            })
        }
        QuoteCommand::Vesting {
            balance,
            elapsed,
            period_length,
            periods,
        } => {
            let ledger = VestingLedger::new(VestingSchedule {
                start_date: 0,
                period_length,
                number_of_periods: periods,
            })?;
            let redeemable = ledger.currently_redeemable("quote", balance, elapsed)?;
            json!({
                "percent_vested": ledger.percent_vested(elapsed).to_string(),
                "redeemable": redeemable.to_string(),
            })
        }
        QuoteCommand::ClaimFee { level } => {
            if !(MIN_LEVEL..=MAX_LEVEL).contains(&level) {
                bail!("level {level} outside {MIN_LEVEL}..={MAX_LEVEL}");
            }
            json!({ "level": level, "claim_fee": product::claim_fee(level).to_string() })
        }
    };
    println!("{}", serde_json::to_string_pretty(&answer)?);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("vela-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc     {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}
