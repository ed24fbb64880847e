//! # Operation Scripts
//!
//! A script describes a starting world (assets, balances, role grants) and
//! a timed sequence of ledger operations. Replaying it drives a fresh
//! [`Orchestrator`] through the steps on a [`ManualClock`], so the same
//! script always produces the same report and the same state digest.
//!
//! ```json
//! {
//!   "start": 1700000000,
//!   "assets": [{ "symbol": "USDV", "balances": { "alice": 5000 } }],
//!   "roles": [{ "identity": "ops-team", "role": "manager" }],
//!   "steps": [
//!     { "op": { "purchase": { "buyer": "alice", "sale_id": 1, "amount": 2 } } },
//!     { "after": 3600, "expect": "ok", "op": { "claim": { "caller": "alice", "id": 1 } } },
//!     { "op": "percent_vested" }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vela_contracts::orchestrator::{Orchestrator, PaymentSource};
use vela_contracts::product::BoostSet;
use vela_contracts::sale::{SaleDescriptor, SaleId};
use vela_contracts::settings::{LedgerConfig, SettingChange};
use vela_contracts::vesting::VestingSchedule;
use vela_contracts::{LedgerError, LedgerEvent};
use vela_protocol::assets::{Address, Amount, AssetBook, AssetId, FungibleAssets};
use vela_protocol::error::{Classify, ErrorKind};
use vela_protocol::positions::{PositionBook, PositionId};
use vela_protocol::roles::{Role, RoleTable};
use vela_protocol::time::{self, Clock, ManualClock, SystemClock, Timestamp};

use crate::metrics::LedgerMetrics;

// ---------------------------------------------------------------------------
// Script format
// ---------------------------------------------------------------------------

/// A replayable scenario.
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    /// Clock value before the first step. Defaults to the wall clock.
    #[serde(default)]
    pub start: Option<Timestamp>,
    /// Assets to register and fund up front.
    #[serde(default)]
    pub assets: Vec<AssetSpec>,
    /// Role grants.
    #[serde(default)]
    pub roles: Vec<RoleGrant>,
    /// Operations, in order.
    pub steps: Vec<Step>,
}

/// One asset of the starting world.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetSpec {
    /// Asset symbol.
    pub symbol: AssetId,
    /// Optional supply cap.
    #[serde(default)]
    pub max_supply: Option<Amount>,
    /// Initial balances, minted at registration.
    #[serde(default)]
    pub balances: BTreeMap<Address, Amount>,
}

/// One role grant of the starting world.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleGrant {
    /// Grantee.
    pub identity: Address,
    /// Granted role.
    pub role: Role,
}

/// What a step is expected to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expect {
    /// The operation commits.
    Ok,
    /// The operation aborts with this kind.
    Rejected(ErrorKind),
}

/// A timed operation.
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// Absolute instant to run at.
    #[serde(default)]
    pub at: Option<Timestamp>,
    /// Seconds after the previous step. Ignored when `at` is set.
    #[serde(default)]
    pub after: Option<i64>,
    /// Expected outcome; unchecked when absent.
    #[serde(default)]
    pub expect: Option<Expect>,
    /// The operation itself, keyed by name.
    pub op: Operation,
}

fn direct() -> PaymentSource {
    PaymentSource::Direct
}

fn yes() -> bool {
    true
}

/// Every orchestrator entry point a script can call. Externally tagged so
/// `u128` amounts reach the deserializer unbuffered.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ApplySetting {
        caller: Address,
        change: SettingChange,
    },
    SetDefaultManaRate {
        caller: Address,
        rate: u64,
    },
    SetManaRate {
        caller: Address,
        identity: Address,
        rate: Option<u64>,
    },
    SetVestingSchedule {
        caller: Address,
        schedule: VestingSchedule,
    },
    PutSale {
        caller: Address,
        id: SaleId,
        descriptor: SaleDescriptor,
    },
    RemoveSale {
        caller: Address,
        id: SaleId,
    },
    SetSaleActivation {
        caller: Address,
        id: SaleId,
        activated: bool,
    },
    Boost {
        caller: Address,
        ids: Vec<PositionId>,
        boosts: BoostSet,
    },
    SetLevels {
        caller: Address,
        ids: Vec<PositionId>,
        level: u32,
    },
    LevelDown {
        caller: Address,
        id: PositionId,
    },
    Purchase {
        buyer: Address,
        sale_id: SaleId,
        amount: u64,
        #[serde(default = "direct")]
        payment: PaymentSource,
    },
    Claim {
        caller: Address,
        id: PositionId,
        #[serde(default = "yes")]
        pay_fee: bool,
    },
    LevelUp {
        caller: Address,
        id: PositionId,
    },
    Redeem {
        holder: Address,
        beneficiary: Address,
    },
    ManaOf {
        identity: Address,
    },
    QuoteClaim {
        id: PositionId,
    },
    QuoteLevelUp {
        id: PositionId,
    },
    QuotePurchase {
        buyer: Address,
        sale_id: SaleId,
        amount: u64,
    },
    ProductsOf {
        owner: Address,
    },
    CurrentlyRedeemable {
        holder: Address,
    },
    PercentVested,
    Balance {
        asset: AssetId,
        holder: Address,
    },
}

impl Operation {
    /// Short name for logs and the report.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::ApplySetting { .. } => "apply_setting",
            Operation::SetDefaultManaRate { .. } => "set_default_mana_rate",
            Operation::SetManaRate { .. } => "set_mana_rate",
            Operation::SetVestingSchedule { .. } => "set_vesting_schedule",
            Operation::PutSale { .. } => "put_sale",
            Operation::RemoveSale { .. } => "remove_sale",
            Operation::SetSaleActivation { .. } => "set_sale_activation",
            Operation::Boost { .. } => "boost",
            Operation::SetLevels { .. } => "set_levels",
            Operation::LevelDown { .. } => "level_down",
            Operation::Purchase { .. } => "purchase",
            Operation::Claim { .. } => "claim",
            Operation::LevelUp { .. } => "level_up",
            Operation::Redeem { .. } => "redeem",
            Operation::ManaOf { .. } => "mana_of",
            Operation::QuoteClaim { .. } => "quote_claim",
            Operation::QuoteLevelUp { .. } => "quote_level_up",
            Operation::QuotePurchase { .. } => "quote_purchase",
            Operation::ProductsOf { .. } => "products_of",
            Operation::CurrentlyRedeemable { .. } => "currently_redeemable",
            Operation::PercentVested => "percent_vested",
            Operation::Balance { .. } => "balance",
        }
    }

    /// `true` for read-only steps, which never touch the counters.
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            Operation::ManaOf { .. }
                | Operation::QuoteClaim { .. }
                | Operation::QuoteLevelUp { .. }
                | Operation::QuotePurchase { .. }
                | Operation::ProductsOf { .. }
                | Operation::CurrentlyRedeemable { .. }
                | Operation::PercentVested
                | Operation::Balance { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Result of one step.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Committed, or a query that answered.
    Ok {
        /// Receipt or query answer; `null` for plain setters.
        output: Value,
    },
    /// Aborted with no effect.
    Rejected {
        /// Error classification.
        kind: ErrorKind,
        /// Human-readable cause.
        message: String,
    },
}

/// One line of the replay report.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// Zero-based step index.
    pub index: usize,
    /// Operation name.
    pub op: &'static str,
    /// Instant the step ran at.
    pub at: Timestamp,
    /// `at` as RFC 3339.
    pub time: String,
    /// What happened.
    #[serde(flatten)]
    pub outcome: Outcome,
    /// `false` if the step's `expect` was not met.
    pub as_expected: bool,
}

/// Everything a replay produced.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Per-step results.
    pub steps: Vec<StepReport>,
    /// Mutating steps that committed.
    pub committed: u64,
    /// Mutating steps that aborted.
    pub rejected: u64,
    /// Steps whose `expect` was not met.
    pub mismatches: u64,
    /// Digest of the final committed state.
    pub digest: String,
    /// Committed events, when requested.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<LedgerEvent>,
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

/// Builds the starting ledger described by `script`.
pub fn build_ledger(config: LedgerConfig, script: &Script) -> anyhow::Result<Orchestrator> {
    let mut assets = AssetBook::new();
    for spec in &script.assets {
        assets
            .register(&spec.symbol, spec.max_supply)
            .with_context(|| format!("failed to register asset {}", spec.symbol))?;
        for (holder, amount) in &spec.balances {
            assets
                .mint(&spec.symbol, holder, *amount)
                .with_context(|| format!("failed to fund {holder} with {}", spec.symbol))?;
        }
    }

    let mut roles = RoleTable::new();
    for grant in &script.roles {
        roles.grant(&grant.identity, grant.role);
    }

    Orchestrator::new(config, assets, PositionBook::new(), roles)
        .context("invalid ledger configuration")
}

/// Replays every step of `script` against a fresh ledger.
pub fn run(
    config: LedgerConfig,
    script: &Script,
    metrics: &LedgerMetrics,
    keep_events: bool,
) -> anyhow::Result<Report> {
    let mut ledger = build_ledger(config, script)?;
    let clock = ManualClock::new(script.start.unwrap_or_else(|| SystemClock.now()));

    let mut report = Report {
        steps: Vec::with_capacity(script.steps.len()),
        committed: 0,
        rejected: 0,
        mismatches: 0,
        digest: String::new(),
        events: Vec::new(),
    };

    for (index, step) in script.steps.iter().enumerate() {
        match (step.at, step.after) {
            (Some(at), _) => clock.set(at),
            (None, Some(secs)) => clock.advance(secs),
            (None, None) => {}
        }
        let now = clock.now();
        let op = step.op.name();

        let outcome = match dispatch(&mut ledger, step.op.clone(), now) {
            Ok(output) => {
                if !step.op.is_query() {
                    report.committed += 1;
                    metrics.operations_committed_total.inc();
                }
                Outcome::Ok { output }
            }
            Err(err) => {
                let kind = err.kind();
                if !step.op.is_query() {
                    report.rejected += 1;
                    metrics.rejected(kind);
                }
                Outcome::Rejected {
                    kind,
                    message: err.to_string(),
                }
            }
        };

        for event in ledger.take_events() {
            metrics.event(event.name());
            if keep_events {
                report.events.push(event);
            }
        }

        let as_expected = match (step.expect, &outcome) {
            (None, _) => true,
            (Some(Expect::Ok), Outcome::Ok { .. }) => true,
            (Some(Expect::Rejected(want)), Outcome::Rejected { kind, .. }) => want == *kind,
            _ => false,
        };
        if !as_expected {
            report.mismatches += 1;
            tracing::warn!(index, op, expected = ?step.expect, "step did not go as expected");
        }

        report.steps.push(StepReport {
            index,
            op,
            at: now,
            time: time::display(now),
            outcome,
            as_expected,
        });
    }

    report.digest = ledger
        .state_digest()
        .context("failed to digest final state")?;
    tracing::info!(
        steps = report.steps.len(),
        committed = report.committed,
        rejected = report.rejected,
        digest = %report.digest,
        "replay finished"
    );
    Ok(report)
}

fn json<T: Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| Value::String(format!("unserializable: {e}")))
}

fn dispatch(ledger: &mut Orchestrator, op: Operation, now: Timestamp) -> Result<Value, LedgerError> {
    let output = match op {
        Operation::ApplySetting { caller, change } => {
            ledger.apply_setting(&caller, change)?;
            Value::Null
        }
        Operation::SetDefaultManaRate { caller, rate } => {
            ledger.set_default_mana_rate(&caller, rate)?;
            Value::Null
        }
        Operation::SetManaRate {
            caller,
            identity,
            rate,
        } => {
            ledger.set_mana_rate(&caller, &identity, rate)?;
            Value::Null
        }
        Operation::SetVestingSchedule { caller, schedule } => {
            ledger.set_vesting_schedule(&caller, schedule, now)?;
            Value::Null
        }
        Operation::PutSale {
            caller,
            id,
            descriptor,
        } => {
            ledger.put_sale(&caller, id, descriptor)?;
            Value::Null
        }
        Operation::RemoveSale { caller, id } => json(ledger.remove_sale(&caller, id)?),
        Operation::SetSaleActivation {
            caller,
            id,
            activated,
        } => {
            ledger.set_sale_activation(&caller, id, activated)?;
            Value::Null
        }
        Operation::Boost {
            caller,
            ids,
            boosts,
        } => json(ledger.boost(&caller, &ids, boosts)?),
        Operation::SetLevels { caller, ids, level } => {
            ledger.set_levels(&caller, &ids, level)?;
            Value::Null
        }
        Operation::LevelDown { caller, id } => json(ledger.level_down(&caller, id)?),
        Operation::Purchase {
            buyer,
            sale_id,
            amount,
            payment,
        } => json(ledger.purchase(&buyer, sale_id, amount, payment, now)?),
        Operation::Claim {
            caller,
            id,
            pay_fee,
        } => json(ledger.claim(&caller, id, pay_fee, now)?),
        Operation::LevelUp { caller, id } => json(ledger.level_up(&caller, id, now)?),
        Operation::Redeem {
            holder,
            beneficiary,
        } => json(ledger.redeem(&holder, &beneficiary, now)?),
        Operation::ManaOf { identity } => json(ledger.mana_of(&identity, now)),
        Operation::QuoteClaim { id } => json(ledger.quote_claim(id, now)?),
        Operation::QuoteLevelUp { id } => json(ledger.quote_level_up(id)?),
        Operation::QuotePurchase {
            buyer,
            sale_id,
            amount,
        } => json(ledger.quote_purchase(&buyer, sale_id, amount, now)?),
        Operation::ProductsOf { owner } => json(ledger.products_of(&owner, now)?),
        Operation::CurrentlyRedeemable { holder } => {
            json(ledger.currently_redeemable(&holder, now)?)
        }
        Operation::PercentVested => json(ledger.percent_vested(now)),
        Operation::Balance { asset, holder } => json(ledger.assets().balance_of(&asset, &holder)),
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = include_str!("../demo/ledger.json");
    const SCRIPT: &str = include_str!("../demo/script.json");

    fn config() -> LedgerConfig {
        serde_json::from_str(CONFIG).unwrap()
    }

    fn script() -> Script {
        serde_json::from_str(SCRIPT).unwrap()
    }

    #[test]
    fn demo_script_meets_every_expectation() {
        let metrics = LedgerMetrics::new().unwrap();
        let report = run(config(), &script(), &metrics, true).unwrap();

        let failed: Vec<_> = report
            .steps
            .iter()
            .filter(|s| !s.as_expected)
            .map(|s| (s.index, s.op))
            .collect();
        assert!(failed.is_empty(), "unexpected outcomes: {failed:?}");
        assert!(report.committed > 0);
        assert!(report.rejected > 0);
        assert!(!report.events.is_empty());
        assert_eq!(report.digest.len(), 64);
    }

    #[test]
    fn replay_is_deterministic() {
        let a = run(config(), &script(), &LedgerMetrics::new().unwrap(), false).unwrap();
        let b = run(config(), &script(), &LedgerMetrics::new().unwrap(), false).unwrap();
        assert_eq!(a.digest, b.digest);
        assert!(a.events.is_empty());
    }

    #[test]
    fn steps_parse_with_defaults() {
        let step: Step = serde_json::from_str(
            r#"{ "after": 60, "op": { "claim": { "caller": "alice", "id": 3 } } }"#,
        )
        .unwrap();
        assert_eq!(step.after, Some(60));
        assert!(step.expect.is_none());
        assert!(matches!(
            step.op,
            Operation::Claim {
                id: 3,
                pay_fee: true,
                ..
            }
        ));

        let step: Step = serde_json::from_str(
            r#"{ "op": { "purchase": { "buyer": "bob", "sale_id": 1, "amount": 1 } },
                 "expect": { "rejected": "resource_exhausted" } }"#,
        )
        .unwrap();
        assert_eq!(
            step.expect,
            Some(Expect::Rejected(ErrorKind::ResourceExhausted))
        );
    }

    #[test]
    fn steps_carry_full_width_amounts() {
        let step: Step = serde_json::from_str(
            r#"{ "op": { "apply_setting": { "caller": "m", "change": { "factor": 150 } } } }"#,
        )
        .unwrap();
        assert!(matches!(
            step.op,
            Operation::ApplySetting {
                change: SettingChange::Factor(150),
                ..
            }
        ));

        let step: Step = serde_json::from_str(
            r#"{ "op": { "put_sale": { "caller": "m", "id": 9, "descriptor": {
                   "target": { "kind": "asset", "asset": "SEED" },
                   "price": 36893488147419103232, "available_supply": 1, "initial_supply": 1,
                   "mana_cost_per_unit": 0, "start_at": 0, "duration": 60,
                   "max_per_call": 1, "activated": true } } } }"#,
        )
        .unwrap();
        match step.op {
            Operation::PutSale { descriptor, .. } => assert_eq!(descriptor.price, 1 << 65),
            other => panic!("parsed as {}", other.name()),
        }
    }

    #[test]
    fn clock_follows_at_and_after() {
        let script: Script = serde_json::from_str(
            r#"{
                "start": 1000,
                "steps": [
                    { "op": "percent_vested" },
                    { "after": 500, "op": "percent_vested" },
                    { "at": 5000, "op": "percent_vested" },
                    { "after": 1, "op": "percent_vested" }
                ]
            }"#,
        )
        .unwrap();
        let report = run(config(), &script, &LedgerMetrics::new().unwrap(), false).unwrap();
        let instants: Vec<_> = report.steps.iter().map(|s| s.at).collect();
        assert_eq!(instants, vec![1000, 1500, 5000, 5001]);
        assert_eq!(report.committed, 0);
    }

    #[test]
    fn bad_asset_setup_is_reported() {
        let script: Script = serde_json::from_str(
            r#"{
                "start": 0,
                "assets": [{ "symbol": "USDV" }, { "symbol": "USDV" }],
                "steps": []
            }"#,
        )
        .unwrap();
        let err = build_ledger(config(), &script).unwrap_err();
        assert!(err.to_string().contains("USDV"));
    }
}
