//! Integration tests for vesting redemption through the orchestrator.
//!
//! Covers the snapshot-on-first-redeem rule, delegated redemption used as a
//! purchase payment, and the shared redeemed counter that ties the two
//! modes together.

use vela_contracts::orchestrator::{Orchestrator, PaymentSource};
use vela_contracts::sale::{SaleDescriptor, SaleTarget};
use vela_contracts::settings::{LedgerConfig, Settings};
use vela_contracts::vesting::{RedeemMode, VestingError, VestingSchedule};
use vela_contracts::{LedgerError, LedgerEvent};
use vela_protocol::assets::{AssetBook, FungibleAssets};
use vela_protocol::config::{CUSTODY_ADDRESS, VESTING_CUSTODY_ADDRESS};
use vela_protocol::error::{Classify, ErrorKind};
use vela_protocol::positions::PositionBook;
use vela_protocol::roles::{Role, RoleTable};
use vela_protocol::time::Timestamp;

const T0: Timestamp = 1_700_000_000;
const MONTH: i64 = 2_592_000;

fn schedule(start_date: Timestamp) -> VestingSchedule {
    VestingSchedule {
        start_date,
        period_length: MONTH as u64,
        number_of_periods: 12,
    }
}

/// Helper: alice holds 10_000 of the vesting asset; the vesting custody
/// account is funded with the payout asset.
fn world() -> Orchestrator {
    let mut assets = AssetBook::new();
    for symbol in ["USDV", "SEED", "HARVEST", "pVELA"] {
        assets.register(symbol, None).unwrap();
    }
    assets.mint("pVELA", "alice", 10_000).unwrap();
    assets.mint("USDV", VESTING_CUSTODY_ADDRESS, 1_000_000).unwrap();

    let mut roles = RoleTable::new();
    roles.grant("admin", Role::Admin);
    roles.grant("manager", Role::Manager);

    let settings = Settings {
        factor: 100,
        dao_fee_bps: 1_000,
        operation_fee_bps: 500,
        dao_payee: "dao".into(),
        operation_payee: "ops".into(),
        claim_mana_cost: 10,
        level_up_mana_cost: 20,
        claim_fee_asset: "SEED".into(),
        level_up_asset: "SEED".into(),
        payment_asset: "USDV".into(),
        reserve_asset: "HARVEST".into(),
        vesting_asset: "pVELA".into(),
        allowed_product_types: ["orchard".to_string()].into_iter().collect(),
        product_types: [("orchard".to_string(), 8_640_000)].into_iter().collect(),
    };
    let config = LedgerConfig {
        mana_rate: 10_000,
        initial_mana: 100,
        settings,
        vesting: schedule(T0),
    };
    let mut ledger = Orchestrator::new(config, assets, PositionBook::new(), roles).unwrap();
    ledger
        .put_sale(
            "manager",
            1,
            SaleDescriptor {
                target: SaleTarget::Product {
                    product_type: "orchard".into(),
                },
                price: 1_000,
                available_supply: 10,
                initial_supply: 10,
                mana_cost_per_unit: 5,
                start_at: T0,
                duration: 86_400,
                max_per_call: 5,
                activated: true,
                sold: 0,
            },
        )
        .unwrap();
    ledger.take_events();
    ledger
}

#[test]
fn redeem_before_start_is_a_window_violation() {
    let mut ledger = world();
    let err = ledger.redeem("alice", "alice", T0 - 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WindowViolation);
    assert!(ledger.state().vesting.receiver("alice").is_none());
}

#[test]
fn one_period_vests_one_twelfth() {
    let mut ledger = world();
    let at = T0 + MONTH;

    assert_eq!(ledger.percent_vested(at), 833);
    assert_eq!(ledger.currently_redeemable("alice", at).unwrap(), 833);

    let withdrawal = ledger.redeem("alice", "alice", at).unwrap();
    assert_eq!(withdrawal.amount, 833);
    assert_eq!(withdrawal.mode, RedeemMode::Vesting);
    assert_eq!(ledger.assets().balance_of("USDV", "alice"), 833);
    assert_eq!(
        ledger.assets().balance_of("USDV", VESTING_CUSTODY_ADDRESS),
        1_000_000 - 833
    );

    let err = ledger.redeem("alice", "alice", at).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Vesting(VestingError::NothingToRedeem(_))
    ));
}

#[test]
fn snapshot_freezes_on_first_redeem() {
    let mut ledger = world();
    ledger.redeem("alice", "alice", T0 + MONTH).unwrap();

    // Balance changes after registration do not move the base.
    ledger
        .assets_mut()
        .transfer("pVELA", "alice", "bob", 10_000)
        .unwrap();
    let receiver = ledger.state().vesting.receiver("alice").unwrap();
    assert_eq!(receiver.initial_amount_snapshot, 10_000);

    assert_eq!(ledger.currently_redeemable("alice", T0 + 2 * MONTH).unwrap(), 833);
    let w = ledger.redeem("alice", "carol", T0 + 2 * MONTH).unwrap();
    assert_eq!(w.amount, 833);
    assert_eq!(ledger.assets().balance_of("USDV", "carol"), 833);
}

#[test]
fn vesting_is_capped_after_the_last_period() {
    let ledger = world();
    assert_eq!(ledger.percent_vested(T0 + 13 * MONTH), 10_000);
    assert_eq!(ledger.currently_redeemable("alice", T0 + 13 * MONTH).unwrap(), 10_000);
}

#[test]
fn vesting_payment_draws_on_the_snapshot() {
    let mut ledger = world();

    let receipt = ledger
        .purchase("alice", 1, 2, PaymentSource::Vesting, T0)
        .unwrap();
    assert_eq!(receipt.paid, 2_000);
    assert_eq!(receipt.positions, vec![1, 2]);

    let receiver = ledger.state().vesting.receiver("alice").unwrap();
    assert!(receiver.is_registered);
    assert_eq!(receiver.redeemed_amount, 2_000);
    assert_eq!(ledger.state().vesting.total_redeemed(), 2_000);
    assert_eq!(ledger.assets().balance_of("USDV", "dao"), 200);
    assert_eq!(ledger.assets().balance_of("USDV", CUSTODY_ADDRESS), 0);

    let events = ledger.take_events();
    assert!(events.iter().any(|e| matches!(
        e,
        LedgerEvent::Withdrawal(w) if w.mode == RedeemMode::Delegated { amount: 2_000 }
    )));

    // One vested period (833) is already covered by the 2_000 spent.
    assert_eq!(ledger.currently_redeemable("alice", T0 + MONTH).unwrap(), 0);
    let err = ledger.redeem("alice", "alice", T0 + MONTH).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);

    // Three periods vest 2_500, leaving 500 after the delegated spend.
    assert_eq!(ledger.currently_redeemable("alice", T0 + 3 * MONTH).unwrap(), 500);
}

#[test]
fn vesting_payment_beyond_snapshot_rolls_back() {
    let mut ledger = world();
    ledger
        .assets_mut()
        .transfer("pVELA", "alice", "bob", 9_000)
        .unwrap();

    let err = ledger
        .purchase("alice", 1, 2, PaymentSource::Vesting, T0)
        .unwrap_err();

    assert!(matches!(
        err,
        LedgerError::Vesting(VestingError::ExceedsSnapshot { .. })
    ));
    assert!(ledger.state().vesting.receiver("alice").is_none());
    assert_eq!(ledger.mana_of("alice", T0), 100);
    assert!(ledger.events().is_empty());
}

#[test]
fn unfunded_vesting_custody_is_a_consistency_violation() {
    let mut ledger = world();
    ledger
        .assets_mut()
        .burn("USDV", VESTING_CUSTODY_ADDRESS, 1_000_000)
        .unwrap();

    let err = ledger.redeem("alice", "alice", T0 + MONTH).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConsistencyViolation);
    assert!(ledger.state().vesting.receiver("alice").is_none());
}

#[test]
fn schedule_changes_lock_once_vesting_starts() {
    let mut ledger = world();

    let err = ledger
        .set_vesting_schedule("manager", schedule(T0 + MONTH), T0 - 10)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AdmissionDenied);

    ledger
        .set_vesting_schedule("admin", schedule(T0 + MONTH), T0 - 10)
        .unwrap();
    assert_eq!(ledger.state().vesting.schedule().start_date, T0 + MONTH);

    let err = ledger
        .set_vesting_schedule("admin", schedule(T0 + 2 * MONTH), T0 + MONTH)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WindowViolation);
}
