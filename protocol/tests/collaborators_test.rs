//! Integration tests for the in-memory collaborators.
//!
//! The ledger stages every operation on a clone of its collaborators and
//! discards the clone on failure. These tests pin down the properties that
//! depend on: clones are independent, failed calls leave no trace, and
//! balances and ownership stay consistent across mixed sequences.

use vela_protocol::accrual;
use vela_protocol::assets::{AssetBook, AssetError, FungibleAssets};
use vela_protocol::error::{Classify, ErrorKind};
use vela_protocol::positions::{PositionBook, PositionError, PositionRegistry};
use vela_protocol::roles::{Role, RoleAuthority, RoleTable};
use vela_protocol::time::{Clock, ManualClock};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn funded_book() -> AssetBook {
    let mut book = AssetBook::new();
    book.register("USDV", None).unwrap();
    book.register("RELIC", Some(10)).unwrap();
    book.mint("USDV", "alice", 1_000).unwrap();
    book
}

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

#[test]
fn staged_clone_is_independent() {
    let committed = funded_book();
    let mut staged = committed.clone();

    staged.transfer("USDV", "alice", "bob", 400).unwrap();
    staged.burn("USDV", "bob", 100).unwrap();

    assert_eq!(committed.balance_of("USDV", "alice"), 1_000);
    assert_eq!(committed.balance_of("USDV", "bob"), 0);
    assert_eq!(committed.total_supply("USDV"), 1_000);

    assert_eq!(staged.balance_of("USDV", "alice"), 600);
    assert_eq!(staged.balance_of("USDV", "bob"), 300);
    assert_eq!(staged.total_supply("USDV"), 900);
}

#[test]
fn failed_transfer_leaves_balances_untouched() {
    let mut book = funded_book();
    let err = book.transfer("USDV", "alice", "bob", 1_001).unwrap_err();

    assert!(matches!(err, AssetError::InsufficientBalance { .. }));
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    assert_eq!(book.balance_of("USDV", "alice"), 1_000);
    assert_eq!(book.balance_of("USDV", "bob"), 0);
}

#[test]
fn capped_mint_reports_the_short_quantity() {
    let mut book = funded_book();
    assert_eq!(book.mint("RELIC", "alice", 7).unwrap(), 7);
    assert_eq!(book.mint("RELIC", "alice", 7).unwrap(), 3);
    assert_eq!(book.mint("RELIC", "alice", 1).unwrap(), 0);
    assert_eq!(book.total_supply("RELIC"), 10);

    let err = book.mint("GHOST", "alice", 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConsistencyViolation);
}

// ---------------------------------------------------------------------------
// Positions & roles
// ---------------------------------------------------------------------------

#[test]
fn positions_track_owners_through_transfers_and_burns() {
    let mut book = PositionBook::new();
    let a = book.mint("alice");
    let b = book.mint("alice");
    let c = book.mint("bob");
    assert_eq!((a, b, c), (1, 2, 3));

    book.transfer(b, "alice", "bob").unwrap();
    assert_eq!(book.positions_of("alice"), vec![1]);
    assert_eq!(book.positions_of("bob"), vec![2, 3]);

    let err = book.transfer(a, "bob", "carol").unwrap_err();
    assert!(matches!(err, PositionError::NotOwner { .. }));
    assert_eq!(err.kind(), ErrorKind::AdmissionDenied);

    book.burn(a).unwrap();
    assert_eq!(book.balance_of("alice"), 0);
    assert_eq!(book.owner_of(a), None);
    // Ids are never reused.
    assert_eq!(book.mint("alice"), 4);
}

#[test]
fn roles_are_independent_per_identity() {
    let mut roles = RoleTable::new();
    roles.grant("ops", Role::Manager);
    assert!(roles.has_role("ops", Role::Manager));
    assert!(!roles.has_role("ops", Role::Admin));
    assert!(!roles.has_role("alice", Role::Manager));
}

// ---------------------------------------------------------------------------
// Accrual on a manual clock
// ---------------------------------------------------------------------------

#[test]
fn accrual_is_a_pure_function_of_timestamps() {
    let clock = ManualClock::new(1_700_000_000);
    let origin = clock.now();

    clock.advance(3_599);
    assert_eq!(accrual::steps(accrual::span(origin, clock.now()).unwrap(), 60), 59);
    clock.advance(1);
    assert_eq!(accrual::steps(accrual::span(origin, clock.now()).unwrap(), 60), 60);

    clock.set(origin - 1);
    let err = accrual::span(origin, clock.now()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRange);
}
