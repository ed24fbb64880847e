//! # Mana Ledger
//!
//! Mana is a per-identity budget that gates how often someone can act.
//! It refills continuously at an hourly rate and caps out at
//! [`MANA_MAX`].
//!
//! Nothing is stored per tick. Each account keeps a single `refill_origin`:
//! a virtual instant from which elapsed time yields the banked mana.
//!
//! ```text
//! available = clamp((now - refill_origin) * rate / (PRECISION * 3600), 0, MAX)
//! ```
//!
//! Two lazy clamps keep the model honest:
//!
//! 1. On read, `refill_origin` is pulled forward to at most one full bucket
//!    behind `now`, so idling longer than a refill never banks more than
//!    `MAX`.
//! 2. On consume, the origin advances by the consumed amount's refill time
//!    and is then capped at `now`, so a refill is never scheduled in the
//!    future.
//!
//! The clamps must run in exactly that order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vela_protocol::accrual;
use vela_protocol::assets::Address;
use vela_protocol::config::{mana_refill_seconds, MANA_MAX, MANA_PRECISION, SECONDS_PER_HOUR};
use vela_protocol::error::{Classify, ErrorKind};
use vela_protocol::time::Timestamp;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the mana ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManaError {
    /// The identity cannot afford the requested amount right now.
    #[error("mana exhausted for {identity}: available {available}, requested {requested}")]
    Exhausted {
        /// Who tried to spend.
        identity: Address,
        /// Mana available at the time of the call.
        available: u64,
        /// Mana requested.
        requested: u64,
    },
}

impl Classify for ManaError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::ResourceExhausted
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Stored mana state for one identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManaAccount {
    /// Virtual start of the refill. `None` until the first consumption.
    pub refill_origin: Option<Timestamp>,
    /// Per-identity rate override. `None` means the ledger default.
    pub rate_per_hour: Option<u64>,
}

/// Per-identity mana accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManaLedger {
    default_rate: u64,
    initial_amount: u64,
    accounts: BTreeMap<Address, ManaAccount>,
}

impl ManaLedger {
    /// Creates a ledger with a default hourly rate (precision
    /// [`MANA_PRECISION`]) and the amount a fresh identity starts with.
    pub fn new(default_rate: u64, initial_amount: u64) -> Self {
        Self {
            default_rate,
            initial_amount: initial_amount.min(MANA_MAX),
            accounts: BTreeMap::new(),
        }
    }

    /// The global default refill rate.
    pub fn default_rate(&self) -> u64 {
        self.default_rate
    }

    /// Effective rate for `identity`.
    pub fn rate_of(&self, identity: &str) -> u64 {
        self.accounts
            .get(identity)
            .and_then(|a| a.rate_per_hour)
            .unwrap_or(self.default_rate)
    }

    /// Stored account, if the identity has ever been touched.
    pub fn account(&self, identity: &str) -> Option<&ManaAccount> {
        self.accounts.get(identity)
    }

    /// Refill origin as seen at `now`, after the read-time clamp.
    fn effective_origin(&self, identity: &str, now: Timestamp) -> Timestamp {
        let rate = self.rate_of(identity);
        let stored = self.accounts.get(identity).and_then(|a| a.refill_origin);
        match stored {
            None => now.saturating_sub(mana_refill_seconds(self.initial_amount, rate)),
            Some(origin) => origin.max(now.saturating_sub(mana_refill_seconds(MANA_MAX, rate))),
        }
    }

    /// Mana `identity` can spend at `now`. Always within `[0, MANA_MAX]`.
    pub fn available(&self, identity: &str, now: Timestamp) -> u64 {
        let rate = self.rate_of(identity);
        let origin = self.effective_origin(identity, now);
        let elapsed = accrual::elapsed(origin, now) as u128;
        let denominator = MANA_PRECISION as u128 * SECONDS_PER_HOUR as u128;
        // A saturated product is far above MAX anyway, so clamping it is exact.
        let banked = accrual::mul_div(elapsed, rate as u128, denominator).unwrap_or(u128::MAX);
        accrual::clamp(banked, 0, MANA_MAX as u128) as u64
    }

    /// `true` if `identity` could spend `amount` at `now`.
    pub fn can_afford(&self, identity: &str, amount: u64, now: Timestamp) -> bool {
        self.available(identity, now) >= amount
    }

    /// Spends `amount` mana.
    ///
    /// # Errors
    ///
    /// Returns [`ManaError::Exhausted`] without touching state if the
    /// identity cannot afford it.
    pub fn consume(&mut self, identity: &str, amount: u64, now: Timestamp) -> Result<(), ManaError> {
        let available = self.available(identity, now);
        if available < amount {
            return Err(ManaError::Exhausted {
                identity: identity.to_string(),
                available,
                requested: amount,
            });
        }

        let rate = self.rate_of(identity);
        let advanced = self
            .effective_origin(identity, now)
            .saturating_add(mana_refill_seconds(amount, rate));
        let origin = advanced.min(now);

        self.accounts
            .entry(identity.to_string())
            .or_default()
            .refill_origin = Some(origin);

        tracing::debug!(identity, amount, origin, "mana consumed");
        Ok(())
    }

    /// Replaces the global default rate.
    pub fn set_default_rate(&mut self, rate: u64) {
        self.default_rate = rate;
    }

    /// Overrides the rate for one identity. `None` restores the default.
    pub fn set_rate(&mut self, identity: &str, rate: Option<u64>) {
        self.accounts
            .entry(identity.to_string())
            .or_default()
            .rate_per_hour = rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_protocol::config::DEFAULT_MANA_RATE;

    const T0: Timestamp = 1_700_000_000;

    fn ledger() -> ManaLedger {
        ManaLedger::new(DEFAULT_MANA_RATE, 100)
    }

    #[test]
    fn fresh_identity_starts_with_initial_amount() {
        let ledger = ledger();
        assert_eq!(ledger.available("alice", T0), 100);

        let partial = ManaLedger::new(DEFAULT_MANA_RATE, 40);
        assert_eq!(partial.available("alice", T0), 40);
    }

    #[test]
    fn consuming_thirty_advances_origin_by_eighteen_minutes() {
        let mut ledger = ledger();
        ledger.consume("alice", 30, T0).unwrap();

        // Fresh origin is T0 - 3600; +1080s.
        assert_eq!(
            ledger.account("alice").unwrap().refill_origin,
            Some(T0 - 3_600 + 1_080)
        );
        assert_eq!(ledger.available("alice", T0), 70);
    }

    #[test]
    fn refill_is_linear_and_capped() {
        let mut ledger = ledger();
        ledger.consume("alice", 100, T0).unwrap();
        assert_eq!(ledger.available("alice", T0), 0);

        // 100/h refills 1 mana every 36s.
        assert_eq!(ledger.available("alice", T0 + 36), 1);
        assert_eq!(ledger.available("alice", T0 + 1_800), 50);
        assert_eq!(ledger.available("alice", T0 + 3_600), 100);
        assert_eq!(ledger.available("alice", T0 + 86_400), 100);
    }

    #[test]
    fn long_idle_banks_at_most_one_bucket() {
        let mut ledger = ledger();
        ledger.consume("alice", 10, T0).unwrap();

        // A day later the read clamp pulls the origin to now - 3600, so
        // spending 60 leaves exactly 40, not "a day's worth minus 60".
        let later = T0 + 86_400;
        ledger.consume("alice", 60, later).unwrap();
        assert_eq!(ledger.available("alice", later), 40);
    }

    #[test]
    fn overspend_fails_without_state_change() {
        let mut ledger = ledger();
        ledger.consume("alice", 80, T0).unwrap();
        let before = ledger.account("alice").cloned();

        let err = ledger.consume("alice", 21, T0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(
            err,
            ManaError::Exhausted {
                identity: "alice".into(),
                available: 20,
                requested: 21,
            }
        );
        assert_eq!(ledger.account("alice").cloned(), before);
    }

    #[test]
    fn origin_never_scheduled_in_the_future() {
        // Slow rate: 1.00 mana per hour. Consuming the whole initial bank
        // would push the origin to exactly now; the clamp keeps it there.
        let mut ledger = ManaLedger::new(100, 5);
        ledger.consume("alice", 5, T0).unwrap();
        let origin = ledger.account("alice").unwrap().refill_origin.unwrap();
        assert!(origin <= T0);
        assert_eq!(ledger.available("alice", T0), 0);
    }

    #[test]
    fn available_always_within_bounds() {
        let mut ledger = ledger();
        ledger.set_rate("whale", Some(u64::MAX));
        ledger.set_rate("stuck", Some(0));
        for now in [i64::MIN / 2, -1, 0, T0, T0 + 1, i64::MAX / 2] {
            for who in ["alice", "whale", "stuck"] {
                assert!(ledger.available(who, now) <= MANA_MAX);
            }
        }
    }

    #[test]
    fn per_identity_rate_override() {
        let mut ledger = ledger();
        ledger.set_rate("bob", Some(20_000));
        assert_eq!(ledger.rate_of("bob"), 20_000);
        assert_eq!(ledger.rate_of("alice"), DEFAULT_MANA_RATE);

        ledger.consume("bob", 100, T0).unwrap();
        // 200/h: half an hour refills the whole bucket.
        assert_eq!(ledger.available("bob", T0 + 1_800), 100);

        ledger.set_rate("bob", None);
        assert_eq!(ledger.rate_of("bob"), DEFAULT_MANA_RATE);
    }

    #[test]
    fn default_rate_change_applies_to_everyone_without_override() {
        let mut ledger = ledger();
        ledger.consume("alice", 100, T0).unwrap();
        ledger.set_default_rate(5_000);
        assert_eq!(ledger.available("alice", T0 + 3_600), 50);
    }

    #[test]
    fn zero_consumption_is_free() {
        let mut ledger = ledger();
        ledger.consume("alice", 0, T0).unwrap();
        assert_eq!(ledger.available("alice", T0), 100);
    }
}
