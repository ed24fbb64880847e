//! # Vesting Ledger
//!
//! Linear-vesting redemption. Holders of the vesting asset can redeem the
//! payout asset over `number_of_periods` periods of `period_length`
//! seconds, starting at `start_date`.
//!
//! ## Snapshot semantics
//!
//! The first time a holder redeems, the ledger freezes their vesting-asset
//! balance as `initial_amount_snapshot`. Every later computation uses the
//! snapshot, so topping up the balance afterwards cannot inflate the
//! redeemable base.
//!
//! ## Vested percentage
//!
//! ```text
//! percent = clamp(floor(floor((now - start) * 10000 / period_length) / number_of_periods), 0, 10000)
//! ```
//!
//! Two sequential truncating divisions, in that order.
//!
//! ## Redemption modes
//!
//! - [`RedeemMode::Vesting`]: the holder takes whatever has vested so far.
//! - [`RedeemMode::Delegated`]: the orchestrator redeems an explicit amount
//!   on the holder's behalf (used to pay for sales), bounded only by the
//!   unredeemed remainder of the snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use vela_protocol::accrual;
use vela_protocol::assets::{Address, Amount};
use vela_protocol::config::VESTED_SCALE;
use vela_protocol::error::{Classify, ErrorKind};
use vela_protocol::time::Timestamp;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the vesting ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VestingError {
    /// Vesting has not started yet.
    #[error("vesting starts at {start_date}, now is {now}")]
    NotStarted {
        /// Configured start.
        start_date: Timestamp,
        /// Time of the call.
        now: Timestamp,
    },

    /// Nothing is redeemable right now.
    #[error("nothing to redeem for {0}")]
    NothingToRedeem(Address),

    /// A delegated redemption asked for more than the snapshot has left.
    #[error("redemption of {requested} exceeds remaining snapshot {remaining} for {holder}")]
    ExceedsSnapshot {
        /// Holder being redeemed for.
        holder: Address,
        /// Unredeemed part of the snapshot.
        remaining: Amount,
        /// Amount asked for.
        requested: Amount,
    },

    /// The schedule can no longer change because vesting has started.
    #[error("vesting schedule is locked since {0}")]
    ScheduleLocked(Timestamp),

    /// A schedule with a zero-length period or zero periods.
    #[error("invalid vesting schedule: {0}")]
    InvalidSchedule(&'static str),

    /// Arithmetic overflow in the redemption totals.
    #[error("vesting arithmetic overflow")]
    Overflow,
}

impl Classify for VestingError {
    fn kind(&self) -> ErrorKind {
        match self {
            VestingError::NotStarted { .. } | VestingError::ScheduleLocked(_) => {
                ErrorKind::WindowViolation
            }
            VestingError::NothingToRedeem(_) | VestingError::ExceedsSnapshot { .. } => {
                ErrorKind::ResourceExhausted
            }
            VestingError::InvalidSchedule(_) => ErrorKind::BoundsViolation,
            VestingError::Overflow => ErrorKind::ConsistencyViolation,
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// When and how fast the payout asset vests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VestingSchedule {
    /// First instant at which anything vests.
    pub start_date: Timestamp,
    /// Length of one period in seconds.
    pub period_length: u64,
    /// Number of periods until fully vested.
    pub number_of_periods: u64,
}

impl VestingSchedule {
    /// Rejects zero-length periods and empty schedules.
    pub fn validate(&self) -> Result<(), VestingError> {
        if self.period_length == 0 {
            return Err(VestingError::InvalidSchedule("period_length must be > 0"));
        }
        if self.number_of_periods == 0 {
            return Err(VestingError::InvalidSchedule("number_of_periods must be > 0"));
        }
        Ok(())
    }

    /// Vested share at `now`, scaled to [`VESTED_SCALE`].
    pub fn percent_vested(&self, now: Timestamp) -> u128 {
        if now < self.start_date || self.period_length == 0 || self.number_of_periods == 0 {
            return 0;
        }
        let elapsed = accrual::elapsed(self.start_date, now) as u128;
        let per_period = accrual::mul_div(elapsed, VESTED_SCALE, self.period_length as u128)
            .unwrap_or(u128::MAX);
        let percent = per_period / self.number_of_periods as u128;
        accrual::clamp(percent, 0, VESTED_SCALE)
    }

    /// `true` once `now` has reached the start date.
    pub fn has_started(&self, now: Timestamp) -> bool {
        now >= self.start_date
    }
}

/// Per-holder redemption state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VestingReceiver {
    /// Total payout delivered for this holder.
    pub amount_withdrawn: Amount,
    /// Total redeemed against the snapshot.
    pub redeemed_amount: Amount,
    /// Vesting-asset balance frozen at first redemption.
    pub initial_amount_snapshot: Amount,
    /// Whether the snapshot has been taken.
    pub is_registered: bool,
}

/// How a redemption is sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedeemMode {
    /// Take everything vested so far.
    Vesting,
    /// Redeem an explicit amount, bounded by the remaining snapshot.
    Delegated {
        /// Amount to redeem.
        amount: Amount,
    },
}

/// Record of one redemption. The orchestrator moves the payout asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    /// Unique receipt identifier.
    pub receipt_id: Uuid,
    /// Whose snapshot was redeemed against.
    pub holder: Address,
    /// Who receives the payout.
    pub beneficiary: Address,
    /// Amount redeemed.
    pub amount: Amount,
    /// Mode of the redemption.
    pub mode: RedeemMode,
    /// When it happened.
    pub at: Timestamp,
}

/// Linear-vesting redemption tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VestingLedger {
    schedule: VestingSchedule,
    receivers: BTreeMap<Address, VestingReceiver>,
    total_redeemed: Amount,
    total_withdrawn: Amount,
}

impl VestingLedger {
    /// Creates a ledger for a validated schedule.
    pub fn new(schedule: VestingSchedule) -> Result<Self, VestingError> {
        schedule.validate()?;
        Ok(Self {
            schedule,
            receivers: BTreeMap::new(),
            total_redeemed: 0,
            total_withdrawn: 0,
        })
    }

    /// Current schedule.
    pub fn schedule(&self) -> &VestingSchedule {
        &self.schedule
    }

    /// Stored receiver, if the holder has ever redeemed.
    pub fn receiver(&self, holder: &str) -> Option<&VestingReceiver> {
        self.receivers.get(holder)
    }

    /// Sum of all redemptions.
    pub fn total_redeemed(&self) -> Amount {
        self.total_redeemed
    }

    /// Sum of all payouts.
    pub fn total_withdrawn(&self) -> Amount {
        self.total_withdrawn
    }

    /// Vested share at `now`, scaled to 10_000.
    pub fn percent_vested(&self, now: Timestamp) -> u128 {
        self.schedule.percent_vested(now)
    }

    /// The base a holder's redemptions are measured against: the frozen
    /// snapshot once registered, the live balance before that.
    pub fn redeemable_base(&self, holder: &str, live_balance: Amount) -> Amount {
        match self.receivers.get(holder) {
            Some(r) if r.is_registered => r.initial_amount_snapshot,
            _ => live_balance,
        }
    }

    /// How much `holder` could redeem in vesting mode at `now`.
    pub fn currently_redeemable(
        &self,
        holder: &str,
        live_balance: Amount,
        now: Timestamp,
    ) -> Result<Amount, VestingError> {
        let base = self.redeemable_base(holder, live_balance);
        let vested = accrual::mul_div(self.percent_vested(now), base, VESTED_SCALE)
            .map_err(|_| VestingError::Overflow)?;
        let redeemed = self
            .receivers
            .get(holder)
            .map(|r| r.redeemed_amount)
            .unwrap_or(0);
        Ok(vested.saturating_sub(redeemed))
    }

    /// Redeems against `holder`'s snapshot, registering it on first use.
    ///
    /// `live_balance` is the holder's vesting-asset balance observed by the
    /// caller at this instant; it only matters on first registration.
    ///
    /// # Errors
    ///
    /// - [`VestingError::NotStarted`] for vesting mode before the start date.
    /// - [`VestingError::NothingToRedeem`] if vesting mode finds nothing.
    /// - [`VestingError::ExceedsSnapshot`] if a delegated amount is too big.
    pub fn redeem(
        &mut self,
        holder: &str,
        beneficiary: &str,
        mode: RedeemMode,
        live_balance: Amount,
        now: Timestamp,
    ) -> Result<Withdrawal, VestingError> {
        if matches!(mode, RedeemMode::Vesting) && !self.schedule.has_started(now) {
            return Err(VestingError::NotStarted {
                start_date: self.schedule.start_date,
                now,
            });
        }

        let snapshot = self.redeemable_base(holder, live_balance);
        let redeemed = self
            .receivers
            .get(holder)
            .map(|r| r.redeemed_amount)
            .unwrap_or(0);

        let amount = match mode {
            RedeemMode::Vesting => {
                let amount = self.currently_redeemable(holder, snapshot, now)?;
                if amount == 0 {
                    return Err(VestingError::NothingToRedeem(holder.to_string()));
                }
                amount
            }
            RedeemMode::Delegated { amount } => {
                let remaining = snapshot.saturating_sub(redeemed);
                if amount > remaining {
                    return Err(VestingError::ExceedsSnapshot {
                        holder: holder.to_string(),
                        remaining,
                        requested: amount,
                    });
                }
                amount
            }
        };

        let receiver = self.receivers.entry(holder.to_string()).or_default();
        if !receiver.is_registered {
            receiver.initial_amount_snapshot = snapshot;
            receiver.is_registered = true;
            tracing::debug!(holder, snapshot = %snapshot, "vesting receiver registered");
        }
        receiver.amount_withdrawn = receiver
            .amount_withdrawn
            .checked_add(amount)
            .ok_or(VestingError::Overflow)?;
        receiver.redeemed_amount = receiver
            .redeemed_amount
            .checked_add(amount)
            .ok_or(VestingError::Overflow)?;
        self.total_redeemed = self
            .total_redeemed
            .checked_add(amount)
            .ok_or(VestingError::Overflow)?;
        self.total_withdrawn = self
            .total_withdrawn
            .checked_add(amount)
            .ok_or(VestingError::Overflow)?;

        Ok(Withdrawal {
            receipt_id: Uuid::new_v4(),
            holder: holder.to_string(),
            beneficiary: beneficiary.to_string(),
            amount,
            mode,
            at: now,
        })
    }

    /// Replaces the schedule. Only allowed before vesting starts.
    pub fn set_schedule(&mut self, schedule: VestingSchedule, now: Timestamp) -> Result<(), VestingError> {
        if self.schedule.has_started(now) {
            return Err(VestingError::ScheduleLocked(self.schedule.start_date));
        }
        schedule.validate()?;
        self.schedule = schedule;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: Timestamp = 1_700_000_000;
    const MONTH: u64 = 2_592_000;

    fn ledger() -> VestingLedger {
        VestingLedger::new(VestingSchedule {
            start_date: START,
            period_length: MONTH,
            number_of_periods: 12,
        })
        .unwrap()
    }

    #[test]
    fn percent_is_zero_before_start() {
        let ledger = ledger();
        assert_eq!(ledger.percent_vested(START - 1), 0);
        assert_eq!(ledger.percent_vested(START), 0);
    }

    #[test]
    fn percent_after_one_month_of_twelve() {
        let ledger = ledger();
        assert_eq!(ledger.percent_vested(START + MONTH as i64), 833);
    }

    #[test]
    fn percent_reaches_full_at_end() {
        let ledger = ledger();
        let end = START + (MONTH * 12) as i64;
        assert_eq!(ledger.percent_vested(end), 10_000);
        assert_eq!(ledger.percent_vested(end + 1_000_000), 10_000);
        assert!(ledger.percent_vested(end - 1) < 10_000);
    }

    #[test]
    fn percent_is_monotonic() {
        let ledger = ledger();
        let mut last = 0;
        let mut now = START - MONTH as i64;
        while now < START + (MONTH * 13) as i64 {
            let p = ledger.percent_vested(now);
            assert!(p >= last);
            last = p;
            now += 86_399;
        }
    }

    #[test]
    fn redeem_before_start_is_window_violation() {
        let mut ledger = ledger();
        let err = ledger
            .redeem("alice", "alice", RedeemMode::Vesting, 1_000, START - 1)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WindowViolation);
        assert!(ledger.receiver("alice").is_none());
    }

    #[test]
    fn vesting_redeem_takes_vested_share() {
        let mut ledger = ledger();
        let w = ledger
            .redeem("alice", "alice", RedeemMode::Vesting, 12_000, START + MONTH as i64)
            .unwrap();
        // 833/10000 of 12000 = 999.6 -> 999
        assert_eq!(w.amount, 999);
        let r = ledger.receiver("alice").unwrap();
        assert_eq!(r.initial_amount_snapshot, 12_000);
        assert_eq!(r.redeemed_amount, 999);
        assert_eq!(r.amount_withdrawn, 999);
        assert_eq!(ledger.total_redeemed(), 999);
    }

    #[test]
    fn immediate_second_redeem_has_nothing() {
        let mut ledger = ledger();
        let now = START + MONTH as i64;
        ledger
            .redeem("alice", "alice", RedeemMode::Vesting, 12_000, now)
            .unwrap();
        let err = ledger
            .redeem("alice", "alice", RedeemMode::Vesting, 12_000, now)
            .unwrap_err();
        assert_eq!(err, VestingError::NothingToRedeem("alice".into()));
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    }

    #[test]
    fn snapshot_ignores_later_balance_changes() {
        let mut ledger = ledger();
        ledger
            .redeem("alice", "alice", RedeemMode::Vesting, 12_000, START + MONTH as i64)
            .unwrap();

        // Balance ballooned afterwards; snapshot still rules.
        let end = START + (MONTH * 12) as i64;
        assert_eq!(
            ledger.currently_redeemable("alice", 1_000_000, end).unwrap(),
            12_000 - 999
        );
        let w = ledger
            .redeem("alice", "alice", RedeemMode::Vesting, 1_000_000, end)
            .unwrap();
        assert_eq!(w.amount, 12_000 - 999);
        assert_eq!(ledger.receiver("alice").unwrap().redeemed_amount, 12_000);
    }

    #[test]
    fn unregistered_holder_uses_live_balance() {
        let ledger = ledger();
        let end = START + (MONTH * 12) as i64;
        assert_eq!(ledger.currently_redeemable("bob", 500, end).unwrap(), 500);
        assert_eq!(ledger.currently_redeemable("bob", 0, end).unwrap(), 0);
    }

    #[test]
    fn oversized_base_overflows_instead_of_reading_zero() {
        let mut ledger = ledger();
        let at = START + MONTH as i64;
        assert_eq!(
            ledger.currently_redeemable("whale", u128::MAX, at),
            Err(VestingError::Overflow)
        );

        let err = ledger
            .redeem("whale", "whale", RedeemMode::Vesting, u128::MAX, at)
            .unwrap_err();
        assert_eq!(err, VestingError::Overflow);
        assert_eq!(err.kind(), ErrorKind::ConsistencyViolation);
        assert!(ledger.receiver("whale").is_none());
    }

    #[test]
    fn delegated_redeem_bounded_by_snapshot() {
        let mut ledger = ledger();
        // Delegated redemption does not wait for the start date.
        let now = START - 10;
        ledger
            .redeem("alice", "custody", RedeemMode::Delegated { amount: 700 }, 1_000, now)
            .unwrap();
        let err = ledger
            .redeem("alice", "custody", RedeemMode::Delegated { amount: 301 }, 1_000, now)
            .unwrap_err();
        assert_eq!(
            err,
            VestingError::ExceedsSnapshot {
                holder: "alice".into(),
                remaining: 300,
                requested: 301,
            }
        );
        ledger
            .redeem("alice", "custody", RedeemMode::Delegated { amount: 300 }, 5_000, now)
            .unwrap();
        assert_eq!(ledger.receiver("alice").unwrap().redeemed_amount, 1_000);
    }

    #[test]
    fn cumulative_redemptions_never_exceed_snapshot() {
        let mut ledger = ledger();
        let mut now = START;
        ledger
            .redeem("alice", "custody", RedeemMode::Delegated { amount: 100 }, 10_000, now)
            .unwrap();
        for _ in 0..14 {
            now += MONTH as i64;
            let _ = ledger.redeem("alice", "alice", RedeemMode::Vesting, 10_000, now);
            let r = ledger.receiver("alice").unwrap();
            assert!(r.redeemed_amount <= r.initial_amount_snapshot);
        }
        assert_eq!(ledger.receiver("alice").unwrap().redeemed_amount, 10_000);
    }

    #[test]
    fn schedule_mutable_only_before_start() {
        let mut ledger = ledger();
        let new = VestingSchedule {
            start_date: START + 100,
            period_length: MONTH,
            number_of_periods: 6,
        };
        ledger.set_schedule(new, START - 1).unwrap();
        assert_eq!(ledger.schedule().number_of_periods, 6);

        let err = ledger.set_schedule(new, START + 100).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WindowViolation);
    }

    #[test]
    fn zero_period_schedule_rejected() {
        let err = VestingLedger::new(VestingSchedule {
            start_date: START,
            period_length: 0,
            number_of_periods: 12,
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BoundsViolation);
    }
}
