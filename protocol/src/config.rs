//! # Ledger Constants
//!
//! Every magic number in Vela lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong.
//!
//! Most of these values are baked into the accounting formulas. Changing
//! one after positions exist silently reprices every outstanding position,
//! so treat them as part of the ledger's ABI.

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Seconds in one hour. Mana refill rates are quoted per hour.
pub const SECONDS_PER_HOUR: i64 = 3_600;

/// Seconds in one day. Product yields are quoted per day.
pub const SECONDS_PER_DAY: u128 = 86_400;

/// Granularity of yield accrual. Value accrues in whole 60-second steps;
/// a claim 59 seconds after the previous one earns nothing.
pub const CLAIM_RESOLUTION_SECONDS: u64 = 60;

// ---------------------------------------------------------------------------
// Mana
// ---------------------------------------------------------------------------

/// Bucket size. Available mana is always in `[0, MANA_MAX]`.
pub const MANA_MAX: u64 = 100;

/// Fixed-point precision of mana refill rates. A rate of `10_000` means
/// 100.00 mana per hour.
pub const MANA_PRECISION: u64 = 100;

/// Default refill rate for identities without an override (100.00/h).
pub const DEFAULT_MANA_RATE: u64 = 10_000;

/// Mana banked by an identity the first time the ledger sees it.
pub const DEFAULT_INITIAL_MANA: u64 = 100;

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

/// Precision of the global yield factor. `100` is a 1.0x multiplier.
pub const FACTOR_PRECISION: u128 = 100;

/// Lowest level a product can hold. Products are created at this level.
pub const MIN_LEVEL: u32 = 1;

/// Highest level a product can reach.
pub const MAX_LEVEL: u32 = 100;

// ---------------------------------------------------------------------------
// Fees & Vesting
// ---------------------------------------------------------------------------

/// Basis-point denominator. 10_000 bps = 100%.
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Scale of the vested percentage. `10_000` means fully vested.
pub const VESTED_SCALE: u128 = 10_000;

// ---------------------------------------------------------------------------
// Custody
// ---------------------------------------------------------------------------

/// Address holding sale proceeds between payment and the fee split.
pub const CUSTODY_ADDRESS: &str = "vela:custody";

/// Address holding the payout asset distributed by the vesting ledger.
pub const VESTING_CUSTODY_ADDRESS: &str = "vela:vesting";

/// Seconds of refill needed to bank `amount` mana at `rate`.
///
/// `amount * MANA_PRECISION * SECONDS_PER_HOUR / rate`, truncated. A zero
/// rate never refills, so the duration is reported as `i64::MAX`.
pub fn mana_refill_seconds(amount: u64, rate: u64) -> i64 {
    if rate == 0 {
        return i64::MAX;
    }
    let numerator = amount as i128 * MANA_PRECISION as i128 * SECONDS_PER_HOUR as i128;
    let secs = numerator / rate as i128;
    i64::try_from(secs).unwrap_or(i64::MAX)
}
