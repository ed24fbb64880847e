//! # Lazy Accrual
//!
//! Mana, yield and vesting all follow the same pattern: store a timestamp,
//! and when someone asks, derive the current value from
//! `(stored timestamp, now)`. There is no scheduler. "Time passing" never
//! changes state by itself; the next call simply sees a bigger span.
//!
//! The helpers here are the integer building blocks for those formulas.
//! Every division truncates, and callers are expected to apply them in
//! exactly the order their formula states. `a / b * c` and `a * c / b`
//! are not interchangeable here.

use thiserror::Error;

use crate::error::{Classify, ErrorKind};
use crate::time::Timestamp;

/// Errors from accrual arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccrualError {
    /// `to` lies before `from`.
    #[error("invalid range: to ({to}) is before from ({from})")]
    InvalidRange {
        /// Start of the requested range.
        from: Timestamp,
        /// End of the requested range.
        to: Timestamp,
    },

    /// An intermediate product did not fit in `u128`.
    #[error("arithmetic overflow in accrual")]
    Overflow,

    /// Division by a zero-length period or rate.
    #[error("division by zero in accrual")]
    DivisionByZero,
}

impl Classify for AccrualError {
    fn kind(&self) -> ErrorKind {
        match self {
            AccrualError::InvalidRange { .. } => ErrorKind::InvalidRange,
            AccrualError::Overflow | AccrualError::DivisionByZero => {
                ErrorKind::ConsistencyViolation
            }
        }
    }
}

/// Length of `[from, to]` in seconds.
///
/// # Errors
///
/// Returns [`AccrualError::InvalidRange`] if `to < from`.
pub fn span(from: Timestamp, to: Timestamp) -> Result<u64, AccrualError> {
    if to < from {
        return Err(AccrualError::InvalidRange { from, to });
    }
    Ok((to as i128 - from as i128) as u64)
}

/// Seconds elapsed since `origin`, or 0 if `origin` is still in the future.
pub fn elapsed(origin: Timestamp, now: Timestamp) -> u64 {
    span(origin, now).unwrap_or(0)
}

/// Number of whole `step`s in `span`. A zero step yields zero steps.
pub fn steps(span: u64, step: u64) -> u64 {
    if step == 0 {
        return 0;
    }
    span / step
}

/// `floor(value * numerator / denominator)` without intermediate overflow
/// up to `u128`.
pub fn mul_div(value: u128, numerator: u128, denominator: u128) -> Result<u128, AccrualError> {
    if denominator == 0 {
        return Err(AccrualError::DivisionByZero);
    }
    value
        .checked_mul(numerator)
        .map(|p| p / denominator)
        .ok_or(AccrualError::Overflow)
}

/// Clamps `value` into `[lo, hi]`.
pub fn clamp(value: u128, lo: u128, hi: u128) -> u128 {
    value.max(lo).min(hi)
}

/// Integer square root, rounded down.
pub fn isqrt(value: u128) -> u128 {
    if value < 2 {
        return value;
    }
    // Newton's method from an upper bound; converges monotonically down.
    let mut x = value;
    let mut y = (x >> 1) + (x & 1);
    while y < x {
        x = y;
        y = (x + value / x) / 2;
    }
    x
}
