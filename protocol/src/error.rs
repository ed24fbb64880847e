//! Failure taxonomy shared by every ledger.
//!
//! Each module keeps its own error enum with the details that matter to
//! it, and maps onto one [`ErrorKind`] so callers can reason about
//! failures without matching on every variant.

use serde::{Deserialize, Serialize};

/// Coarse classification of a failed operation. Every kind is fatal to
/// the enclosing operation and nothing is retried internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Role, ownership or allow-list check failed.
    AdmissionDenied,
    /// Not enough mana, balance or supply.
    ResourceExhausted,
    /// Attempted outside the operation's valid time window.
    WindowViolation,
    /// A collaborator returned something unexpected, or arithmetic overflowed.
    ConsistencyViolation,
    /// Malformed time range.
    InvalidRange,
    /// Level or parameter outside its allowed bounds.
    BoundsViolation,
    /// A guarded operation was entered while another was in flight.
    Reentrancy,
}

impl ErrorKind {
    /// Stable lowercase label, used for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AdmissionDenied => "admission_denied",
            ErrorKind::ResourceExhausted => "resource_exhausted",
            ErrorKind::WindowViolation => "window_violation",
            ErrorKind::ConsistencyViolation => "consistency_violation",
            ErrorKind::InvalidRange => "invalid_range",
            ErrorKind::BoundsViolation => "bounds_violation",
            ErrorKind::Reentrancy => "reentrancy",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by every error enum in the workspace.
pub trait Classify {
    /// Which bucket of the taxonomy this error falls into.
    fn kind(&self) -> ErrorKind;
}
