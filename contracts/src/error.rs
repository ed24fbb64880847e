//! Top-level error returned by every orchestrator operation.

use thiserror::Error;
use vela_protocol::accrual::AccrualError;
use vela_protocol::assets::{Address, Amount, AssetError};
use vela_protocol::error::{Classify, ErrorKind};
use vela_protocol::positions::{PositionError, PositionId};
use vela_protocol::roles::Role;

use crate::mana::ManaError;
use crate::product::{ProductError, ProductTypeId};
use crate::sale::SaleError;
use crate::vesting::VestingError;

/// Why an operation aborted. Nothing it did is observable afterwards.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Mana ledger failure.
    #[error(transparent)]
    Mana(#[from] ManaError),

    /// Vesting ledger failure.
    #[error(transparent)]
    Vesting(#[from] VestingError),

    /// Product ledger failure.
    #[error(transparent)]
    Product(#[from] ProductError),

    /// Sale admission or bookkeeping failure.
    #[error(transparent)]
    Sale(#[from] SaleError),

    /// A payment the caller was responsible for failed.
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// Ownership registry failure.
    #[error(transparent)]
    Position(#[from] PositionError),

    /// Accrual arithmetic failure.
    #[error(transparent)]
    Accrual(#[from] AccrualError),

    /// Caller lacks the role the operation requires.
    #[error("{identity} lacks role {role}")]
    Unauthorized {
        /// Caller.
        identity: Address,
        /// Required role.
        role: Role,
    },

    /// Caller does not own the position.
    #[error("position {id} is not owned by {caller}")]
    NotOwner {
        /// Position.
        id: PositionId,
        /// Caller.
        caller: Address,
    },

    /// The product type is not on the allow-list.
    #[error("product type {0} is not allow-listed")]
    NotAllowListed(ProductTypeId),

    /// A sale targets a product type with no configured return.
    #[error("unknown product type {0}")]
    UnknownProductType(ProductTypeId),

    /// A collaborator call the ledger itself depends on failed.
    #[error("{context}: {source}")]
    Collaborator {
        /// What the ledger was doing.
        context: &'static str,
        /// Underlying failure.
        #[source]
        source: AssetError,
    },

    /// A mint produced a different quantity than requested.
    #[error("minted {minted} but expected {expected}")]
    MintMismatch {
        /// Requested quantity.
        expected: Amount,
        /// Quantity actually received.
        minted: Amount,
    },

    /// Rejected configuration or parameter.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Arithmetic overflow while composing an operation.
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    /// A guarded operation was entered while another was still running.
    #[error("reentrant call rejected")]
    Reentrancy,
}

impl Classify for LedgerError {
    fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Mana(e) => e.kind(),
            LedgerError::Vesting(e) => e.kind(),
            LedgerError::Product(e) => e.kind(),
            LedgerError::Sale(e) => e.kind(),
            LedgerError::Asset(e) => e.kind(),
            LedgerError::Position(e) => e.kind(),
            LedgerError::Accrual(e) => e.kind(),
            LedgerError::Unauthorized { .. }
            | LedgerError::NotOwner { .. }
            | LedgerError::NotAllowListed(_) => ErrorKind::AdmissionDenied,
            LedgerError::UnknownProductType(_)
            | LedgerError::Collaborator { .. }
            | LedgerError::MintMismatch { .. }
            | LedgerError::Overflow(_) => ErrorKind::ConsistencyViolation,
            LedgerError::InvalidConfig(_) => ErrorKind::BoundsViolation,
            LedgerError::Reentrancy => ErrorKind::Reentrancy,
        }
    }
}

impl LedgerError {
    /// Wraps a collaborator failure as a consistency violation.
    pub(crate) fn collaborator(context: &'static str) -> impl FnOnce(AssetError) -> Self {
        move |source| LedgerError::Collaborator { context, source }
    }
}
