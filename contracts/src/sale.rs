//! # Sale Engine
//!
//! Time-boxed, supply-bounded primary issuance. A manager publishes a
//! [`SaleDescriptor`] under a sale id; buyers purchase units while the sale
//! is activated, inside `[start_at, start_at + duration)`, and while supply
//! lasts.
//!
//! The engine here owns descriptors and admission. Payment, the fee split
//! and minting are sequenced by the orchestrator so that the whole
//! purchase commits or aborts as one unit.
//!
//! ## Enumeration order
//!
//! Sale ids are kept in an index vector. Removal is a swap-delete: the last
//! id moves into the removed slot. Iteration order is therefore *not*
//! insertion order once anything has been removed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vela_protocol::assets::{Amount, AssetId};
use vela_protocol::config::BPS_DENOMINATOR;
use vela_protocol::error::{Classify, ErrorKind};
use vela_protocol::time::Timestamp;

use crate::product::ProductTypeId;

/// Manager-chosen identifier of a sale.
pub type SaleId = u64;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Admission and bookkeeping failures of the sale engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaleError {
    /// No sale under this id. Classified like unknown positions and
    /// products.
    #[error("sale {0} not found")]
    NotFound(SaleId),

    /// The sale exists but is switched off.
    #[error("sale {0} is not activated")]
    NotActivated(SaleId),

    /// `now` is outside `[start_at, start_at + duration)`.
    #[error("sale {id} is open [{start_at}, {end_at}), now is {now}")]
    OutsideWindow {
        /// Sale id.
        id: SaleId,
        /// Window start.
        start_at: Timestamp,
        /// Window end (exclusive).
        end_at: Timestamp,
        /// Time of the call.
        now: Timestamp,
    },

    /// Nothing left to sell.
    #[error("sale {0} is sold out")]
    SoldOut(SaleId),

    /// More requested than is left.
    #[error("sale {id}: requested {requested}, only {available} available")]
    ExceedsSupply {
        /// Sale id.
        id: SaleId,
        /// Units left.
        available: u64,
        /// Units requested.
        requested: u64,
    },

    /// More requested than one purchase may take.
    #[error("sale {id}: requested {requested}, at most {max_per_call} per purchase")]
    ExceedsPerCall {
        /// Sale id.
        id: SaleId,
        /// Per-purchase cap.
        max_per_call: u64,
        /// Units requested.
        requested: u64,
    },

    /// The buyer cannot afford the mana cost.
    #[error("sale {id}: mana cost {cost} exceeds available {available}")]
    ManaShort {
        /// Sale id.
        id: SaleId,
        /// Mana the purchase costs.
        cost: u64,
        /// Mana the buyer has.
        available: u64,
    },

    /// Price or mana cost overflowed.
    #[error("sale {0}: arithmetic overflow")]
    Overflow(SaleId),
}

impl Classify for SaleError {
    fn kind(&self) -> ErrorKind {
        match self {
            SaleError::NotActivated(_) => ErrorKind::AdmissionDenied,
            SaleError::OutsideWindow { .. } => ErrorKind::WindowViolation,
            SaleError::SoldOut(_)
            | SaleError::ExceedsSupply { .. }
            | SaleError::ExceedsPerCall { .. }
            | SaleError::ManaShort { .. } => ErrorKind::ResourceExhausted,
            SaleError::NotFound(_) | SaleError::Overflow(_) => ErrorKind::ConsistencyViolation,
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What a sale issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SaleTarget {
    /// One new yield position per unit.
    Product {
        /// Type of the issued positions.
        product_type: ProductTypeId,
    },
    /// Units of a fungible asset.
    Asset {
        /// Asset minted to the buyer.
        asset: AssetId,
    },
}

/// A published sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleDescriptor {
    /// What the sale mints.
    pub target: SaleTarget,
    /// Price per unit in the payment asset.
    pub price: Amount,
    /// Units still for sale.
    pub available_supply: u64,
    /// Units offered when the sale was published.
    pub initial_supply: u64,
    /// Mana charged per unit bought.
    pub mana_cost_per_unit: u64,
    /// Window start.
    pub start_at: Timestamp,
    /// Window length in seconds.
    pub duration: u64,
    /// Cap on units per purchase.
    pub max_per_call: u64,
    /// Master switch.
    pub activated: bool,
    /// Carried across replacements; purchases do not touch it.
    #[serde(default)]
    pub sold: u64,
}

impl SaleDescriptor {
    /// Exclusive end of the sale window.
    pub fn end_at(&self) -> Timestamp {
        self.start_at
            .saturating_add(i64::try_from(self.duration).unwrap_or(i64::MAX))
    }

    /// `true` if `now` lies inside `[start_at, end_at)`.
    pub fn is_open(&self, now: Timestamp) -> bool {
        now >= self.start_at && now < self.end_at()
    }
}

/// Result of a successful admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    /// `price * amount`.
    pub total_price: Amount,
    /// `mana_cost_per_unit * amount`.
    pub mana_cost: u64,
}

/// How a payment is divided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    /// Paid to the DAO payee.
    pub dao: Amount,
    /// Paid to the operations payee.
    pub operation: Amount,
    /// Destroyed.
    pub burned: Amount,
}

/// Splits `paid` by two basis-point rates. The burned remainder absorbs
/// all rounding, so the three parts always sum to `paid` exactly.
pub fn fee_split(paid: Amount, dao_bps: u128, operation_bps: u128) -> Option<FeeSplit> {
    let dao = paid.checked_mul(dao_bps)? / BPS_DENOMINATOR;
    let operation = paid.checked_mul(operation_bps)? / BPS_DENOMINATOR;
    let burned = paid.checked_sub(dao)?.checked_sub(operation)?;
    Some(FeeSplit {
        dao,
        operation,
        burned,
    })
}

// ---------------------------------------------------------------------------
// Book
// ---------------------------------------------------------------------------

/// All published sales plus their enumeration index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaleBook {
    sales: BTreeMap<SaleId, SaleDescriptor>,
    index: Vec<SaleId>,
}

impl SaleBook {
    /// Creates an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a sale.
    pub fn get(&self, id: SaleId) -> Option<&SaleDescriptor> {
        self.sales.get(&id)
    }

    /// Sale ids in index order. Unstable across removals.
    pub fn ids(&self) -> &[SaleId] {
        &self.index
    }

    /// Publishes or wholesale-replaces a sale. The previous `sold` counter
    /// survives the replacement; everything else is overwritten.
    pub fn put(&mut self, id: SaleId, mut descriptor: SaleDescriptor) {
        match self.sales.get(&id) {
            Some(existing) => descriptor.sold = existing.sold,
            None => self.index.push(id),
        }
        self.sales.insert(id, descriptor);
    }

    /// Removes a sale, swap-deleting it from the index.
    pub fn remove(&mut self, id: SaleId) -> Result<SaleDescriptor, SaleError> {
        let removed = self.sales.remove(&id).ok_or(SaleError::NotFound(id))?;
        if let Some(pos) = self.index.iter().position(|s| *s == id) {
            self.index.swap_remove(pos);
        }
        Ok(removed)
    }

    /// Flips the master switch without touching anything else.
    pub fn set_activation(&mut self, id: SaleId, activated: bool) -> Result<(), SaleError> {
        let sale = self.sales.get_mut(&id).ok_or(SaleError::NotFound(id))?;
        sale.activated = activated;
        Ok(())
    }

    /// Runs every admission check, in order, for buying `amount` units
    /// with `mana_available` mana at `now`.
    pub fn admit(
        &self,
        id: SaleId,
        amount: u64,
        mana_available: u64,
        now: Timestamp,
    ) -> Result<Admission, SaleError> {
        let sale = self.sales.get(&id).ok_or(SaleError::NotFound(id))?;

        if !sale.activated {
            return Err(SaleError::NotActivated(id));
        }
        if !sale.is_open(now) {
            return Err(SaleError::OutsideWindow {
                id,
                start_at: sale.start_at,
                end_at: sale.end_at(),
                now,
            });
        }
        if sale.available_supply == 0 {
            return Err(SaleError::SoldOut(id));
        }
        if amount > sale.available_supply {
            return Err(SaleError::ExceedsSupply {
                id,
                available: sale.available_supply,
                requested: amount,
            });
        }
        if amount > sale.max_per_call {
            return Err(SaleError::ExceedsPerCall {
                id,
                max_per_call: sale.max_per_call,
                requested: amount,
            });
        }
        let mana_cost = sale
            .mana_cost_per_unit
            .checked_mul(amount)
            .ok_or(SaleError::Overflow(id))?;
        if mana_cost > mana_available {
            return Err(SaleError::ManaShort {
                id,
                cost: mana_cost,
                available: mana_available,
            });
        }
        let total_price = sale
            .price
            .checked_mul(amount as u128)
            .ok_or(SaleError::Overflow(id))?;

        Ok(Admission {
            total_price,
            mana_cost,
        })
    }

    /// Deducts `minted` units from the sale's remaining supply.
    pub fn record_purchase(&mut self, id: SaleId, minted: u64) -> Result<u64, SaleError> {
        let sale = self.sales.get_mut(&id).ok_or(SaleError::NotFound(id))?;
        sale.available_supply = sale
            .available_supply
            .checked_sub(minted)
            .ok_or(SaleError::ExceedsSupply {
                id,
                available: sale.available_supply,
                requested: minted,
            })?;
        Ok(sale.available_supply)
    }
}
