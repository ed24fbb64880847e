//! # Yield Product Ledger
//!
//! A product is a yield-bearing position. It accrues value from the moment
//! it was last claimed, can be leveled up to multiply its return, and can
//! carry three permanent boosters.
//!
//! ## Valuation
//!
//! ```text
//! daily      = base_daily_return * factor * level / 100      (x2 with reward booster)
//! per_step   = floor(daily / 86400) * 60
//! value      = floor((to - from) / 60) * per_step
//! ```
//!
//! The per-second rate is truncated *before* it is scaled back up to the
//! 60-second resolution. A daily return below 86_400 therefore accrues
//! nothing at all, no matter how long the position sits. That is the
//! ledger's actual pricing rule; do not reorder the arithmetic.
//!
//! ## Boosters
//!
//! Boosters are one-way. [`Boosters::apply`] can only switch flags on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vela_protocol::accrual::{self, AccrualError};
use vela_protocol::assets::Amount;
use vela_protocol::config::{
    CLAIM_RESOLUTION_SECONDS, FACTOR_PRECISION, MAX_LEVEL, MIN_LEVEL, SECONDS_PER_DAY,
};
use vela_protocol::error::{Classify, ErrorKind};
use vela_protocol::positions::PositionId;
use vela_protocol::time::Timestamp;

/// Identifier of a product type, e.g. `"orchard"`.
pub type ProductTypeId = String;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the product ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    /// No product with this id exists.
    #[error("product {0} not found")]
    NotFound(PositionId),

    /// A product with this id already exists.
    #[error("product {0} already exists")]
    AlreadyExists(PositionId),

    /// The level change would leave `[MIN_LEVEL, MAX_LEVEL]`.
    #[error("level {requested} out of bounds for product {id} (allowed 1..=100)")]
    LevelOutOfBounds {
        /// Product being changed.
        id: PositionId,
        /// Level that was rejected.
        requested: u32,
    },

    /// Nothing has accrued since the last claim.
    #[error("nothing to claim on product {0}")]
    NothingToClaim(PositionId),

    /// Bad time range or overflow in valuation.
    #[error(transparent)]
    Accrual(#[from] AccrualError),

    /// Claimed total would overflow.
    #[error("claim total overflow on product {0}")]
    Overflow(PositionId),
}

impl Classify for ProductError {
    fn kind(&self) -> ErrorKind {
        match self {
            ProductError::NotFound(_) | ProductError::AlreadyExists(_) => {
                ErrorKind::ConsistencyViolation
            }
            ProductError::LevelOutOfBounds { .. } => ErrorKind::BoundsViolation,
            ProductError::NothingToClaim(_) => ErrorKind::ResourceExhausted,
            ProductError::Accrual(e) => e.kind(),
            ProductError::Overflow(_) => ErrorKind::ConsistencyViolation,
        }
    }
}

// ---------------------------------------------------------------------------
// Boosters
// ---------------------------------------------------------------------------

/// Which boosters to switch on. `false` means "leave as is", never "turn off".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoostSet {
    /// Halves level-up cost.
    #[serde(default)]
    pub level_up: bool,
    /// Waives the claim fee.
    #[serde(default)]
    pub claim: bool,
    /// Doubles the daily return.
    #[serde(default)]
    pub reward: bool,
}

/// Permanent upgrades attached to a product.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boosters {
    level_up: bool,
    claim: bool,
    reward: bool,
}

impl Boosters {
    /// Switches on every flag set in `set`. Already-set flags stay set.
    pub fn apply(&mut self, set: BoostSet) {
        self.level_up |= set.level_up;
        self.claim |= set.claim;
        self.reward |= set.reward;
    }

    /// Level-up cost is halved.
    pub fn level_up(&self) -> bool {
        self.level_up
    }

    /// Claims are free.
    pub fn claim(&self) -> bool {
        self.claim
    }

    /// Daily return is doubled.
    pub fn reward(&self) -> bool {
        self.reward
    }
}

// ---------------------------------------------------------------------------
// Product
// ---------------------------------------------------------------------------

/// Economic state of one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Position id, shared with the ownership registry.
    pub id: PositionId,
    /// Type the product was issued as.
    pub product_type: ProductTypeId,
    /// Issuance time.
    pub minted_at: Timestamp,
    /// Accrual origin; starts at `minted_at`.
    pub last_claimed_at: Timestamp,
    /// Lifetime claimed value. Only ever grows.
    pub total_claimed: Amount,
    /// Return per day at level 1 and factor 1.0.
    pub base_daily_return: Amount,
    /// Current level in `[MIN_LEVEL, MAX_LEVEL]`.
    pub level: u32,
    /// Permanent upgrades.
    pub boosters: Boosters,
}

impl Product {
    /// Daily return under the global `factor` (precision 100).
    pub fn daily_return(&self, factor: u128) -> Result<Amount, AccrualError> {
        let scaled = self
            .base_daily_return
            .checked_mul(factor)
            .and_then(|v| v.checked_mul(self.level as u128))
            .ok_or(AccrualError::Overflow)?
            / FACTOR_PRECISION;
        if self.boosters.reward() {
            scaled.checked_mul(2).ok_or(AccrualError::Overflow)
        } else {
            Ok(scaled)
        }
    }

    /// Value accrued between `from` and `to` at the default resolution.
    pub fn value_at(&self, factor: u128, from: Timestamp, to: Timestamp) -> Result<Amount, AccrualError> {
        value_at(self.daily_return(factor)?, from, to, CLAIM_RESOLUTION_SECONDS)
    }

    /// Value claimable at `now`.
    pub fn pending(&self, factor: u128, now: Timestamp) -> Result<Amount, AccrualError> {
        self.value_at(factor, self.last_claimed_at, now)
    }

    /// Quoted claim fee for the current level.
    pub fn claim_fee(&self) -> Amount {
        claim_fee(self.level)
    }

    /// Quoted level-up cost: the current level, halved with the booster.
    pub fn level_up_cost(&self) -> Amount {
        if self.boosters.level_up() {
            (self.level / 2) as Amount
        } else {
            self.level as Amount
        }
    }
}

/// Value accrued over `[from, to]` for a given daily return.
///
/// # Errors
///
/// Returns [`AccrualError::InvalidRange`] if `to < from`.
pub fn value_at(
    daily_return: Amount,
    from: Timestamp,
    to: Timestamp,
    resolution_secs: u64,
) -> Result<Amount, AccrualError> {
    let span = accrual::span(from, to)?;
    let reward_per_resolution = (daily_return / SECONDS_PER_DAY)
        .checked_mul(resolution_secs as u128)
        .ok_or(AccrualError::Overflow)?;
    let elapsed_resolutions = accrual::steps(span, resolution_secs) as u128;
    elapsed_resolutions
        .checked_mul(reward_per_resolution)
        .ok_or(AccrualError::Overflow)
}

/// Claim fee for a level: `floor(isqrt(level * 100) / 10)`.
pub fn claim_fee(level: u32) -> Amount {
    accrual::isqrt(level as u128 * 100) / 10
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// All live products keyed by position id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductLedger {
    products: BTreeMap<PositionId, Product>,
}

impl ProductLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a product.
    pub fn get(&self, id: PositionId) -> Option<&Product> {
        self.products.get(&id)
    }

    fn get_mut(&mut self, id: PositionId) -> Result<&mut Product, ProductError> {
        self.products.get_mut(&id).ok_or(ProductError::NotFound(id))
    }

    /// Number of live products.
    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// `true` if no products exist.
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Issues a product at level 1 with its accrual origin at `now`.
    pub fn create(
        &mut self,
        id: PositionId,
        product_type: &str,
        base_daily_return: Amount,
        now: Timestamp,
    ) -> Result<&Product, ProductError> {
        if self.products.contains_key(&id) {
            return Err(ProductError::AlreadyExists(id));
        }
        let product = Product {
            id,
            product_type: product_type.to_string(),
            minted_at: now,
            last_claimed_at: now,
            total_claimed: 0,
            base_daily_return,
            level: MIN_LEVEL,
            boosters: Boosters::default(),
        };
        Ok(self.products.entry(id).or_insert(product))
    }

    /// Raises the level by exactly one.
    pub fn level_up(&mut self, id: PositionId) -> Result<u32, ProductError> {
        let product = self.get_mut(id)?;
        if product.level >= MAX_LEVEL {
            return Err(ProductError::LevelOutOfBounds {
                id,
                requested: product.level.saturating_add(1),
            });
        }
        product.level += 1;
        Ok(product.level)
    }

    /// Lowers the level by exactly one.
    pub fn level_down(&mut self, id: PositionId) -> Result<u32, ProductError> {
        let product = self.get_mut(id)?;
        if product.level <= MIN_LEVEL {
            return Err(ProductError::LevelOutOfBounds {
                id,
                requested: product.level.saturating_sub(1),
            });
        }
        product.level -= 1;
        Ok(product.level)
    }

    /// Sets the level of every listed product. All-or-nothing: any missing
    /// id or out-of-bounds level leaves the ledger untouched.
    pub fn set_levels(&mut self, ids: &[PositionId], level: u32) -> Result<(), ProductError> {
        for &id in ids {
            if !self.products.contains_key(&id) {
                return Err(ProductError::NotFound(id));
            }
            if !(MIN_LEVEL..=MAX_LEVEL).contains(&level) {
                return Err(ProductError::LevelOutOfBounds { id, requested: level });
            }
        }
        for id in ids {
            if let Some(product) = self.products.get_mut(id) {
                product.level = level;
            }
        }
        Ok(())
    }

    /// Switches on boosters for every listed product. Unknown ids are
    /// skipped. Returns the ids that were actually boosted.
    pub fn boost(&mut self, ids: &[PositionId], set: BoostSet) -> Vec<PositionId> {
        let mut boosted = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(product) = self.products.get_mut(id) {
                product.boosters.apply(set);
                boosted.push(*id);
            }
        }
        boosted
    }

    /// Books a claim of `value` at `now`.
    pub fn record_claim(&mut self, id: PositionId, value: Amount, now: Timestamp) -> Result<(), ProductError> {
        let product = self.get_mut(id)?;
        product.total_claimed = product
            .total_claimed
            .checked_add(value)
            .ok_or(ProductError::Overflow(id))?;
        product.last_claimed_at = now;
        Ok(())
    }

    /// Removes a product for good.
    pub fn destroy(&mut self, id: PositionId) -> Result<Product, ProductError> {
        self.products.remove(&id).ok_or(ProductError::NotFound(id))
    }
}
