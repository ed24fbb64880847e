//! # Fungible Asset Collaborators
//!
//! The ledgers never hold token balances themselves. Payment assets, the
//! reserve asset and fungible sale targets all live behind the
//! [`FungibleAssets`] trait, whose primitives are fail-fast: either the
//! whole transfer/burn/mint happens or an [`AssetError`] comes back and
//! nothing changed.
//!
//! [`AssetBook`] is the in-memory implementation. It tracks per-asset
//! supply and per-holder balances, and optionally enforces a supply cap.
//! A mint that would cross the cap mints only the remainder; callers that
//! need an exact quantity compare balances before and after.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{Classify, ErrorKind};

/// Smallest-unit amount of any fungible asset.
pub type Amount = u128;

/// Asset symbol, e.g. `"USDV"`.
pub type AssetId = String;

/// Opaque holder identity.
pub type Address = String;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by fungible asset primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    /// The asset has never been registered.
    #[error("unknown asset: {0}")]
    UnknownAsset(AssetId),

    /// The holder does not have enough of the asset.
    #[error("insufficient balance of {asset}: holder {holder} has {balance}, needs {requested}")]
    InsufficientBalance {
        /// Asset being moved.
        asset: AssetId,
        /// Holder being debited.
        holder: Address,
        /// Current balance.
        balance: Amount,
        /// Requested amount.
        requested: Amount,
    },

    /// Supply or balance would exceed `u128::MAX`.
    #[error("supply overflow minting {amount} of {asset}")]
    SupplyOverflow {
        /// Asset being minted.
        asset: AssetId,
        /// Amount that overflowed.
        amount: Amount,
    },

    /// An asset with this symbol already exists.
    #[error("duplicate asset: {0}")]
    DuplicateAsset(AssetId),
}

impl Classify for AssetError {
    fn kind(&self) -> ErrorKind {
        match self {
            AssetError::InsufficientBalance { .. } => ErrorKind::ResourceExhausted,
            AssetError::UnknownAsset(_)
            | AssetError::SupplyOverflow { .. }
            | AssetError::DuplicateAsset(_) => ErrorKind::ConsistencyViolation,
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Fungible value-transfer primitives consumed by the orchestrator.
///
/// Implementations must be `Clone`: the orchestrator stages every
/// operation on a copy of the world and swaps it in only on success.
pub trait FungibleAssets: Clone {
    /// Balance of `holder`, 0 for unknown assets or holders.
    fn balance_of(&self, asset: &str, holder: &str) -> Amount;

    /// Moves `amount` from `from` to `to`.
    fn transfer(&mut self, asset: &str, from: &str, to: &str, amount: Amount)
        -> Result<(), AssetError>;

    /// Destroys `amount` held by `from`.
    fn burn(&mut self, asset: &str, from: &str, amount: Amount) -> Result<(), AssetError>;

    /// Creates up to `amount` for `to` and returns how much was minted.
    fn mint(&mut self, asset: &str, to: &str, amount: Amount) -> Result<Amount, AssetError>;

    /// Current total supply.
    fn total_supply(&self, asset: &str) -> Amount;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Supply information for one registered asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfo {
    /// Symbol, unique within the book.
    pub symbol: AssetId,
    /// Current total supply.
    pub total_supply: Amount,
    /// Optional hard cap on total supply.
    pub max_supply: Option<Amount>,
}

/// In-memory registry of fungible assets and their balances.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetBook {
    assets: BTreeMap<AssetId, AssetInfo>,
    balances: BTreeMap<AssetId, BTreeMap<Address, Amount>>,
}

impl AssetBook {
    /// Creates an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new asset with zero supply.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::DuplicateAsset`] if the symbol is taken.
    pub fn register(&mut self, symbol: &str, max_supply: Option<Amount>) -> Result<(), AssetError> {
        if self.assets.contains_key(symbol) {
            return Err(AssetError::DuplicateAsset(symbol.to_string()));
        }
        self.assets.insert(
            symbol.to_string(),
            AssetInfo {
                symbol: symbol.to_string(),
                total_supply: 0,
                max_supply,
            },
        );
        self.balances.insert(symbol.to_string(), BTreeMap::new());
        Ok(())
    }

    /// Returns supply metadata, or `None` for unknown assets.
    pub fn info(&self, symbol: &str) -> Option<&AssetInfo> {
        self.assets.get(symbol)
    }

    /// Number of registered assets.
    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    fn debit(&mut self, asset: &str, holder: &str, amount: Amount) -> Result<(), AssetError> {
        let balances = self
            .balances
            .get_mut(asset)
            .ok_or_else(|| AssetError::UnknownAsset(asset.to_string()))?;
        let balance = balances.get(holder).copied().unwrap_or(0);
        if balance < amount {
            return Err(AssetError::InsufficientBalance {
                asset: asset.to_string(),
                holder: holder.to_string(),
                balance,
                requested: amount,
            });
        }
        balances.insert(holder.to_string(), balance - amount);
        Ok(())
    }

    fn credit(&mut self, asset: &str, holder: &str, amount: Amount) -> Result<(), AssetError> {
        let balances = self
            .balances
            .get_mut(asset)
            .ok_or_else(|| AssetError::UnknownAsset(asset.to_string()))?;
        let balance = balances.entry(holder.to_string()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| AssetError::SupplyOverflow {
                asset: asset.to_string(),
                amount,
            })?;
        Ok(())
    }
}

impl FungibleAssets for AssetBook {
    fn balance_of(&self, asset: &str, holder: &str) -> Amount {
        self.balances
            .get(asset)
            .and_then(|b| b.get(holder))
            .copied()
            .unwrap_or(0)
    }

    fn transfer(
        &mut self,
        asset: &str,
        from: &str,
        to: &str,
        amount: Amount,
    ) -> Result<(), AssetError> {
        // Debit first so a failed credit can only be an overflow on `to`,
        // which the caller's rollback discards anyway.
        self.debit(asset, from, amount)?;
        self.credit(asset, to, amount)
    }

    fn burn(&mut self, asset: &str, from: &str, amount: Amount) -> Result<(), AssetError> {
        self.debit(asset, from, amount)?;
        let info = self
            .assets
            .get_mut(asset)
            .ok_or_else(|| AssetError::UnknownAsset(asset.to_string()))?;
        info.total_supply = info.total_supply.saturating_sub(amount);
        Ok(())
    }

    fn mint(&mut self, asset: &str, to: &str, amount: Amount) -> Result<Amount, AssetError> {
        let info = self
            .assets
            .get_mut(asset)
            .ok_or_else(|| AssetError::UnknownAsset(asset.to_string()))?;

        let mintable = match info.max_supply {
            Some(cap) => amount.min(cap.saturating_sub(info.total_supply)),
            None => amount,
        };
        info.total_supply = info
            .total_supply
            .checked_add(mintable)
            .ok_or_else(|| AssetError::SupplyOverflow {
                asset: asset.to_string(),
                amount,
            })?;

        self.credit(asset, to, mintable)?;
        Ok(mintable)
    }

    fn total_supply(&self, asset: &str) -> Amount {
        self.assets.get(asset).map(|a| a.total_supply).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> AssetBook {
        let mut book = AssetBook::new();
        book.register("USDV", None).unwrap();
        book
    }

    #[test]
    fn duplicate_symbol_rejected() {
        let mut book = book();
        assert_eq!(
            book.register("USDV", None),
            Err(AssetError::DuplicateAsset("USDV".into()))
        );
        assert_eq!(book.asset_count(), 1);
    }

    #[test]
    fn mint_increases_supply_and_balance() {
        let mut book = book();
        assert_eq!(book.mint("USDV", "alice", 1_000).unwrap(), 1_000);
        assert_eq!(book.total_supply("USDV"), 1_000);
        assert_eq!(book.balance_of("USDV", "alice"), 1_000);
    }

    #[test]
    fn mint_respects_cap() {
        let mut book = AssetBook::new();
        book.register("CAP", Some(150)).unwrap();
        assert_eq!(book.mint("CAP", "alice", 100).unwrap(), 100);
        assert_eq!(book.mint("CAP", "bob", 100).unwrap(), 50);
        assert_eq!(book.mint("CAP", "bob", 1).unwrap(), 0);
        assert_eq!(book.total_supply("CAP"), 150);
    }

    #[test]
    fn transfer_moves_balance() {
        let mut book = book();
        book.mint("USDV", "alice", 500).unwrap();
        book.transfer("USDV", "alice", "bob", 200).unwrap();
        assert_eq!(book.balance_of("USDV", "alice"), 300);
        assert_eq!(book.balance_of("USDV", "bob"), 200);
        assert_eq!(book.total_supply("USDV"), 500);
    }

    #[test]
    fn transfer_more_than_balance_rejected() {
        let mut book = book();
        book.mint("USDV", "alice", 10).unwrap();
        let err = book.transfer("USDV", "alice", "bob", 11).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(book.balance_of("USDV", "alice"), 10);
    }

    #[test]
    fn burn_reduces_supply() {
        let mut book = book();
        book.mint("USDV", "alice", 1_000).unwrap();
        book.burn("USDV", "alice", 400).unwrap();
        assert_eq!(book.total_supply("USDV"), 600);
        assert_eq!(book.balance_of("USDV", "alice"), 600);
    }

    #[test]
    fn unknown_asset_is_consistency_violation() {
        let mut book = book();
        let err = book.mint("NOPE", "alice", 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConsistencyViolation);
        assert_eq!(book.balance_of("NOPE", "alice"), 0);
    }
}
