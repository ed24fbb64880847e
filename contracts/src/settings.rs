//! # Ledger Configuration
//!
//! [`LedgerConfig`] is what a host hands the orchestrator at startup,
//! usually deserialized from JSON. After that, the global scalars live in
//! [`Settings`] and change only through [`SettingChange`]s applied by the
//! orchestrator's role-gated setter, each of which emits a change event.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use vela_protocol::assets::{Address, Amount, AssetId};
use vela_protocol::config::{
    BPS_DENOMINATOR, DEFAULT_INITIAL_MANA, DEFAULT_MANA_RATE, FACTOR_PRECISION, MANA_MAX,
};
use vela_protocol::roles::Role;

use crate::error::LedgerError;
use crate::product::ProductTypeId;
use crate::vesting::VestingSchedule;

/// Startup configuration for a ledger instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Default mana refill rate, precision 100 (10_000 = 100.00/h).
    #[serde(default = "default_mana_rate")]
    pub mana_rate: u64,
    /// Mana a fresh identity starts with.
    #[serde(default = "default_initial_mana")]
    pub initial_mana: u64,
    /// Global settings.
    pub settings: Settings,
    /// Vesting schedule.
    pub vesting: VestingSchedule,
}

fn default_mana_rate() -> u64 {
    DEFAULT_MANA_RATE
}

fn default_initial_mana() -> u64 {
    DEFAULT_INITIAL_MANA
}

impl LedgerConfig {
    /// Rejects configurations the ledger could never operate under.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.initial_mana > MANA_MAX {
            return Err(LedgerError::InvalidConfig(format!(
                "initial_mana {} exceeds bucket size {}",
                self.initial_mana, MANA_MAX
            )));
        }
        self.vesting.validate()?;
        self.settings.validate()
    }
}

/// Global scalars and wired collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Yield multiplier, precision 100.
    #[serde(default = "default_factor")]
    pub factor: u128,
    /// DAO share of sale proceeds, in bps.
    pub dao_fee_bps: u128,
    /// Operations share of sale proceeds, in bps.
    pub operation_fee_bps: u128,
    /// Receives the DAO share.
    pub dao_payee: Address,
    /// Receives the operations share.
    pub operation_payee: Address,
    /// Mana charged per claim.
    pub claim_mana_cost: u64,
    /// Mana charged per level-up.
    pub level_up_mana_cost: u64,
    /// Asset burned as the claim fee.
    pub claim_fee_asset: AssetId,
    /// Asset burned to level up.
    pub level_up_asset: AssetId,
    /// Asset sales are priced in; also the vesting payout asset.
    pub payment_asset: AssetId,
    /// Asset the reserve authority mints to pay claims.
    pub reserve_asset: AssetId,
    /// Asset whose balance is snapshotted for vesting.
    pub vesting_asset: AssetId,
    /// Product types whose positions may be sold and claimed.
    #[serde(default)]
    pub allowed_product_types: BTreeSet<ProductTypeId>,
    /// Base daily return per product type.
    #[serde(default)]
    pub product_types: BTreeMap<ProductTypeId, Amount>,
}

fn default_factor() -> u128 {
    FACTOR_PRECISION
}

impl Settings {
    /// Fee rates together may not exceed 100%.
    pub fn validate(&self) -> Result<(), LedgerError> {
        let total = self
            .dao_fee_bps
            .checked_add(self.operation_fee_bps)
            .unwrap_or(u128::MAX);
        if total > BPS_DENOMINATOR {
            return Err(LedgerError::InvalidConfig(format!(
                "fee rates sum to {} bps, above {}",
                total, BPS_DENOMINATOR
            )));
        }
        Ok(())
    }

    /// `true` if positions of this type may be sold and claimed.
    pub fn is_allowed(&self, product_type: &str) -> bool {
        self.allowed_product_types.contains(product_type)
    }

    /// Applies one change in place.
    pub fn apply(&mut self, change: &SettingChange) {
        match change {
            SettingChange::Factor(v) => self.factor = *v,
            SettingChange::DaoFeeBps(v) => self.dao_fee_bps = *v,
            SettingChange::OperationFeeBps(v) => self.operation_fee_bps = *v,
            SettingChange::DaoPayee(v) => self.dao_payee = v.clone(),
            SettingChange::OperationPayee(v) => self.operation_payee = v.clone(),
            SettingChange::ClaimManaCost(v) => self.claim_mana_cost = *v,
            SettingChange::LevelUpManaCost(v) => self.level_up_mana_cost = *v,
            SettingChange::ClaimFeeAsset(v) => self.claim_fee_asset = v.clone(),
            SettingChange::LevelUpAsset(v) => self.level_up_asset = v.clone(),
            SettingChange::PaymentAsset(v) => self.payment_asset = v.clone(),
            SettingChange::ReserveAsset(v) => self.reserve_asset = v.clone(),
            SettingChange::VestingAsset(v) => self.vesting_asset = v.clone(),
            SettingChange::ProductTypeAllowed {
                product_type,
                allowed,
            } => {
                if *allowed {
                    self.allowed_product_types.insert(product_type.clone());
                } else {
                    self.allowed_product_types.remove(product_type);
                }
            }
            SettingChange::ProductTypeReturn {
                product_type,
                base_daily_return,
            } => {
                self.product_types
                    .insert(product_type.clone(), *base_daily_return);
            }
        }
    }
}

/// One administrative change to [`Settings`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingChange {
    /// Yield multiplier.
    Factor(u128),
    /// DAO fee rate.
    DaoFeeBps(u128),
    /// Operations fee rate.
    OperationFeeBps(u128),
    /// DAO payee.
    DaoPayee(Address),
    /// Operations payee.
    OperationPayee(Address),
    /// Mana per claim.
    ClaimManaCost(u64),
    /// Mana per level-up.
    LevelUpManaCost(u64),
    /// Claim fee asset.
    ClaimFeeAsset(AssetId),
    /// Level-up payment asset.
    LevelUpAsset(AssetId),
    /// Sale payment / vesting payout asset.
    PaymentAsset(AssetId),
    /// Reserve asset minted for claims.
    ReserveAsset(AssetId),
    /// Vesting snapshot asset.
    VestingAsset(AssetId),
    /// Allow-list toggle for a product type.
    ProductTypeAllowed {
        /// Product type.
        product_type: ProductTypeId,
        /// New flag.
        allowed: bool,
    },
    /// Base daily return for a product type.
    ProductTypeReturn {
        /// Product type.
        product_type: ProductTypeId,
        /// New base return.
        base_daily_return: Amount,
    },
}

impl SettingChange {
    /// Role required to apply this change. Wiring collaborators and fee
    /// routing is admin work; tuning the economy is manager work.
    pub fn required_role(&self) -> Role {
        match self {
            SettingChange::DaoFeeBps(_)
            | SettingChange::OperationFeeBps(_)
            | SettingChange::DaoPayee(_)
            | SettingChange::OperationPayee(_)
            | SettingChange::ClaimFeeAsset(_)
            | SettingChange::LevelUpAsset(_)
            | SettingChange::PaymentAsset(_)
            | SettingChange::ReserveAsset(_)
            | SettingChange::VestingAsset(_) => Role::Admin,
            SettingChange::Factor(_)
            | SettingChange::ClaimManaCost(_)
            | SettingChange::LevelUpManaCost(_)
            | SettingChange::ProductTypeAllowed { .. }
            | SettingChange::ProductTypeReturn { .. } => Role::Manager,
        }
    }
}
