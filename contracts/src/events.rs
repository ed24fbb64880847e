//! Structured records of everything the ledger commits.
//!
//! Events are buffered while an operation runs and only published when it
//! commits. An aborted operation leaves no events behind.

use serde::Serialize;
use uuid::Uuid;
use vela_protocol::assets::{Address, Amount};
use vela_protocol::positions::PositionId;
use vela_protocol::time::Timestamp;

use crate::product::{BoostSet, ProductTypeId};
use crate::sale::{FeeSplit, SaleDescriptor, SaleId};
use crate::settings::SettingChange;
use crate::vesting::{VestingSchedule, Withdrawal};

/// One committed state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A global setting changed.
    SettingChanged {
        /// Who changed it.
        by: Address,
        /// New value.
        change: SettingChange,
    },
    /// The default or a per-identity mana rate changed.
    ManaRateChanged {
        /// Who changed it.
        by: Address,
        /// `None` for the global default.
        identity: Option<Address>,
        /// New rate; `None` restores the default.
        rate: Option<u64>,
    },
    /// Mana was spent.
    ManaConsumed {
        /// Spender.
        identity: Address,
        /// Amount spent.
        amount: u64,
    },
    /// The vesting schedule was replaced.
    VestingScheduleChanged {
        /// Who changed it.
        by: Address,
        /// New schedule.
        schedule: VestingSchedule,
    },
    /// A redemption against a vesting snapshot.
    Withdrawal(Withdrawal),
    /// A product was issued.
    ProductCreated {
        /// Position id.
        id: PositionId,
        /// Owner at issuance.
        owner: Address,
        /// Product type.
        product_type: ProductTypeId,
    },
    /// A product's accrued value was claimed.
    ProductClaimed {
        /// Position id.
        id: PositionId,
        /// Claimer.
        owner: Address,
        /// Value paid out.
        value: Amount,
        /// Claim fee burned (0 with the claim booster or when destroyed).
        fee: Amount,
    },
    /// A product was destroyed in lieu of the claim fee.
    ProductDestroyed {
        /// Position id.
        id: PositionId,
        /// Last owner.
        owner: Address,
    },
    /// A product's level changed.
    ProductLeveled {
        /// Position id.
        id: PositionId,
        /// New level.
        level: u32,
        /// Amount of the level-up asset burned.
        cost: Amount,
    },
    /// Boosters were switched on.
    ProductBoosted {
        /// Products actually boosted.
        ids: Vec<PositionId>,
        /// Flags switched on.
        boosts: BoostSet,
    },
    /// A sale was published or replaced.
    SalePut {
        /// Sale id.
        id: SaleId,
        /// Stored descriptor.
        descriptor: SaleDescriptor,
    },
    /// A sale was removed.
    SaleRemoved {
        /// Sale id.
        id: SaleId,
    },
    /// A sale was switched on or off.
    SaleActivation {
        /// Sale id.
        id: SaleId,
        /// New state.
        activated: bool,
    },
    /// Units were bought.
    Purchase {
        /// Receipt id.
        receipt_id: Uuid,
        /// Sale id.
        sale_id: SaleId,
        /// Buyer.
        buyer: Address,
        /// Units minted.
        amount: u64,
        /// Total paid.
        paid: Amount,
        /// How the payment was divided.
        split: FeeSplit,
        /// When it happened.
        at: Timestamp,
    },
}

impl LedgerEvent {
    /// Short name for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::SettingChanged { .. } => "setting_changed",
            LedgerEvent::ManaRateChanged { .. } => "mana_rate_changed",
            LedgerEvent::ManaConsumed { .. } => "mana_consumed",
            LedgerEvent::VestingScheduleChanged { .. } => "vesting_schedule_changed",
            LedgerEvent::Withdrawal(_) => "withdrawal",
            LedgerEvent::ProductCreated { .. } => "product_created",
            LedgerEvent::ProductClaimed { .. } => "product_claimed",
            LedgerEvent::ProductDestroyed { .. } => "product_destroyed",
            LedgerEvent::ProductLeveled { .. } => "product_leveled",
            LedgerEvent::ProductBoosted { .. } => "product_boosted",
            LedgerEvent::SalePut { .. } => "sale_put",
            LedgerEvent::SaleRemoved { .. } => "sale_removed",
            LedgerEvent::SaleActivation { .. } => "sale_activation",
            LedgerEvent::Purchase { .. } => "purchase",
        }
    }
}
