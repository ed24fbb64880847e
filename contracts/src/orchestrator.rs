//! # Orchestrator
//!
//! The only entry point that mutates anything. Every public operation:
//!
//! 1. checks roles and ownership before touching state,
//! 2. stages its work on a copy of the whole ledger state,
//! 3. checks mana affordability up front but consumes mana last,
//! 4. swaps the staged copy in only if every step succeeded.
//!
//! A failure anywhere drops the staged copy, so partial effects are never
//! observable. Ledgers never call each other; all cross-ledger sequencing
//! happens here, once, with no retries.
//!
//! ```text
//!   caller ──► admission ──► stage(clone) ──► ledgers + assets ──► commit(swap)
//!                  │                                  │
//!                  └──────────── abort ◄──────────────┘
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vela_protocol::assets::{Amount, AssetBook, FungibleAssets};
use vela_protocol::config::{CUSTODY_ADDRESS, VESTING_CUSTODY_ADDRESS};
use vela_protocol::error::Classify;
use vela_protocol::positions::{PositionBook, PositionId, PositionRegistry};
use vela_protocol::roles::{Role, RoleAuthority, RoleTable};
use vela_protocol::time::Timestamp;

use crate::error::LedgerError;
use crate::events::LedgerEvent;
use crate::mana::{ManaError, ManaLedger};
use crate::product::{BoostSet, Product, ProductError, ProductLedger};
use crate::sale::{fee_split, Admission, FeeSplit, SaleBook, SaleDescriptor, SaleError, SaleId, SaleTarget};
use crate::settings::{LedgerConfig, SettingChange, Settings};
use crate::vesting::{RedeemMode, VestingLedger, VestingSchedule, Withdrawal};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Everything an operation may touch, cloned as a unit for staging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerState<A, P> {
    /// Mana accounts.
    pub mana: ManaLedger,
    /// Vesting receivers and schedule.
    pub vesting: VestingLedger,
    /// Live products.
    pub products: ProductLedger,
    /// Published sales.
    pub sales: SaleBook,
    /// Global scalars.
    pub settings: Settings,
    /// Fungible asset collaborator.
    pub assets: A,
    /// Position ownership collaborator.
    pub positions: P,
}

struct Staged<A, P> {
    state: LedgerState<A, P>,
    events: Vec<LedgerEvent>,
}

// ---------------------------------------------------------------------------
// Receipts & quotes
// ---------------------------------------------------------------------------

/// How a purchase is paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentSource {
    /// Transfer the payment asset straight from the buyer.
    Direct,
    /// Redeem against the buyer's vesting snapshot.
    Vesting,
}

/// Outcome of a committed purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    /// Receipt id.
    pub receipt_id: Uuid,
    /// Sale bought from.
    pub sale_id: SaleId,
    /// Units minted.
    pub amount: u64,
    /// Total price paid.
    pub paid: Amount,
    /// How the payment was divided.
    pub split: FeeSplit,
    /// Positions issued, empty for fungible targets.
    pub positions: Vec<PositionId>,
    /// Mana spent.
    pub mana_spent: u64,
}

/// Outcome of a committed claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    /// Receipt id.
    pub receipt_id: Uuid,
    /// Claimed position.
    pub id: PositionId,
    /// Value paid out.
    pub value: Amount,
    /// Claim fee burned.
    pub fee: Amount,
    /// Whether the position was destroyed instead of paying the fee.
    pub destroyed: bool,
    /// Mana spent.
    pub mana_spent: u64,
}

/// Outcome of a committed level-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUpReceipt {
    /// Receipt id.
    pub receipt_id: Uuid,
    /// Leveled position.
    pub id: PositionId,
    /// Level after the increment.
    pub level: u32,
    /// Level-up asset burned.
    pub cost: Amount,
    /// Mana spent.
    pub mana_spent: u64,
}

/// What claiming a position would yield right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimQuote {
    /// Claimable value.
    pub value: Amount,
    /// Fee if paid; 0 with the claim booster.
    pub fee: Amount,
    /// Mana the claim costs.
    pub mana_cost: u64,
}

/// What leveling a position would cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUpQuote {
    /// Current level.
    pub level: u32,
    /// Level-up asset to burn.
    pub cost: Amount,
    /// Mana the level-up costs.
    pub mana_cost: u64,
}

/// What a purchase would cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseQuote {
    /// Price and mana cost.
    pub admission: Admission,
    /// How the price would be divided.
    pub split: FeeSplit,
}

/// A product together with its currently claimable value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductView {
    /// Stored product.
    pub product: Product,
    /// Claimable at the queried instant.
    pub pending: Amount,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Sequences the mana, vesting, product and sale ledgers into atomic
/// user-facing operations.
#[derive(Debug)]
pub struct Orchestrator<A = AssetBook, P = PositionBook, R = RoleTable> {
    state: LedgerState<A, P>,
    roles: R,
    events: Vec<LedgerEvent>,
}

impl<A, P, R> Orchestrator<A, P, R>
where
    A: FungibleAssets,
    P: PositionRegistry,
    R: RoleAuthority,
{
    /// Builds a ledger from a validated configuration and its collaborators.
    pub fn new(config: LedgerConfig, assets: A, positions: P, roles: R) -> Result<Self, LedgerError> {
        config.validate()?;
        let state = LedgerState {
            mana: ManaLedger::new(config.mana_rate, config.initial_mana),
            vesting: VestingLedger::new(config.vesting)?,
            products: ProductLedger::new(),
            sales: SaleBook::new(),
            settings: config.settings,
            assets,
            positions,
        };
        tracing::info!(
            mana_rate = config.mana_rate,
            initial_mana = config.initial_mana,
            "ledger initialized"
        );
        Ok(Self {
            state,
            roles,
            events: Vec::new(),
        })
    }

    // -- plumbing -----------------------------------------------------------

    /// Runs `f` against a staged copy and commits only on success.
    fn transact<T>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut Staged<A, P>) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut staged = Staged {
            state: self.state.clone(),
            events: Vec::new(),
        };
        match f(&mut staged) {
            Ok(value) => {
                tracing::info!(op, events = staged.events.len(), "operation committed");
                self.state = staged.state;
                self.events.extend(staged.events);
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(op, kind = %err.kind(), error = %err, "operation aborted");
                Err(err)
            }
        }
    }

    fn require_role(&self, caller: &str, role: Role) -> Result<(), LedgerError> {
        if self.roles.has_role(caller, role) {
            return Ok(());
        }
        tracing::debug!(caller, %role, "role check failed");
        Err(LedgerError::Unauthorized {
            identity: caller.to_string(),
            role,
        })
    }

    // -- read side ------------------------------------------------------------

    /// Committed ledger state.
    pub fn state(&self) -> &LedgerState<A, P> {
        &self.state
    }

    /// Current settings.
    pub fn settings(&self) -> &Settings {
        &self.state.settings
    }

    /// Asset collaborator in use.
    pub fn assets(&self) -> &A {
        &self.state.assets
    }

    /// Mutable asset collaborator, for hosts that fund accounts or move
    /// balances outside ledger operations.
    pub fn assets_mut(&mut self) -> &mut A {
        &mut self.state.assets
    }

    /// Role authority in use.
    pub fn roles(&self) -> &R {
        &self.roles
    }

    /// Mutable role authority, for hosts that administer roles in-process.
    pub fn roles_mut(&mut self) -> &mut R {
        &mut self.roles
    }

    /// Events committed since the last drain.
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Drains committed events.
    pub fn take_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Mana `identity` can spend at `now`.
    pub fn mana_of(&self, identity: &str, now: Timestamp) -> u64 {
        self.state.mana.available(identity, now)
    }

    /// Vested share at `now`, scaled to 10_000.
    pub fn percent_vested(&self, now: Timestamp) -> u128 {
        self.state.vesting.percent_vested(now)
    }

    /// What `holder` could redeem at `now`.
    pub fn currently_redeemable(&self, holder: &str, now: Timestamp) -> Result<Amount, LedgerError> {
        let live = self
            .state
            .assets
            .balance_of(&self.state.settings.vesting_asset, holder);
        Ok(self.state.vesting.currently_redeemable(holder, live, now)?)
    }

    /// Looks up a product.
    pub fn product(&self, id: PositionId) -> Option<&Product> {
        self.state.products.get(id)
    }

    /// Products owned by `owner`, each with its claimable value at `now`.
    /// Fails with an invalid range if `now` precedes any product's last claim.
    pub fn products_of(&self, owner: &str, now: Timestamp) -> Result<Vec<ProductView>, LedgerError> {
        let factor = self.state.settings.factor;
        self.state
            .positions
            .positions_of(owner)
            .into_iter()
            .filter_map(|id| self.state.products.get(id))
            .map(|product| -> Result<ProductView, LedgerError> {
                Ok(ProductView {
                    pending: product.pending(factor, now)?,
                    product: product.clone(),
                })
            })
            .collect()
    }

    /// Looks up a sale.
    pub fn sale(&self, id: SaleId) -> Option<&SaleDescriptor> {
        self.state.sales.get(id)
    }

    /// Sale ids in index order. Removal swaps the last id into the freed
    /// slot, so the order is not stable.
    pub fn sale_ids(&self) -> &[SaleId] {
        self.state.sales.ids()
    }

    /// Quotes a claim without committing anything.
    pub fn quote_claim(&self, id: PositionId, now: Timestamp) -> Result<ClaimQuote, LedgerError> {
        let product = self
            .state
            .products
            .get(id)
            .ok_or(ProductError::NotFound(id))?;
        let value = product.pending(self.state.settings.factor, now)?;
        let fee = if product.boosters.claim() {
            0
        } else {
            product.claim_fee()
        };
        Ok(ClaimQuote {
            value,
            fee,
            mana_cost: self.state.settings.claim_mana_cost,
        })
    }

    /// Quotes a level-up without committing anything.
    pub fn quote_level_up(&self, id: PositionId) -> Result<LevelUpQuote, LedgerError> {
        let product = self
            .state
            .products
            .get(id)
            .ok_or(ProductError::NotFound(id))?;
        Ok(LevelUpQuote {
            level: product.level,
            cost: product.level_up_cost(),
            mana_cost: self.state.settings.level_up_mana_cost,
        })
    }

    /// Runs sale admission for `buyer` and prices the fee split.
    pub fn quote_purchase(
        &self,
        buyer: &str,
        sale_id: SaleId,
        amount: u64,
        now: Timestamp,
    ) -> Result<PurchaseQuote, LedgerError> {
        let mana = self.state.mana.available(buyer, now);
        let admission = self.state.sales.admit(sale_id, amount, mana, now)?;
        let split = fee_split(
            admission.total_price,
            self.state.settings.dao_fee_bps,
            self.state.settings.operation_fee_bps,
        )
        .ok_or(LedgerError::Overflow("fee split"))?;
        Ok(PurchaseQuote { admission, split })
    }

    // -- administration -------------------------------------------------------

    /// Applies one settings change. Gated by [`SettingChange::required_role`].
    pub fn apply_setting(&mut self, caller: &str, change: SettingChange) -> Result<(), LedgerError> {
        self.require_role(caller, change.required_role())?;
        self.transact("apply_setting", |tx| {
            tx.state.settings.apply(&change);
            tx.state.settings.validate()?;
            tx.events.push(LedgerEvent::SettingChanged {
                by: caller.to_string(),
                change,
            });
            Ok(())
        })
    }

    /// Replaces the global default mana rate.
    pub fn set_default_mana_rate(&mut self, caller: &str, rate: u64) -> Result<(), LedgerError> {
        self.require_role(caller, Role::Manager)?;
        self.transact("set_default_mana_rate", |tx| {
            tx.state.mana.set_default_rate(rate);
            tx.events.push(LedgerEvent::ManaRateChanged {
                by: caller.to_string(),
                identity: None,
                rate: Some(rate),
            });
            Ok(())
        })
    }

    /// Overrides one identity's mana rate; `None` restores the default.
    pub fn set_mana_rate(
        &mut self,
        caller: &str,
        identity: &str,
        rate: Option<u64>,
    ) -> Result<(), LedgerError> {
        self.require_role(caller, Role::Manager)?;
        self.transact("set_mana_rate", |tx| {
            tx.state.mana.set_rate(identity, rate);
            tx.events.push(LedgerEvent::ManaRateChanged {
                by: caller.to_string(),
                identity: Some(identity.to_string()),
                rate,
            });
            Ok(())
        })
    }

    /// Replaces the vesting schedule. Fails once vesting has started.
    pub fn set_vesting_schedule(
        &mut self,
        caller: &str,
        schedule: VestingSchedule,
        now: Timestamp,
    ) -> Result<(), LedgerError> {
        self.require_role(caller, Role::Admin)?;
        self.transact("set_vesting_schedule", |tx| {
            tx.state.vesting.set_schedule(schedule, now)?;
            tx.events.push(LedgerEvent::VestingScheduleChanged {
                by: caller.to_string(),
                schedule,
            });
            Ok(())
        })
    }

    /// Publishes or wholesale-replaces a sale.
    pub fn put_sale(
        &mut self,
        caller: &str,
        id: SaleId,
        descriptor: SaleDescriptor,
    ) -> Result<(), LedgerError> {
        self.require_role(caller, Role::Manager)?;
        self.transact("put_sale", |tx| {
            tx.state.sales.put(id, descriptor);
            let stored = tx
                .state
                .sales
                .get(id)
                .cloned()
                .ok_or(SaleError::NotFound(id))?;
            tx.events.push(LedgerEvent::SalePut {
                id,
                descriptor: stored,
            });
            Ok(())
        })
    }

    /// Removes a sale.
    pub fn remove_sale(&mut self, caller: &str, id: SaleId) -> Result<SaleDescriptor, LedgerError> {
        self.require_role(caller, Role::Manager)?;
        self.transact("remove_sale", |tx| {
            let removed = tx.state.sales.remove(id)?;
            tx.events.push(LedgerEvent::SaleRemoved { id });
            Ok(removed)
        })
    }

    /// Switches a sale on or off.
    pub fn set_sale_activation(
        &mut self,
        caller: &str,
        id: SaleId,
        activated: bool,
    ) -> Result<(), LedgerError> {
        self.require_role(caller, Role::Manager)?;
        self.transact("set_sale_activation", |tx| {
            tx.state.sales.set_activation(id, activated)?;
            tx.events.push(LedgerEvent::SaleActivation { id, activated });
            Ok(())
        })
    }

    /// Switches on boosters for a batch of products. Unknown ids are skipped.
    pub fn boost(
        &mut self,
        caller: &str,
        ids: &[PositionId],
        boosts: BoostSet,
    ) -> Result<Vec<PositionId>, LedgerError> {
        self.require_role(caller, Role::Manager)?;
        self.transact("boost", |tx| {
            let boosted = tx.state.products.boost(ids, boosts);
            tx.events.push(LedgerEvent::ProductBoosted {
                ids: boosted.clone(),
                boosts,
            });
            Ok(boosted)
        })
    }

    /// Sets the level of a batch of products.
    pub fn set_levels(
        &mut self,
        caller: &str,
        ids: &[PositionId],
        level: u32,
    ) -> Result<(), LedgerError> {
        self.require_role(caller, Role::Manager)?;
        self.transact("set_levels", |tx| {
            tx.state.products.set_levels(ids, level)?;
            for &id in ids {
                tx.events.push(LedgerEvent::ProductLeveled { id, level, cost: 0 });
            }
            Ok(())
        })
    }

    /// Lowers a product's level by one.
    pub fn level_down(&mut self, caller: &str, id: PositionId) -> Result<u32, LedgerError> {
        self.require_role(caller, Role::Manager)?;
        self.transact("level_down", |tx| {
            let level = tx.state.products.level_down(id)?;
            tx.events.push(LedgerEvent::ProductLeveled { id, level, cost: 0 });
            Ok(level)
        })
    }

    // -- user operations ------------------------------------------------------

    /// Buys `amount` units from a sale.
    ///
    /// Admission runs in order (activation, window, supply, per-call cap,
    /// mana). The price is then collected into custody, split between the
    /// two payees with the remainder burned, and the target minted to the
    /// buyer. Mana is consumed last.
    pub fn purchase(
        &mut self,
        buyer: &str,
        sale_id: SaleId,
        amount: u64,
        payment: PaymentSource,
        now: Timestamp,
    ) -> Result<PurchaseReceipt, LedgerError> {
        self.transact("purchase", |tx| {
            let Staged { state: s, events } = tx;

            let mana_available = s.mana.available(buyer, now);
            let admission = s.sales.admit(sale_id, amount, mana_available, now)?;
            let target = s
                .sales
                .get(sale_id)
                .map(|d| d.target.clone())
                .ok_or(SaleError::NotFound(sale_id))?;
            if let SaleTarget::Product { product_type } = &target {
                if !s.settings.is_allowed(product_type) {
                    return Err(LedgerError::NotAllowListed(product_type.clone()));
                }
            }
            tracing::debug!(buyer, sale_id, amount, ?payment, "purchase admitted");

            let paid = admission.total_price;
            let payment_asset = s.settings.payment_asset.clone();

            match payment {
                PaymentSource::Direct => {
                    s.assets
                        .transfer(&payment_asset, buyer, CUSTODY_ADDRESS, paid)?;
                }
                PaymentSource::Vesting => {
                    let live = s.assets.balance_of(&s.settings.vesting_asset, buyer);
                    let withdrawal = s.vesting.redeem(
                        buyer,
                        CUSTODY_ADDRESS,
                        RedeemMode::Delegated { amount: paid },
                        live,
                        now,
                    )?;
                    s.assets
                        .transfer(&payment_asset, VESTING_CUSTODY_ADDRESS, CUSTODY_ADDRESS, paid)
                        .map_err(LedgerError::collaborator("vesting payout"))?;
                    events.push(LedgerEvent::Withdrawal(withdrawal));
                }
            }

            let split = fee_split(paid, s.settings.dao_fee_bps, s.settings.operation_fee_bps)
                .ok_or(LedgerError::Overflow("fee split"))?;
            s.assets
                .transfer(&payment_asset, CUSTODY_ADDRESS, &s.settings.dao_payee, split.dao)
                .map_err(LedgerError::collaborator("dao fee"))?;
            s.assets
                .transfer(
                    &payment_asset,
                    CUSTODY_ADDRESS,
                    &s.settings.operation_payee,
                    split.operation,
                )
                .map_err(LedgerError::collaborator("operation fee"))?;
            s.assets
                .burn(&payment_asset, CUSTODY_ADDRESS, split.burned)
                .map_err(LedgerError::collaborator("burn remainder"))?;

            let positions = match &target {
                SaleTarget::Product { product_type } => {
                    let base_daily_return = *s
                        .settings
                        .product_types
                        .get(product_type)
                        .ok_or_else(|| LedgerError::UnknownProductType(product_type.clone()))?;
                    let before = s.positions.balance_of(buyer);
                    let mut minted = Vec::new();
                    for _ in 0..amount {
                        let id = s.positions.mint(buyer);
                        s.products.create(id, product_type, base_daily_return, now)?;
                        events.push(LedgerEvent::ProductCreated {
                            id,
                            owner: buyer.to_string(),
                            product_type: product_type.clone(),
                        });
                        minted.push(id);
                    }
                    let delta = s.positions.balance_of(buyer).saturating_sub(before);
                    if delta as u64 != amount {
                        return Err(LedgerError::MintMismatch {
                            expected: amount as Amount,
                            minted: delta as Amount,
                        });
                    }
                    minted
                }
                SaleTarget::Asset { asset } => {
                    let before = s.assets.balance_of(asset, buyer);
                    s.assets
                        .mint(asset, buyer, amount as Amount)
                        .map_err(LedgerError::collaborator("sale mint"))?;
                    let delta = s.assets.balance_of(asset, buyer).saturating_sub(before);
                    if delta != amount as Amount {
                        return Err(LedgerError::MintMismatch {
                            expected: amount as Amount,
                            minted: delta,
                        });
                    }
                    Vec::new()
                }
            };

            s.sales.record_purchase(sale_id, amount)?;
            s.mana.consume(buyer, admission.mana_cost, now)?;

            let receipt = PurchaseReceipt {
                receipt_id: Uuid::new_v4(),
                sale_id,
                amount,
                paid,
                split,
                positions,
                mana_spent: admission.mana_cost,
            };
            events.push(LedgerEvent::Purchase {
                receipt_id: receipt.receipt_id,
                sale_id,
                buyer: buyer.to_string(),
                amount,
                paid,
                split,
                at: now,
            });
            if admission.mana_cost > 0 {
                events.push(LedgerEvent::ManaConsumed {
                    identity: buyer.to_string(),
                    amount: admission.mana_cost,
                });
            }
            Ok(receipt)
        })
    }

    /// Claims a position's accrued value.
    ///
    /// With the claim booster the claim is free. Otherwise the owner either
    /// burns the quoted claim fee (`pay_fee = true`) or gives up the
    /// position entirely (`pay_fee = false`). The value is then minted to
    /// the owner by the reserve authority and mana is consumed last.
    pub fn claim(
        &mut self,
        caller: &str,
        id: PositionId,
        pay_fee: bool,
        now: Timestamp,
    ) -> Result<ClaimReceipt, LedgerError> {
        self.transact("claim", |tx| {
            let Staged { state: s, events } = tx;

            ensure_owner(&s.positions, caller, id)?;
            let product = s
                .products
                .get(id)
                .cloned()
                .ok_or(ProductError::NotFound(id))?;
            if !s.settings.is_allowed(&product.product_type) {
                return Err(LedgerError::NotAllowListed(product.product_type));
            }
            let mana_cost = s.settings.claim_mana_cost;
            ensure_mana(&s.mana, caller, mana_cost, now)?;

            let value = product.pending(s.settings.factor, now)?;
            if value == 0 {
                return Err(ProductError::NothingToClaim(id).into());
            }

            let (fee, destroyed) = if product.boosters.claim() {
                (0, false)
            } else if pay_fee {
                let fee = product.claim_fee();
                s.assets.burn(&s.settings.claim_fee_asset, caller, fee)?;
                (fee, false)
            } else {
                s.positions.burn(id)?;
                (0, true)
            };

            s.products.record_claim(id, value, now)?;
            if destroyed {
                s.products.destroy(id)?;
            }

            let minted = s
                .assets
                .mint(&s.settings.reserve_asset, caller, value)
                .map_err(LedgerError::collaborator("reserve mint"))?;
            if minted != value {
                return Err(LedgerError::MintMismatch {
                    expected: value,
                    minted,
                });
            }

            s.mana.consume(caller, mana_cost, now)?;

            events.push(LedgerEvent::ProductClaimed {
                id,
                owner: caller.to_string(),
                value,
                fee,
            });
            if destroyed {
                events.push(LedgerEvent::ProductDestroyed {
                    id,
                    owner: caller.to_string(),
                });
            }
            if mana_cost > 0 {
                events.push(LedgerEvent::ManaConsumed {
                    identity: caller.to_string(),
                    amount: mana_cost,
                });
            }
            Ok(ClaimReceipt {
                receipt_id: Uuid::new_v4(),
                id,
                value,
                fee,
                destroyed,
                mana_spent: mana_cost,
            })
        })
    }

    /// Raises a position's level by one, burning the quoted cost.
    pub fn level_up(
        &mut self,
        caller: &str,
        id: PositionId,
        now: Timestamp,
    ) -> Result<LevelUpReceipt, LedgerError> {
        self.transact("level_up", |tx| {
            let Staged { state: s, events } = tx;

            ensure_owner(&s.positions, caller, id)?;
            let product = s
                .products
                .get(id)
                .cloned()
                .ok_or(ProductError::NotFound(id))?;
            let mana_cost = s.settings.level_up_mana_cost;
            ensure_mana(&s.mana, caller, mana_cost, now)?;

            let cost = product.level_up_cost();
            s.assets.burn(&s.settings.level_up_asset, caller, cost)?;
            let level = s.products.level_up(id)?;
            s.mana.consume(caller, mana_cost, now)?;

            events.push(LedgerEvent::ProductLeveled { id, level, cost });
            if mana_cost > 0 {
                events.push(LedgerEvent::ManaConsumed {
                    identity: caller.to_string(),
                    amount: mana_cost,
                });
            }
            Ok(LevelUpReceipt {
                receipt_id: Uuid::new_v4(),
                id,
                level,
                cost,
                mana_spent: mana_cost,
            })
        })
    }

    /// Redeems everything vested so far for `holder`, paying `beneficiary`.
    pub fn redeem(
        &mut self,
        holder: &str,
        beneficiary: &str,
        now: Timestamp,
    ) -> Result<Withdrawal, LedgerError> {
        self.transact("redeem", |tx| {
            let Staged { state: s, events } = tx;

            let live = s.assets.balance_of(&s.settings.vesting_asset, holder);
            let withdrawal = s
                .vesting
                .redeem(holder, beneficiary, RedeemMode::Vesting, live, now)?;
            s.assets
                .transfer(
                    &s.settings.payment_asset,
                    VESTING_CUSTODY_ADDRESS,
                    beneficiary,
                    withdrawal.amount,
                )
                .map_err(LedgerError::collaborator("vesting payout"))?;

            events.push(LedgerEvent::Withdrawal(withdrawal.clone()));
            Ok(withdrawal)
        })
    }
}

impl<A, P, R> Orchestrator<A, P, R>
where
    A: FungibleAssets + Serialize,
    P: PositionRegistry + Serialize,
    R: RoleAuthority,
{
    /// BLAKE3 digest of the committed state's canonical JSON. Two ledgers
    /// with identical histories produce identical digests.
    pub fn state_digest(&self) -> Result<String, serde_json::Error> {
        let bytes = serde_json::to_vec(&self.state)?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }
}

fn ensure_owner<P: PositionRegistry>(
    positions: &P,
    caller: &str,
    id: PositionId,
) -> Result<(), LedgerError> {
    match positions.owner_of(id) {
        Some(owner) if owner == caller => Ok(()),
        _ => Err(LedgerError::NotOwner {
            id,
            caller: caller.to_string(),
        }),
    }
}

fn ensure_mana(mana: &ManaLedger, identity: &str, cost: u64, now: Timestamp) -> Result<(), LedgerError> {
    let available = mana.available(identity, now);
    if available < cost {
        return Err(ManaError::Exhausted {
            identity: identity.to_string(),
            available,
            requested: cost,
        }
        .into());
    }
    Ok(())
}
