//! # Vela Ledger Contracts
//!
//! The resource-gated economic ledger built on top of `vela-protocol`.
//!
//! - **Mana** ([`mana`]): a per-identity action budget that refills lazily.
//! - **Vesting** ([`vesting`]): snapshot-based linear release with
//!   delegated redemption.
//! - **Products** ([`product`]): leveled yield positions accruing a fixed
//!   daily return at one-minute resolution.
//! - **Sales** ([`sale`]): time-windowed listings with supply caps, mana
//!   pricing and a three-way fee split.
//! - **Orchestrator** ([`orchestrator`]): the single mutating entry point,
//!   sequencing the ledgers above into all-or-nothing operations.
//!
//! ## Design Principles
//!
//! 1. Time-dependent quantities are pure functions of stored timestamps.
//!    Nothing ticks in the background.
//! 2. All monetary arithmetic is checked. Truncation happens only where the
//!    formulas say so, in the order they say it.
//! 3. Ledgers never call each other. Cross-ledger effects are staged by the
//!    orchestrator and committed as a unit.
//! 4. Every public type is serializable, and state uses ordered maps so the
//!    committed state has a stable digest.

pub mod error;
pub mod events;
pub mod mana;
pub mod orchestrator;
pub mod product;
pub mod sale;
pub mod settings;
pub mod shared;
pub mod vesting;

pub use error::LedgerError;
pub use events::LedgerEvent;
pub use orchestrator::{LedgerState, Orchestrator, PaymentSource};
pub use settings::{LedgerConfig, SettingChange, Settings};
pub use shared::SharedLedger;
