// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Vela Protocol Core Primitives
//!
//! The building blocks shared by every Vela ledger. Nothing in here holds
//! economic state of its own; it defines the vocabulary the contracts
//! crate speaks.
//!
//! ## Modules
//!
//! - **config**: Constants. Every magic number lives here.
//! - **time**: Timestamps and clocks. Nothing ticks; time is only read.
//! - **accrual**: Integer helpers for lazily derived, time-based values.
//! - **error**: The failure taxonomy every ledger maps onto.
//! - **assets**: Fungible asset collaborator trait plus an in-memory book.
//! - **positions**: Ownership registry for yield positions.
//! - **roles**: Role-based authorization checks.
//!
//! ## Design Philosophy
//!
//! 1. Integer math only. Truncation order is part of the contract.
//! 2. Collaborators are traits so hosts can bring their own.
//! 3. If it touches money, it has tests. Plural.

pub mod accrual;
pub mod assets;
pub mod config;
pub mod error;
pub mod positions;
pub mod roles;
pub mod time;
