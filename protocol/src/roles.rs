//! Role-based authorization.
//!
//! The ledger only ever asks one question: does this identity hold this
//! role? Granting and revoking roles happens outside the orchestrator,
//! against whatever [`RoleAuthority`] the host wires in. Nothing is
//! granted by default.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::assets::Address;

/// Privileged roles recognised by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Wires collaborators and global parameters.
    Admin,
    /// Runs sales, products and mana overrides day to day.
    Manager,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "Admin"),
            Role::Manager => write!(f, "Manager"),
        }
    }
}

/// Capability test consulted before every privileged operation.
pub trait RoleAuthority {
    /// `true` if `identity` currently holds `role`.
    fn has_role(&self, identity: &str, role: Role) -> bool;
}

/// In-memory role membership table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleTable {
    members: BTreeMap<Address, BTreeSet<Role>>,
}

impl RoleTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants `role` to `identity`. Returns `false` if it was already held.
    pub fn grant(&mut self, identity: &str, role: Role) -> bool {
        self.members
            .entry(identity.to_string())
            .or_default()
            .insert(role)
    }

    /// Revokes `role` from `identity`. Returns `false` if it was not held.
    pub fn revoke(&mut self, identity: &str, role: Role) -> bool {
        match self.members.get_mut(identity) {
            Some(roles) => roles.remove(&role),
            None => false,
        }
    }
}

impl RoleAuthority for RoleTable {
    fn has_role(&self, identity: &str, role: Role) -> bool {
        self.members
            .get(identity)
            .map(|roles| roles.contains(&role))
            .unwrap_or(false)
    }
}
