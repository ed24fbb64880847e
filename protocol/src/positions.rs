//! # Position Ownership
//!
//! Every yield product is paired 1:1 with an ownership token. Who owns a
//! position, and how it changes hands, is this collaborator's business;
//! the product ledger only owns the economic fields.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assets::Address;
use crate::error::{Classify, ErrorKind};

/// Identifier of a position, assigned sequentially from 1.
pub type PositionId = u64;

/// Errors raised by the ownership collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    /// No position with this id exists.
    #[error("position {0} does not exist")]
    NotFound(PositionId),

    /// The caller does not own the position.
    #[error("position {id} is not owned by {caller}")]
    NotOwner {
        /// The position.
        id: PositionId,
        /// Who tried to act on it.
        caller: Address,
    },
}

impl Classify for PositionError {
    fn kind(&self) -> ErrorKind {
        match self {
            PositionError::NotFound(_) => ErrorKind::ConsistencyViolation,
            PositionError::NotOwner { .. } => ErrorKind::AdmissionDenied,
        }
    }
}

/// Ownership primitives for positions.
pub trait PositionRegistry: Clone {
    /// Current owner, or `None` if the position does not exist.
    fn owner_of(&self, id: PositionId) -> Option<Address>;

    /// Mints a fresh position to `to` and returns its id.
    fn mint(&mut self, to: &str) -> PositionId;

    /// Destroys a position.
    fn burn(&mut self, id: PositionId) -> Result<(), PositionError>;

    /// Moves a position between owners.
    fn transfer(&mut self, id: PositionId, from: &str, to: &str) -> Result<(), PositionError>;

    /// Positions owned by `owner`, in ascending id order.
    fn positions_of(&self, owner: &str) -> Vec<PositionId>;

    /// Number of positions owned by `owner`.
    fn balance_of(&self, owner: &str) -> usize {
        self.positions_of(owner).len()
    }
}

/// In-memory ownership registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionBook {
    next_id: PositionId,
    owners: BTreeMap<PositionId, Address>,
    by_owner: BTreeMap<Address, BTreeSet<PositionId>>,
}

impl PositionBook {
    /// Creates an empty registry. The first minted id is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of live positions.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// `true` if no positions exist.
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

impl PositionRegistry for PositionBook {
    fn owner_of(&self, id: PositionId) -> Option<Address> {
        self.owners.get(&id).cloned()
    }

    fn mint(&mut self, to: &str) -> PositionId {
        self.next_id += 1;
        let id = self.next_id;
        self.owners.insert(id, to.to_string());
        self.by_owner.entry(to.to_string()).or_default().insert(id);
        id
    }

    fn burn(&mut self, id: PositionId) -> Result<(), PositionError> {
        let owner = self.owners.remove(&id).ok_or(PositionError::NotFound(id))?;
        if let Some(set) = self.by_owner.get_mut(&owner) {
            set.remove(&id);
            if set.is_empty() {
                self.by_owner.remove(&owner);
            }
        }
        Ok(())
    }

    fn transfer(&mut self, id: PositionId, from: &str, to: &str) -> Result<(), PositionError> {
        match self.owners.get(&id) {
            None => return Err(PositionError::NotFound(id)),
            Some(owner) if owner != from => {
                return Err(PositionError::NotOwner {
                    id,
                    caller: from.to_string(),
                })
            }
            Some(_) => {}
        }
        self.burn(id)?;
        self.owners.insert(id, to.to_string());
        self.by_owner.entry(to.to_string()).or_default().insert(id);
        Ok(())
    }

    fn positions_of(&self, owner: &str) -> Vec<PositionId> {
        self.by_owner
            .get(owner)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}
