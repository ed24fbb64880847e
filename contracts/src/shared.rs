//! Thread-safe handle around an [`Orchestrator`].
//!
//! Operations from different threads are serialized by the lock. A callback
//! that tries to re-enter the ledger from inside a running operation finds
//! the state already borrowed and is rejected with
//! [`LedgerError::Reentrancy`] instead of deadlocking.

use std::cell::RefCell;
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use vela_protocol::assets::AssetBook;
use vela_protocol::positions::PositionBook;
use vela_protocol::roles::RoleTable;

use crate::error::LedgerError;
use crate::orchestrator::Orchestrator;

/// Cloneable, lock-guarded ledger handle.
pub struct SharedLedger<A = AssetBook, P = PositionBook, R = RoleTable> {
    inner: Arc<ReentrantMutex<RefCell<Orchestrator<A, P, R>>>>,
}

impl<A, P, R> Clone for SharedLedger<A, P, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, P, R> SharedLedger<A, P, R> {
    /// Wraps an orchestrator.
    pub fn new(orchestrator: Orchestrator<A, P, R>) -> Self {
        Self {
            inner: Arc::new(ReentrantMutex::new(RefCell::new(orchestrator))),
        }
    }

    /// Runs a mutating operation under the lock.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Reentrancy`] if called from inside another `execute`
    /// or `read` on the same thread; otherwise whatever `f` returns.
    pub fn execute<T>(
        &self,
        f: impl FnOnce(&mut Orchestrator<A, P, R>) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let guard = self.inner.lock();
        let mut orchestrator = guard.try_borrow_mut().map_err(|_| {
            tracing::warn!("reentrant ledger call rejected");
            LedgerError::Reentrancy
        })?;
        f(&mut orchestrator)
    }

    /// Runs a read-only query under the lock.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Reentrancy`] if a mutating operation is in progress
    /// on the same thread.
    pub fn read<T>(&self, f: impl FnOnce(&Orchestrator<A, P, R>) -> T) -> Result<T, LedgerError> {
        let guard = self.inner.lock();
        let orchestrator = guard.try_borrow().map_err(|_| LedgerError::Reentrancy)?;
        Ok(f(&orchestrator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::fixtures;
    use crate::settings::LedgerConfig;
    use crate::vesting::VestingSchedule;
    use std::thread;
    use vela_protocol::error::{Classify, ErrorKind};
    use vela_protocol::roles::Role;

    fn ledger() -> SharedLedger {
        let config = LedgerConfig {
            mana_rate: 10_000,
            initial_mana: 100,
            settings: fixtures::settings(),
            vesting: VestingSchedule {
                start_date: 0,
                period_length: 2_592_000,
                number_of_periods: 12,
            },
        };
        let mut roles = RoleTable::new();
        roles.grant("manager", Role::Manager);
        let orchestrator =
            Orchestrator::new(config, AssetBook::new(), PositionBook::new(), roles).unwrap();
        SharedLedger::new(orchestrator)
    }

    #[test]
    fn nested_execute_is_rejected() {
        let shared = ledger();
        let inner = shared.clone();
        let err = shared
            .execute(|_| inner.execute(|o| o.set_default_mana_rate("manager", 5_000)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Reentrancy);
        let rate = shared.read(|o| o.state().mana.default_rate()).unwrap();
        assert_eq!(rate, 10_000);
    }

    #[test]
    fn read_during_execute_is_rejected() {
        let shared = ledger();
        let inner = shared.clone();
        let result = shared.execute(|_| Ok(inner.read(|o| o.sale_ids().len())));
        assert!(matches!(result, Ok(Err(LedgerError::Reentrancy))));
    }

    #[test]
    fn threads_serialize_through_the_lock() {
        let shared = ledger();
        let handles: Vec<_> = (0..4u64)
            .map(|i| {
                let handle = shared.clone();
                thread::spawn(move || {
                    handle.execute(|o| {
                        o.set_mana_rate("manager", &format!("user-{i}"), Some(1_000 * (i + 1)))
                    })
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap().unwrap();
        }
        let rates = shared
            .read(|o| {
                (0..4u64)
                    .map(|i| o.state().mana.rate_of(&format!("user-{i}")))
                    .collect::<Vec<_>>()
            })
            .unwrap();
        assert_eq!(rates, vec![1_000, 2_000, 3_000, 4_000]);
    }
}
