//! Per-name critical sections.
//!
//! The index lock serialises index mutations, but filesystem work for the
//! same name must not interleave either: a delete racing an update could
//! otherwise remove the file the update just re-indexed. Each operation
//! takes the lock for the name (or pair of names) it touches; operations on
//! distinct names run concurrently.
//!
//! Lock entries persist for the lifetime of the process.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Hands out one `RwLock` per canonical file name.
///
/// Mutating operations take the write side, reads take the read side.
#[derive(Debug, Default)]
pub struct NameLocks {
    locks: RwLock<HashMap<String, Arc<RwLock<()>>>>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock guarding `name`, creating it on first use.
    pub fn lock_for(&self, name: &str) -> Arc<RwLock<()>> {
        {
            let locks = self.locks.read();
            if let Some(lock) = locks.get(name) {
                return Arc::clone(lock);
            }
        }

        let mut locks = self.locks.write();
        Arc::clone(
            locks
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(RwLock::new(()))),
        )
    }

    /// Returns the locks for two distinct names, ordered by name so that
    /// every caller acquires them in the same sequence.
    ///
    /// Callers must pass distinct names; locking the same lock twice from
    /// one thread deadlocks.
    pub fn lock_pair(&self, a: &str, b: &str) -> (Arc<RwLock<()>>, Arc<RwLock<()>>) {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        (self.lock_for(first), self.lock_for(second))
    }
}
