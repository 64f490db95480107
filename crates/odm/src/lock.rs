//! Named reentrant locks
//!
//! Entity mutation and persistence serialize on a per-entity lock keyed
//! `"{model}:{id}"`. The lock is reentrant so a save cascading into hooks
//! that touch the same entity does not self-deadlock. Guards are owned,
//! which lets an entity hold its own guard across nested calls.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{RawMutex, RawThreadId, ReentrantMutex};

use crate::error::{OdmError, OdmResult};

pub type LockGuard = parking_lot::lock_api::ArcReentrantMutexGuard<RawMutex, RawThreadId, ()>;

/// Process-wide table of named locks. Locks are created on first use and
/// kept for the table's lifetime.
#[derive(Default)]
pub struct LockTable {
    locks: DashMap<String, Arc<ReentrantMutex<()>>>,
}

impl LockTable {
    pub fn new() -> Self {
        LockTable::default()
    }

    /// Block until the named lock is held, or until `timeout` elapses
    pub fn acquire(&self, key: &str, timeout: Option<Duration>) -> OdmResult<LockGuard> {
        let lock: Arc<ReentrantMutex<()>> = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(ReentrantMutex::new(())))
            .clone();

        match timeout {
            None => Ok(lock.lock_arc()),
            Some(timeout) => lock
                .try_lock_arc_for(timeout)
                .ok_or_else(|| OdmError::LockWaitExceeded(key.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reentrant_within_a_thread() {
        let table = LockTable::new();
        let a = table.acquire("note:1", None).unwrap();
        let b = table.acquire("note:1", None).unwrap();
        drop(a);
        drop(b);
    }

    #[test]
    fn timeout_when_held_elsewhere() {
        let table = Arc::new(LockTable::new());
        let guard = table.acquire("note:1", None).unwrap();

        let t = Arc::clone(&table);
        let handle = std::thread::spawn(move || {
            t.acquire("note:1", Some(Duration::from_millis(20)))
                .map(|_| ())
        });
        let result = handle.join().unwrap();
        assert!(matches!(result, Err(OdmError::LockWaitExceeded(_))));
        drop(guard);
    }

    #[test]
    fn distinct_keys_do_not_contend() {
        let table = Arc::new(LockTable::new());
        let _a = table.acquire("note:1", None).unwrap();

        let t = Arc::clone(&table);
        let handle = std::thread::spawn(move || {
            t.acquire("note:2", Some(Duration::from_millis(20)))
                .map(|_| ())
        });
        assert!(handle.join().unwrap().is_ok());
    }
}
