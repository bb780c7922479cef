//! Locking discipline for the store
//!
//! Acquisition order is always: store lock, then user lock, then ledger
//! lock. Saves and ledger rebuilds hold the store lock shared; a reset holds
//! it exclusively, so no save can interleave with a reset.
//!
//! Listings take no lock. They check the reset epoch instead: the epoch is
//! odd while a reset is moving directories around and is bumped again when
//! it finishes, so a scan that saw the same even epoch before and after
//! cannot have overlapped a reset.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
pub struct StoreLocks {
    store: RwLock<()>,
    users: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    reset_epoch: AtomicU64,
}

impl StoreLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared access for operations that must not overlap a reset
    pub async fn shared(&self) -> RwLockReadGuard<'_, ()> {
        self.store.read().await
    }

    /// Exclusive access; waits for every in-flight save to finish
    pub async fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.store.write().await
    }

    /// Serialize submissions for one username
    ///
    /// Different usernames get different mutexes and never wait on each
    /// other. Entries nobody holds or waits on are dropped from the map.
    pub async fn user(&self, username: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut users = self.users.lock().unwrap_or_else(|p| p.into_inner());
            users.retain(|_, lock| Arc::strong_count(lock) > 1);
            users
                .entry(username.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Current reset epoch; odd while a reset is in progress
    pub fn reset_epoch(&self) -> u64 {
        self.reset_epoch.load(Ordering::SeqCst)
    }

    /// Mark a reset as in progress until the returned guard is dropped
    ///
    /// Call with the store lock held exclusively.
    pub fn begin_reset(&self) -> ResetEpochGuard<'_> {
        self.reset_epoch.fetch_add(1, Ordering::SeqCst);
        ResetEpochGuard {
            epoch: &self.reset_epoch,
        }
    }
}

/// Ends the reset epoch on drop, on success and failure alike
#[derive(Debug)]
pub struct ResetEpochGuard<'a> {
    epoch: &'a AtomicU64,
}

impl Drop for ResetEpochGuard<'_> {
    fn drop(&mut self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_distinct_users_do_not_block_each_other() {
        let locks = StoreLocks::new();
        let _alice = locks.user("alice").await;
        let bob = tokio::time::timeout(Duration::from_millis(100), locks.user("bob")).await;
        assert!(bob.is_ok());
    }

    #[tokio::test]
    async fn test_same_user_is_serialized() {
        let locks = StoreLocks::new();
        let _first = locks.user("alice").await;
        let second = tokio::time::timeout(Duration::from_millis(50), locks.user("alice")).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_exclusive_waits_for_shared() {
        let locks = StoreLocks::new();
        let _save = locks.shared().await;
        let reset = tokio::time::timeout(Duration::from_millis(50), locks.exclusive()).await;
        assert!(reset.is_err());
    }

    #[tokio::test]
    async fn test_released_user_locks_are_pruned() {
        let locks = StoreLocks::new();
        for i in 0..50 {
            drop(locks.user(&format!("user{}", i)).await);
        }
        let held = locks.user("alice").await;
        assert_eq!(locks.users.lock().unwrap().len(), 1);

        // A held lock survives pruning
        drop(locks.user("bob").await);
        assert!(locks.users.lock().unwrap().contains_key("alice"));
        drop(held);
    }

    #[test]
    fn test_reset_epoch_is_odd_only_during_reset() {
        let locks = StoreLocks::new();
        assert_eq!(locks.reset_epoch(), 0);
        {
            let _reset = locks.begin_reset();
            assert_eq!(locks.reset_epoch() % 2, 1);
        }
        assert_eq!(locks.reset_epoch(), 2);
    }
}
