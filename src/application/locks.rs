use crate::domain::ids::SubscriptionId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable = Arc<Mutex<HashMap<SubscriptionId, Arc<AsyncMutex<()>>>>>;

/// One async mutex per subscription.
///
/// Operations touching a subscription hold its guard from the first read to
/// the last write, so two settlements of the same subscription never
/// interleave while unrelated subscriptions proceed in parallel. An entry is
/// dropped from the table once its last guard is released and nobody waits.
#[derive(Default)]
pub struct SubscriptionLocks {
    locks: LockTable,
}

impl SubscriptionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: SubscriptionId) -> SubscriptionGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(id).or_default().clone()
        };
        SubscriptionGuard {
            id,
            guard: Some(lock.lock_owned().await),
            locks: self.locks.clone(),
        }
    }

    /// Number of subscriptions currently held or waited on.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to one subscription, released on drop.
pub struct SubscriptionGuard {
    id: SubscriptionId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: LockTable,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Waiters clone the entry under this same lock, so a count of one
        // means the table holds the only reference.
        if locks
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(SubscriptionLocks::new());
        let guard = locks.acquire(SubscriptionId(1)).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(SubscriptionId(1)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = SubscriptionLocks::new();
        let _first = locks.acquire(SubscriptionId(1)).await;
        let _second = locks.acquire(SubscriptionId(2)).await;
    }

    #[tokio::test]
    async fn test_released_entries_are_removed() {
        let locks = Arc::new(SubscriptionLocks::new());
        for i in 0..100 {
            let _guard = locks.acquire(SubscriptionId(i)).await;
        }
        assert!(locks.is_empty());

        let held = locks.acquire(SubscriptionId(1)).await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(SubscriptionId(1)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Still waited on, so the entry survives the first release.
        drop(held);
        assert_eq!(locks.len(), 1);
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
