//! Keyed async mutexes.
//!
//! [`KeyedLocks`] hands out one `tokio::sync::Mutex` per key. Work on the same
//! key is serialized; work on different keys never contends beyond the brief
//! table lookup. Slots are created on first use and can be reclaimed with
//! [`KeyedLocks::prune`] once nobody holds or waits on them.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A table of async mutexes keyed by `K`.
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

/// Proof that the lock for `key` is held. Released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct KeyedGuard<K> {
    key: K,
    _permit: OwnedMutexGuard<()>,
}

impl<K> KeyedGuard<K> {
    /// The key this guard locks.
    pub const fn key(&self) -> &K {
        &self.key
    }
}

impl<K: fmt::Debug> fmt::Debug for KeyedGuard<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedGuard").field("key", &self.key).finish()
    }
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lock for `key`.
    pub async fn lock(&self, key: K) -> KeyedGuard<K> {
        let started = std::time::Instant::now();
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        let permit = slot.lock_owned().await;
        let waited = started.elapsed();
        metrics::histogram!("keyed_lock_wait_duration_seconds").record(waited.as_secs_f64());
        tracing::trace!(key = ?key, waited_us = waited.as_micros(), "Acquired keyed lock");

        KeyedGuard {
            key,
            _permit: permit,
        }
    }

    /// Drop slots that are neither held nor awaited. Returns how many were removed.
    pub async fn prune(&self) -> usize {
        let mut slots = self.slots.lock().await;
        let before = slots.len();
        // The table holds one reference; any other means a guard or waiter.
        slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        before - slots.len()
    }

    /// Number of slots currently allocated.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    /// Whether no slots are allocated.
    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            tasks.push(tokio::spawn(async move {
                let _guard = locks.lock("event-1").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let first = locks.lock(1_u32).await;

        let second = tokio::time::timeout(Duration::from_millis(100), locks.lock(2_u32)).await;
        assert!(second.is_ok());
        assert_eq!(*first.key(), 1);
    }

    #[tokio::test]
    async fn prune_keeps_held_slots() {
        let locks = KeyedLocks::new();
        let held = locks.lock("a").await;
        drop(locks.lock("b").await);

        assert_eq!(locks.len().await, 2);
        assert_eq!(locks.prune().await, 1);
        assert_eq!(locks.len().await, 1);

        drop(held);
        assert_eq!(locks.prune().await, 1);
        assert!(locks.is_empty().await);
    }
}
