//! Synchronization primitives for Inkling.
//!
//! The turn coordinator serializes all work for a single conversation behind
//! a per-key async mutex. Keys for different conversations never contend.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::debug;

/// Default interval between cleanup runs (1 hour).
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Default max idle age before a lock entry is considered stale (2 hours).
pub const DEFAULT_MAX_IDLE_AGE: Duration = Duration::from_secs(7200);

/// Internal storage: key to (lock, last_access_time).
type LockStorage = DashMap<String, (Arc<Mutex<()>>, Instant)>;

/// Per-key async mutex with automatic stale entry cleanup.
///
/// Lock objects are created lazily on first use and shared by all callers
/// with the same key. Waiters on one key are queued by the underlying tokio
/// mutex, so same-key critical sections run strictly one at a time while
/// different keys proceed concurrently. Entries that have not been touched
/// for a while are removed by a background sweep, bounding memory to the set
/// of recently active conversations.
#[derive(Clone)]
pub struct KeyedLocks {
    locks: Arc<LockStorage>,
}

impl KeyedLocks {
    /// Create a new empty lock collection.
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Create a new lock collection with an automatic cleanup task.
    ///
    /// Uses the default intervals (1 hour sweep, 2 hour max idle age).
    pub fn with_cleanup(name: &'static str) -> Self {
        let locks = Self::new();
        locks.clone().spawn_cleanup_task(name);
        locks
    }

    /// Acquire the lock for `key`, waiting until it is free.
    ///
    /// The returned guard releases the lock when dropped, on every exit path
    /// including panics and task cancellation. A panic while holding the
    /// guard does not poison the lock; the next `acquire` on the same key
    /// succeeds normally.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        self.lock_for(key).lock_owned().await
    }

    /// Get or create the shared lock object for `key`.
    ///
    /// Updates the last-access timestamp for cleanup tracking.
    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let now = Instant::now();
        self.locks
            .entry(key.to_string())
            .and_modify(|(_, last_access)| *last_access = now)
            .or_insert_with(|| (Arc::new(Mutex::new(())), now))
            .0
            .clone()
    }

    /// Remove stale entries that have not been accessed within `max_age`.
    ///
    /// An entry is only removed when nothing else holds a reference to its
    /// lock (strong_count == 1), so a long-running turn is never stranded.
    /// Returns the number of entries removed.
    pub fn cleanup_stale(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let stale_keys: Vec<_> = self
            .locks
            .iter()
            .filter(|entry| {
                let (lock, last_access) = entry.value();
                Arc::strong_count(lock) == 1 && now.duration_since(*last_access) > max_age
            })
            .map(|entry| entry.key().clone())
            .collect();

        let count = stale_keys.len();
        for key in stale_keys {
            self.locks.remove(&key);
        }
        count
    }

    /// Spawn a background task that periodically sweeps stale entries.
    pub fn spawn_cleanup_task(self, name: &'static str) {
        self.spawn_cleanup_task_with(DEFAULT_CLEANUP_INTERVAL, DEFAULT_MAX_IDLE_AGE, name);
    }

    /// Spawn a cleanup task with custom intervals.
    pub fn spawn_cleanup_task_with(
        self,
        interval: Duration,
        max_age: Duration,
        name: &'static str,
    ) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = self.cleanup_stale(max_age);
                if removed > 0 {
                    debug!(
                        removed = removed,
                        remaining = self.len(),
                        locks = name,
                        "Cleaned up stale session locks"
                    );
                }
            }
        });
    }

    /// Number of lock entries currently held.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// True if there are no lock entries.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Default for KeyedLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn same_key_serializes() {
        let locks = KeyedLocks::new();
        let guard = locks.acquire("alice:chat").await;

        let second = locks.lock_for("alice:chat");
        assert!(second.try_lock().is_err());

        drop(guard);
        assert!(second.try_lock().is_ok());
    }

    #[tokio::test]
    async fn different_keys_lock_concurrently() {
        let locks = KeyedLocks::new();
        let _a = locks.acquire("alice:chat").await;
        let b = locks.lock_for("bob:chat");
        assert!(b.try_lock().is_ok());
    }

    #[tokio::test]
    async fn critical_sections_never_overlap() {
        let locks = KeyedLocks::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("shared").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lock_survives_panicking_holder() {
        let locks = KeyedLocks::new();

        let task = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("unlucky").await;
                panic!("holder dies");
            })
        };
        assert!(task.await.is_err());

        // The guard was dropped during unwind; the key is usable again.
        let _guard = locks.acquire("unlucky").await;
    }

    #[tokio::test]
    async fn cleanup_removes_stale_entries() {
        let locks = KeyedLocks::new();

        let old_time = Instant::now() - Duration::from_secs(10);
        locks
            .locks
            .insert("stale".to_string(), (Arc::new(Mutex::new(())), old_time));
        drop(locks.acquire("fresh").await);

        assert_eq!(locks.len(), 2);
        let removed = locks.cleanup_stale(Duration::from_secs(5));
        assert_eq!(removed, 1);
        assert!(locks.locks.contains_key("fresh"));
        assert!(!locks.locks.contains_key("stale"));
    }

    #[tokio::test]
    async fn cleanup_preserves_entries_with_active_references() {
        let locks = KeyedLocks::new();

        let old_time = Instant::now() - Duration::from_secs(10);
        let lock = Arc::new(Mutex::new(()));
        locks
            .locks
            .insert("held".to_string(), (Arc::clone(&lock), old_time));
        let _held = Arc::clone(&lock);

        assert_eq!(locks.cleanup_stale(Duration::from_secs(5)), 0);
        assert_eq!(locks.len(), 1);
    }
}
