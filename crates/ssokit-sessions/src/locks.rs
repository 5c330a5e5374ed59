//! Sharded string-keyed lock tables.
//!
//! Every mutation of a given session (refresh, touch, revoke) runs under
//! the same lock so that concurrent operations never clobber each other's
//! writes, while unrelated sessions proceed in parallel; a second table
//! keyed by user ID serializes the per-user limit check during creation.
//! A fixed shard table keyed by a hash bounds memory regardless of key
//! count; two keys sharing a shard serialize, which is harmless for
//! correctness.

use tokio::sync::{Mutex, MutexGuard};

/// Default number of shards.
const DEFAULT_SHARDS: usize = 64;

/// Fixed-size table of async locks keyed by strings (session or user IDs).
#[derive(Debug)]
pub(crate) struct SessionLocks {
    shards: Vec<Mutex<()>>,
}

impl SessionLocks {
    /// Creates a lock table with the default shard count.
    pub(crate) fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Creates a lock table with a specific shard count.
    pub(crate) fn with_shards(shards: usize) -> Self {
        assert!(shards > 0, "shard count must be positive");
        Self {
            shards: (0..shards).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Acquires the lock guarding a key, waiting if another operation
    /// on the same key (or a shard neighbor) holds it.
    pub(crate) async fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        self.shards[self.shard_index(key)].lock().await
    }

    fn shard_index(&self, key: &str) -> usize {
        // FNV-1a; cheap and spreads both random session IDs and short
        // user IDs well enough.
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in key.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        (hash % self.shards.len() as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_shard_index_is_stable_and_in_range() {
        let locks = SessionLocks::with_shards(16);
        let idx = locks.shard_index("session-abc");
        assert_eq!(idx, locks.shard_index("session-abc"));
        assert!(idx < 16);
    }

    #[tokio::test]
    async fn test_same_session_serializes() {
        let locks = Arc::new(SessionLocks::new());
        let in_section = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let in_section = Arc::clone(&in_section);
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("same-session").await;
                // Exactly one task may be inside the critical section
                assert_eq!(in_section.fetch_add(1, Ordering::SeqCst), 0);
                tokio::task::yield_now().await;
                in_section.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_distinct_shards_do_not_block() {
        let locks = SessionLocks::with_shards(64);

        // Find a key hashing to a different shard than "session-a"
        let shard_a = locks.shard_index("session-a");
        let other = (0..)
            .map(|i| format!("session-{i}"))
            .find(|key| locks.shard_index(key) != shard_a)
            .unwrap();

        // Holding one shard's lock must not block the other
        let guard_a = locks.lock("session-a").await;
        let guard_b = locks.lock(&other).await;
        drop(guard_a);
        drop(guard_b);
    }
}
