//! Distributed lock over an object store path
//!
//! Holding the lock means having created the lock object. Creation is
//! conditional on the object being absent, and deletion is conditional on the
//! generation returned at creation, so at most one holder exists per path and a
//! holder can never delete somebody else's lock.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{RepoError, Result};
use crate::store::{Generation, ObjectStore};

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Proof of lock ownership
///
/// Must be handed back to [`RemoteLock::release_lock`].
#[must_use = "a lock that is never released blocks every other publisher until it goes stale"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    path: String,
    generation: Generation,
}

impl LockHandle {
    /// Object path of the lock
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Generation written when the lock was acquired
    pub fn generation(&self) -> Generation {
        self.generation
    }
}

/// Lock manager bound to one object store
#[derive(Clone)]
pub struct RemoteLock {
    store: Arc<dyn ObjectStore>,
}

impl RemoteLock {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Acquire the lock at `path`, waiting at most `max_wait`
    ///
    /// The lock object's body is `description`, so whoever finds the lock held
    /// can tell who holds it. Retries with exponential backoff; errors other than
    /// "already exists" are logged and retried too.
    pub async fn wait_for_lock(
        &self,
        path: &str,
        description: &str,
        max_wait: Duration,
    ) -> Result<LockHandle> {
        let start = Instant::now();
        let deadline = start + max_wait;
        let mut delay = INITIAL_BACKOFF;

        loop {
            match self
                .store
                .create_if_absent(path, description.as_bytes())
                .await
            {
                Ok(generation) => {
                    tracing::info!(path, generation, "acquired lock");
                    return Ok(LockHandle {
                        path: path.to_string(),
                        generation,
                    });
                }
                Err(RepoError::PreconditionFailed { .. }) => {
                    tracing::debug!(path, "lock is held, waiting");
                }
                Err(e) => {
                    tracing::warn!(path, error = %e, "failed to create lock, retrying");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(RepoError::LockTimeout {
                    path: path.to_string(),
                    waited: now - start,
                });
            }
            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = (delay * 2).min(MAX_BACKOFF);
        }
    }

    /// Release a lock acquired by [`wait_for_lock`](Self::wait_for_lock)
    ///
    /// A lock that was meanwhile deleted or replaced is left alone and only
    /// reported.
    pub async fn release_lock(&self, handle: LockHandle) -> Result<()> {
        match self
            .store
            .delete_if_generation(&handle.path, handle.generation)
            .await
        {
            Ok(()) => {
                tracing::info!(path = %handle.path, "released lock");
                Ok(())
            }
            Err(RepoError::PreconditionFailed { .. }) => {
                tracing::warn!(
                    path = %handle.path,
                    generation = handle.generation,
                    "lock was replaced by another holder, not releasing"
                );
                Ok(())
            }
            Err(RepoError::ObjectNotFound { .. }) => {
                tracing::warn!(path = %handle.path, "lock was already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Delete the lock at `path` if it is older than `stale_age`
    ///
    /// Returns true when a stale lock was removed.
    pub async fn delete_stale_lock_if_exists(&self, path: &str, stale_age: Duration) -> Result<bool> {
        let attrs = match self.store.attributes(path).await {
            Ok(attrs) => attrs,
            Err(RepoError::ObjectNotFound { .. }) => return Ok(false),
            Err(e) => return Err(e),
        };

        let age = (Utc::now() - attrs.created).to_std().unwrap_or_default();
        if age < stale_age {
            tracing::debug!(path, ?age, "lock is not stale");
            return Ok(false);
        }

        match self
            .store
            .delete_if_generation(path, attrs.generation)
            .await
        {
            Ok(()) => {
                tracing::warn!(path, ?age, "deleted stale lock");
                Ok(true)
            }
            Err(RepoError::PreconditionFailed { .. } | RepoError::ObjectNotFound { .. }) => {
                tracing::debug!(path, "stale lock changed before deletion");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const LOCK: &str = "stable/index.yaml.lock";

    fn lock() -> (MemoryStore, RemoteLock) {
        let store = MemoryStore::new();
        let lock = RemoteLock::new(Arc::new(store.clone()));
        (store, lock)
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let (store, lock) = lock();

        let handle = lock
            .wait_for_lock(LOCK, "publish by ci", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(handle.path(), LOCK);
        assert_eq!(store.get(LOCK).unwrap(), b"publish by ci");

        lock.release_lock(handle).await.unwrap();
        assert!(store.get(LOCK).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_held_lock_times_out() {
        let (store, lock) = lock();
        store.put(LOCK, "someone else");

        let max_wait = Duration::from_secs(2);
        let err = lock.wait_for_lock(LOCK, "me", max_wait).await.unwrap_err();

        let RepoError::LockTimeout { path, waited } = &err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(path, LOCK);
        assert!(*waited >= max_wait);
        assert!(*waited < max_wait + Duration::from_millis(100));
        assert!(err.is_lock_timeout());

        // backoff 100, 200, 400, 800, then the remaining 500ms
        assert_eq!(store.operation_counts().creates, 6);
        assert_eq!(store.get(LOCK).unwrap(), b"someone else");
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_capped() {
        let (store, lock) = lock();
        store.put(LOCK, "someone else");

        let _ = lock
            .wait_for_lock(LOCK, "me", Duration::from_secs(60))
            .await
            .unwrap_err();

        // 8 attempts up to 12.7s, then every 10s, then one at the deadline
        assert_eq!(store.operation_counts().creates, 13);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let (store, lock) = lock();
        store.fail_next_creates(3);

        let handle = lock
            .wait_for_lock(LOCK, "me", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(store.operation_counts().creates, 4);
        lock.release_lock(handle).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_acquires_after_release() {
        let (store, lock) = lock();
        let first = lock
            .wait_for_lock(LOCK, "first", Duration::ZERO)
            .await
            .unwrap();

        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move {
                lock.wait_for_lock(LOCK, "second", Duration::from_secs(30))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        lock.release_lock(first.clone()).await.unwrap();

        let second = waiter.await.unwrap().unwrap();
        assert_ne!(second.generation(), first.generation());
        assert_eq!(store.get(LOCK).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_release_with_stale_generation_is_benign() {
        let (store, lock) = lock();
        let handle = lock
            .wait_for_lock(LOCK, "me", Duration::ZERO)
            .await
            .unwrap();

        // Lock was swept and taken by someone else meanwhile
        store.put(LOCK, "someone else");

        lock.release_lock(handle).await.unwrap();
        assert_eq!(store.get(LOCK).unwrap(), b"someone else");
    }

    #[tokio::test]
    async fn test_release_missing_lock_is_benign() {
        let (store, lock) = lock();
        let handle = lock
            .wait_for_lock(LOCK, "me", Duration::ZERO)
            .await
            .unwrap();
        let generation = store.attributes(LOCK).await.unwrap().generation;
        store.delete_if_generation(LOCK, generation).await.unwrap();

        lock.release_lock(handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_lock_is_deleted() {
        let (store, lock) = lock();
        store.put(LOCK, "crashed publisher");
        store.backdate(LOCK, Duration::from_secs(2 * 3600));

        let deleted = lock
            .delete_stale_lock_if_exists(LOCK, Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(deleted);
        assert!(store.get(LOCK).is_none());
    }

    #[tokio::test]
    async fn test_young_lock_is_kept() {
        let (store, lock) = lock();
        store.put(LOCK, "active publisher");
        store.backdate(LOCK, Duration::from_secs(60));

        let deleted = lock
            .delete_stale_lock_if_exists(LOCK, Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(!deleted);
        assert!(store.get(LOCK).is_some());
    }

    #[tokio::test]
    async fn test_no_lock_to_sweep() {
        let (_store, lock) = lock();
        let deleted = lock
            .delete_stale_lock_if_exists(LOCK, Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(!deleted);
    }

    #[tokio::test]
    async fn test_stale_lock_replaced_before_sweep_is_kept() {
        let (store, lock) = lock();
        store.put(LOCK, "crashed publisher");
        store.backdate(LOCK, Duration::from_secs(7200));
        store.replace_before_delete(LOCK, "new publisher");

        let deleted = lock
            .delete_stale_lock_if_exists(LOCK, Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(!deleted);
        assert_eq!(store.get(LOCK).unwrap(), b"new publisher");
        assert_eq!(store.operation_counts().deletes, 1);
    }

    #[tokio::test]
    async fn test_stale_lock_released_before_sweep() {
        let (store, lock) = lock();
        store.put(LOCK, "slow publisher");
        store.backdate(LOCK, Duration::from_secs(7200));
        store.remove_before_delete(LOCK);

        let deleted = lock
            .delete_stale_lock_if_exists(LOCK, Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(!deleted);
        assert!(store.get(LOCK).is_none());
    }
}
