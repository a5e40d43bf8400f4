//! Leased run lock.
//!
//! At most one sentinel run may be live at a time. The lease lives in the
//! store with an expiry, so a crashed holder blocks new runs only until its
//! TTL elapses.
//!
//! ## Semantics
//!
//! - `acquire` succeeds iff no unexpired lease exists for the key
//! - expired leases are removed lazily, inside `acquire`
//! - `release` clears the lease whoever holds it

use crate::clock::Clock;
use crate::store::{ObjectStore, StoreResult};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Lock key held for the duration of a run.
pub const SENTINEL_RUNNING: &str = "SENTINEL_RUNNING";

/// A live lease.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Lease {
    pub key: String,
    pub owner_token: String,
    pub expires_at: i64,
}

#[derive(Clone)]
pub struct RunLock {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    owner_token: String,
}

impl RunLock {
    /// A lock handle with a fresh owner token.
    pub fn new(store: &ObjectStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool: store.pool().clone(),
            clock,
            owner_token: Uuid::new_v4().to_string(),
        }
    }

    pub fn owner_token(&self) -> &str {
        &self.owner_token
    }

    /// Take the lease for `ttl_secs`. Returns false, without touching the
    /// existing lease, if another unexpired lease holds `key`.
    pub async fn acquire(&self, key: &str, ttl_secs: i64) -> StoreResult<bool> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM run_locks WHERE key = ? AND expires_at <= ?")
            .bind(key)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            "INSERT OR IGNORE INTO run_locks (key, owner_token, expires_at) VALUES (?, ?, ?)",
        )
        .bind(key)
        .bind(&self.owner_token)
        .bind(now + ttl_secs)
        .execute(&mut *tx)
        .await?;
        let inserted = result.rows_affected() == 1;

        tx.commit().await?;
        debug!(key, acquired = inserted, expires_at = now + ttl_secs, "run lock");
        Ok(inserted)
    }

    pub async fn release(&self, key: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM run_locks WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        debug!(key, "run lock released");
        Ok(())
    }

    /// The unexpired lease on `key`, if any.
    pub async fn holder(&self, key: &str) -> StoreResult<Option<Lease>> {
        Ok(sqlx::query_as::<_, Lease>(
            "SELECT key, owner_token, expires_at FROM run_locks WHERE key = ? AND expires_at > ?",
        )
        .bind(key)
        .bind(self.clock.now())
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    async fn two_processes() -> (MockClock, RunLock, RunLock) {
        let store = ObjectStore::in_memory().await.unwrap();
        let clock = MockClock::new(1_000);
        let a = RunLock::new(&store, Arc::new(clock.clone()));
        let b = RunLock::new(&store, Arc::new(clock.clone()));
        (clock, a, b)
    }

    #[tokio::test]
    async fn test_second_acquire_fails_while_live() {
        let (_clock, a, b) = two_processes().await;

        assert!(a.acquire(SENTINEL_RUNNING, 90).await.unwrap());
        assert!(!b.acquire(SENTINEL_RUNNING, 90).await.unwrap());

        let lease = a.holder(SENTINEL_RUNNING).await.unwrap().unwrap();
        assert_eq!(lease.owner_token, a.owner_token());
        assert_eq!(lease.expires_at, 1_090);
    }

    #[tokio::test]
    async fn test_crashed_holder_expires_after_ttl() {
        let (clock, a, b) = two_processes().await;
        assert!(a.acquire(SENTINEL_RUNNING, 90).await.unwrap());

        clock.advance(89);
        assert!(!b.acquire(SENTINEL_RUNNING, 90).await.unwrap());

        clock.advance(2);
        assert!(b.acquire(SENTINEL_RUNNING, 90).await.unwrap());
        let lease = b.holder(SENTINEL_RUNNING).await.unwrap().unwrap();
        assert_eq!(lease.owner_token, b.owner_token());
    }

    #[tokio::test]
    async fn test_lease_expires_exactly_at_ttl() {
        let (clock, a, b) = two_processes().await;
        assert!(a.acquire(SENTINEL_RUNNING, 90).await.unwrap());

        clock.advance(90);
        assert!(a.holder(SENTINEL_RUNNING).await.unwrap().is_none());
        assert!(b.acquire(SENTINEL_RUNNING, 90).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_ignores_ownership() {
        let (_clock, a, b) = two_processes().await;
        assert!(a.acquire(SENTINEL_RUNNING, 90).await.unwrap());

        b.release(SENTINEL_RUNNING).await.unwrap();
        assert!(a.holder(SENTINEL_RUNNING).await.unwrap().is_none());
        assert!(b.acquire(SENTINEL_RUNNING, 90).await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let (_clock, a, b) = two_processes().await;
        assert!(a.acquire("one", 90).await.unwrap());
        assert!(b.acquire("two", 90).await.unwrap());
    }
}
