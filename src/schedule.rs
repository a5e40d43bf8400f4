//! Run scheduling.
//!
//! An external timer (cron) starts the sentinel far more often than it needs
//! to do work. The gate persists the next eligible run time so most starts
//! exit early, and sleeps a random jitter before working so masternodes
//! started by the same minute tick do not all hit the network together.

use crate::clock::Clock;
use crate::store::{ObjectStore, StoreResult};
use rand::Rng;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Upper bound on the pre-run jitter.
pub const MAX_JITTER_SECS: u64 = 60;

#[derive(Clone)]
pub struct ScheduleGate {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    interval_secs: i64,
    max_jitter_secs: u64,
}

impl ScheduleGate {
    /// `max_jitter_secs` is clamped to [`MAX_JITTER_SECS`].
    pub fn new(
        store: &ObjectStore,
        clock: Arc<dyn Clock>,
        interval_secs: i64,
        max_jitter_secs: u64,
    ) -> Self {
        Self {
            pool: store.pool().clone(),
            clock,
            interval_secs,
            max_jitter_secs: max_jitter_secs.min(MAX_JITTER_SECS),
        }
    }

    /// Persisted next run time; `None` means run now.
    pub async fn next_run_at(&self) -> StoreResult<Option<i64>> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT next_run_at FROM schedule WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn is_run_time(&self) -> StoreResult<bool> {
        let now = self.clock.now();
        let due = match self.next_run_at().await? {
            Some(next_run_at) => now >= next_run_at,
            None => true,
        };
        debug!(now, due, "schedule check");
        Ok(due)
    }

    /// Persist `now + interval` as the next eligible run and return it.
    pub async fn schedule_next_run(&self) -> StoreResult<i64> {
        let next_run_at = self.clock.now() + self.interval_secs;
        sqlx::query(
            "INSERT INTO schedule (id, next_run_at) VALUES (1, ?) \
             ON CONFLICT(id) DO UPDATE SET next_run_at = excluded.next_run_at",
        )
        .bind(next_run_at)
        .execute(&self.pool)
        .await?;
        debug!(next_run_at, "next run scheduled");
        Ok(next_run_at)
    }

    /// Make the next check eligible immediately.
    pub async fn clear_schedule(&self) -> StoreResult<()> {
        sqlx::query("DELETE FROM schedule WHERE id = 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Sleep a random `0..=max_jitter_secs` seconds; returns the time slept.
    pub async fn delay(&self) -> Duration {
        let secs = jitter_secs(&mut rand::thread_rng(), self.max_jitter_secs);
        let pause = Duration::from_secs(secs);
        debug!(secs, "delaying before run");
        tokio::time::sleep(pause).await;
        pause
    }
}

fn jitter_secs<R: Rng + ?Sized>(rng: &mut R, max_jitter_secs: u64) -> u64 {
    rng.gen_range(0..=max_jitter_secs)
}
