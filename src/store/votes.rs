//! Ledger of votes this masternode has cast.
//!
//! Every vote goes through [`VoteLedger::cast`], which consults the ledger
//! first so an identical vote is never broadcast twice, within a run or
//! across runs.

use super::{ObjectStore, StoreResult};
use crate::clock::Clock;
use crate::daemon::ChainDaemon;
use crate::error::SentinelResult;
use crate::governance::{ObjectHash, Vote, VoteOutcome, VoteSignal};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What `cast` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOutcome {
    /// Broadcast and recorded.
    Cast,
    /// Same outcome already recorded; nothing sent.
    Unchanged,
    /// Daemon refused because the network already holds our vote; the
    /// ledger was refreshed from the network's copy.
    Reconciled,
    /// Daemon refused for another reason; nothing recorded.
    Rejected,
}

#[derive(Debug, sqlx::FromRow)]
struct VoteRow {
    object_hash: String,
    signal: String,
    outcome: String,
    voted_at: i64,
}

impl TryFrom<VoteRow> for Vote {
    type Error = super::StoreError;

    fn try_from(row: VoteRow) -> StoreResult<Self> {
        Ok(Vote {
            object_hash: ObjectHash::parse(&row.object_hash)?,
            signal: row.signal.parse()?,
            outcome: row.outcome.parse()?,
            cast_at: row.voted_at,
        })
    }
}

#[derive(Clone)]
pub struct VoteLedger {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl VoteLedger {
    pub fn new(store: &ObjectStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool: store.pool().clone(),
            clock,
        }
    }

    pub async fn vote_for(
        &self,
        object_hash: &ObjectHash,
        signal: VoteSignal,
    ) -> StoreResult<Option<Vote>> {
        sqlx::query_as::<_, VoteRow>(
            "SELECT object_hash, signal, outcome, voted_at FROM votes \
             WHERE object_hash = ? AND signal = ?",
        )
        .bind(object_hash.as_str())
        .bind(signal.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(Vote::try_from)
        .transpose()
    }

    pub async fn has_voted(&self, object_hash: &ObjectHash, signal: VoteSignal) -> StoreResult<bool> {
        Ok(self.vote_for(object_hash, signal).await?.is_some())
    }

    /// Record a vote, replacing any earlier outcome for the same signal.
    pub async fn record(
        &self,
        object_hash: &ObjectHash,
        signal: VoteSignal,
        outcome: VoteOutcome,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO votes (object_hash, signal, outcome, voted_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(object_hash, signal) DO UPDATE SET \
                outcome = excluded.outcome, voted_at = excluded.voted_at",
        )
        .bind(object_hash.as_str())
        .bind(signal.as_str())
        .bind(outcome.as_str())
        .bind(self.clock.now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn votes(&self) -> StoreResult<Vec<Vote>> {
        sqlx::query_as::<_, VoteRow>(
            "SELECT object_hash, signal, outcome, voted_at FROM votes \
             ORDER BY object_hash, signal",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Vote::try_from)
        .collect()
    }

    /// Have we voted `funding=yes` on any superblock at `event_block_height`?
    pub async fn is_voted_funding(&self, event_block_height: u64) -> StoreResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM votes v \
             JOIN superblocks s ON s.object_hash = v.object_hash \
             WHERE s.event_block_height = ? AND v.signal = ? AND v.outcome = ?",
        )
        .bind(event_block_height as i64)
        .bind(VoteSignal::Funding.as_str())
        .bind(VoteOutcome::Yes.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Vote through the daemon unless the ledger already holds this outcome.
    ///
    /// A recorded vote with a different outcome is replaced only after the
    /// new vote is accepted.
    pub async fn cast<D: ChainDaemon + ?Sized>(
        &self,
        daemon: &D,
        object_hash: &ObjectHash,
        signal: VoteSignal,
        outcome: VoteOutcome,
    ) -> SentinelResult<CastOutcome> {
        if let Some(existing) = self.vote_for(object_hash, signal).await? {
            if existing.outcome == outcome {
                debug!(%object_hash, %signal, %outcome, "already voted, not re-voting");
                return Ok(CastOutcome::Unchanged);
            }
            debug!(%object_hash, %signal, old = %existing.outcome, new = %outcome, "replacing stale vote");
        }

        let receipt = daemon.vote(object_hash, signal, outcome).await?;
        if receipt.success {
            self.record(object_hash, signal, outcome).await?;
            info!(%object_hash, %signal, %outcome, "vote cast");
            return Ok(CastOutcome::Cast);
        }

        warn!(
            %object_hash,
            %signal,
            %outcome,
            error = receipt.error.as_deref().unwrap_or("unknown"),
            "vote rejected"
        );
        if receipt.is_voting_too_often() {
            self.sync_network_vote(daemon, object_hash, signal).await?;
            return Ok(CastOutcome::Reconciled);
        }
        Ok(CastOutcome::Rejected)
    }

    /// Copy the network's record of our latest vote on `signal` into the ledger.
    async fn sync_network_vote<D: ChainDaemon + ?Sized>(
        &self,
        daemon: &D,
        object_hash: &ObjectHash,
        signal: VoteSignal,
    ) -> SentinelResult<()> {
        let Some(status) = daemon.masternode_status().await? else {
            return Ok(());
        };
        let latest = daemon
            .current_votes(object_hash, &status.outpoint)
            .await?
            .into_iter()
            .filter(|v| v.signal == signal)
            .max_by_key(|v| v.time);

        if let Some(vote) = latest {
            debug!(%object_hash, %signal, outcome = %vote.outcome, "synced vote from network");
            self.record(object_hash, signal, vote.outcome).await?;
        }
        Ok(())
    }
}
