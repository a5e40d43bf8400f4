//! One sentinel run, start to finish.
//!
//! Takes the run lock, checks the daemon is usable, consults the schedule,
//! syncs objects, prunes expired proposals, runs the superblock engine and
//! books the next run. The lock is released on every path out of
//! [`Sentinel::run_once`].

use crate::clock::Clock;
use crate::daemon::{ChainDaemon, ChainQueries, NetworkParams};
use crate::error::SentinelResult;
use crate::governance::proposal::{prune_expired_proposals, vote_validity};
use crate::governance::{MasternodeElection, ObjectType, SuperblockDecision, SuperblockEngine};
use crate::lock::{RunLock, SENTINEL_RUNNING};
use crate::schedule::ScheduleGate;
use crate::store::{CastOutcome, ObjectStore, VoteLedger};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-run switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Ignore the schedule and skip the jitter delay.
    pub bypass_scheduler: bool,
    /// Cast `valid` votes on every stored object.
    pub validity_votes: bool,
    pub lock_ttl_secs: i64,
    pub interval_secs: i64,
    pub max_jitter_secs: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            bypass_scheduler: false,
            validity_votes: false,
            lock_ttl_secs: 90,
            interval_secs: 600,
            max_jitter_secs: 60,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Another process holds an unexpired run lock.
    AlreadyRunning,
    /// `getgovernanceinfo` failed.
    DaemonUnreachable,
    NotSynced,
    NotMasternode,
    /// The schedule says not yet.
    NotScheduled,
    /// Full run; the superblock engine stopped here.
    Completed(SuperblockDecision),
    /// Full run, but the superblock attempt failed and was abandoned.
    Aborted { reason: String },
}

pub struct Sentinel<D> {
    daemon: D,
    store: ObjectStore,
    clock: Arc<dyn Clock>,
    params: NetworkParams,
    options: RunOptions,
    lock: RunLock,
    schedule: ScheduleGate,
    ledger: VoteLedger,
}

impl<D: ChainDaemon> Sentinel<D> {
    pub fn new(
        daemon: D,
        store: ObjectStore,
        clock: Arc<dyn Clock>,
        params: NetworkParams,
        options: RunOptions,
    ) -> Self {
        let lock = RunLock::new(&store, clock.clone());
        let schedule = ScheduleGate::new(
            &store,
            clock.clone(),
            options.interval_secs,
            options.max_jitter_secs,
        );
        let ledger = VoteLedger::new(&store, clock.clone());
        Self {
            daemon,
            store,
            clock,
            params,
            options,
            lock,
            schedule,
            ledger,
        }
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn ledger(&self) -> &VoteLedger {
        &self.ledger
    }

    pub fn schedule(&self) -> &ScheduleGate {
        &self.schedule
    }

    /// Drop the run lease; used on the signal path.
    pub async fn release_lock(&self) -> SentinelResult<()> {
        self.lock.release(SENTINEL_RUNNING).await?;
        Ok(())
    }

    pub async fn run_once(&self) -> SentinelResult<RunStatus> {
        if !self
            .lock
            .acquire(SENTINEL_RUNNING, self.options.lock_ttl_secs)
            .await?
        {
            debug!("an instance of sentinel is already running, aborting");
            return Ok(RunStatus::AlreadyRunning);
        }

        let result = self.run_locked().await;

        if let Err(e) = self.release_lock().await {
            warn!(error = %e, "failed to release run lock");
        }
        result
    }

    async fn run_locked(&self) -> SentinelResult<RunStatus> {
        if let Err(e) = self.daemon.governance_info().await {
            warn!(
                error = %e,
                "cannot connect to syscoind, ensure it is running and the JSON-RPC port is open"
            );
            return Ok(RunStatus::DaemonUnreachable);
        }

        if !self.daemon.is_synced().await? {
            warn!("syscoind not synced with network, awaiting full sync before running");
            return Ok(RunStatus::NotSynced);
        }

        match self.daemon.masternode_status().await? {
            Some(status) => {
                debug!(outpoint = %status.outpoint, state = %status.state, "masternode status");
            }
            None => {
                debug!("invalid masternode status, cannot continue");
                return Ok(RunStatus::NotMasternode);
            }
        }

        if self.options.bypass_scheduler {
            debug!("bypassing scheduler, clearing schedule");
            self.schedule.clear_schedule().await?;
        }

        if !self.schedule.is_run_time().await? {
            debug!("not yet time for an object sync/vote");
            return Ok(RunStatus::NotScheduled);
        }

        if !self.options.bypass_scheduler {
            self.schedule.delay().await;
        }
        self.schedule.clear_schedule().await?;

        self.store.sync_from(&self.daemon, self.clock.now()).await?;

        let chain = ChainQueries::new(&self.daemon, self.params, self.clock.as_ref());

        if self.options.validity_votes {
            self.check_object_validity().await?;
        }

        let boundary = chain.expiration_boundary().await?;
        let pruned =
            prune_expired_proposals(&self.store, &self.ledger, &self.daemon, boundary).await?;
        if pruned > 0 {
            info!(pruned, "voted delete on expired proposals");
        }

        let election = MasternodeElection::new(&chain);
        let engine = SuperblockEngine::new(&self.store, &self.ledger, &chain, &election);
        let status = match engine.attempt_superblock_creation().await {
            Ok(decision) => {
                debug!(?decision, "superblock attempt finished");
                RunStatus::Completed(decision)
            }
            Err(e) => {
                warn!(error = %e, "superblock attempt aborted");
                RunStatus::Aborted {
                    reason: e.to_string(),
                }
            }
        };

        self.schedule.schedule_next_run().await?;
        Ok(status)
    }

    /// Cast a `valid` vote on every stored proposal and superblock.
    async fn check_object_validity(&self) -> SentinelResult<usize> {
        let mut cast = 0;
        for object_type in [ObjectType::Proposal, ObjectType::Superblock] {
            for object in self.store.objects(object_type).await? {
                if vote_validity(&self.ledger, &self.daemon, &object).await?
                    == CastOutcome::Cast
                {
                    cast += 1;
                }
            }
        }
        debug!(cast, "validity votes");
        Ok(cast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::daemon::MockChainDaemon;
    use crate::governance::{VoteOutcome, VoteSignal};
    use crate::store::test_support::*;

    async fn sentinel(options: RunOptions) -> (Sentinel<MockChainDaemon>, MockChainDaemon, MockClock) {
        let daemon = MockChainDaemon::new();
        let store = ObjectStore::in_memory().await.unwrap();
        let clock = MockClock::new(0);
        let sentinel = Sentinel::new(
            daemon.clone(),
            store,
            Arc::new(clock.clone()),
            NetworkParams::testnet(),
            options,
        );
        (sentinel, daemon, clock)
    }

    fn no_jitter() -> RunOptions {
        RunOptions {
            max_jitter_secs: 0,
            ..RunOptions::default()
        }
    }

    #[tokio::test]
    async fn test_preflight_failures() {
        let (sentinel, daemon, _clock) = sentinel(no_jitter()).await;

        daemon.set_reachable(false);
        assert_eq!(sentinel.run_once().await.unwrap(), RunStatus::DaemonUnreachable);

        daemon.set_reachable(true);
        daemon.set_synced(false);
        assert_eq!(sentinel.run_once().await.unwrap(), RunStatus::NotSynced);

        daemon.set_synced(true);
        daemon.set_masternode(None);
        assert_eq!(sentinel.run_once().await.unwrap(), RunStatus::NotMasternode);
    }

    #[tokio::test]
    async fn test_schedule_gates_second_run() {
        let (sentinel, _daemon, clock) = sentinel(no_jitter()).await;

        assert_eq!(
            sentinel.run_once().await.unwrap(),
            RunStatus::Completed(SuperblockDecision::NoCandidate)
        );
        assert_eq!(sentinel.run_once().await.unwrap(), RunStatus::NotScheduled);

        clock.advance(600);
        assert!(matches!(
            sentinel.run_once().await.unwrap(),
            RunStatus::Completed(_)
        ));
    }

    #[tokio::test]
    async fn test_bypass_ignores_schedule() {
        let (sentinel, daemon, clock) = sentinel(no_jitter()).await;
        sentinel.schedule().schedule_next_run().await.unwrap();
        assert_eq!(sentinel.run_once().await.unwrap(), RunStatus::NotScheduled);

        let bypassing = Sentinel::new(
            daemon,
            sentinel.store().clone(),
            Arc::new(clock),
            NetworkParams::testnet(),
            RunOptions {
                bypass_scheduler: true,
                ..no_jitter()
            },
        );
        assert!(matches!(
            bypassing.run_once().await.unwrap(),
            RunStatus::Completed(_)
        ));
    }

    #[tokio::test]
    async fn test_lock_released_after_run() {
        let (sentinel, _daemon, _clock) = sentinel(no_jitter()).await;
        sentinel.run_once().await.unwrap();

        let probe = RunLock::new(sentinel.store(), Arc::new(MockClock::new(0)));
        assert!(probe.holder(SENTINEL_RUNNING).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_already_running() {
        let (sentinel, _daemon, clock) = sentinel(no_jitter()).await;
        let other = RunLock::new(sentinel.store(), Arc::new(clock.clone()));
        assert!(other.acquire(SENTINEL_RUNNING, 90).await.unwrap());

        assert_eq!(sentinel.run_once().await.unwrap(), RunStatus::AlreadyRunning);
        assert!(other.holder(SENTINEL_RUNNING).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_proposals_pruned() {
        let (sentinel, daemon, clock) = sentinel(no_jitter()).await;
        clock.set(1_000_000);
        daemon.set_block_time(990, 1_000_000);
        sentinel
            .store()
            .upsert(&proposal(1, 0, 1, 100), 0)
            .await
            .unwrap();

        sentinel.run_once().await.unwrap();

        let votes = daemon.votes_cast();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].object_hash, hash(1));
        assert_eq!(votes[0].signal, VoteSignal::Delete);
        assert_eq!(votes[0].outcome, VoteOutcome::Yes);
    }

    #[tokio::test]
    async fn test_validity_votes_when_enabled() {
        let (sentinel, daemon, _clock) = sentinel(RunOptions {
            validity_votes: true,
            ..no_jitter()
        })
        .await;
        sentinel
            .store()
            .upsert(&proposal(1, 0, 1, 1_000_000), 0)
            .await
            .unwrap();

        sentinel.run_once().await.unwrap();

        assert!(daemon
            .votes_cast()
            .iter()
            .any(|v| v.signal == VoteSignal::Valid && v.outcome == VoteOutcome::Yes));
    }

    #[tokio::test]
    async fn test_validity_votes_not_recast_after_height_passes() {
        let (sentinel, daemon, clock) = sentinel(RunOptions {
            validity_votes: true,
            ..no_jitter()
        })
        .await;
        daemon.set_block_count(990);
        sentinel
            .store()
            .upsert(&superblock(0x10, 1000, &[1]), 0)
            .await
            .unwrap();

        sentinel.run_once().await.unwrap();
        daemon.set_block_count(1001);
        clock.advance(600);
        sentinel.run_once().await.unwrap();

        let valid: Vec<_> = daemon
            .votes_cast()
            .into_iter()
            .filter(|v| v.signal == VoteSignal::Valid)
            .collect();
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].outcome, VoteOutcome::Yes);
    }

    #[tokio::test]
    async fn test_engine_failure_still_reschedules() {
        let (sentinel, daemon, _clock) = sentinel(no_jitter()).await;
        sentinel
            .store()
            .upsert(&proposal(1, 5, 10, 1_000_000), 0)
            .await
            .unwrap();
        daemon.fail_call("submit_superblock");

        let status = sentinel.run_once().await.unwrap();

        assert!(matches!(status, RunStatus::Aborted { .. }));
        assert!(sentinel.schedule().next_run_at().await.unwrap().is_some());
    }
}
