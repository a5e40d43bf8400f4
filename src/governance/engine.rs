//! Superblock decision procedure.
//!
//! Every participant rebuilds the same candidate from the same synced state.
//! It then either finds that candidate already on the network and votes for
//! it, or broadcasts it if elected. Each call walks the steps once and
//! reports where it stopped.

use super::election::Election;
use super::ranking::approved_and_ranked;
use super::superblock::create_superblock;
use super::types::{GovernanceObject, ObjectHash, ObjectType, VoteOutcome, VoteSignal};
use crate::daemon::{ChainDaemon, ChainQueries};
use crate::error::SentinelResult;
use crate::store::{CastOutcome, ObjectStore, VoteLedger};
use tracing::{debug, info};

/// Where one attempt stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuperblockDecision {
    /// We already voted `funding=yes` at this height. Competing superblocks
    /// we had not voted on got `funding=no`.
    AlreadyDecided {
        event_block_height: u64,
        down_voted: usize,
    },
    /// Too early in the cycle to build a candidate.
    AwaitingMaturity { event_block_height: u64 },
    /// Nothing fundable.
    NoCandidate,
    /// Our candidate is on the network; voted for the canonical record,
    /// `delete` on its duplicates and `funding=no` on competing superblocks.
    MatchFound {
        object_hash: ObjectHash,
        duplicates_deleted: usize,
        down_voted: usize,
    },
    /// We were elected and broadcast the candidate.
    Submitted { object_hash: ObjectHash },
    /// Not elected; waiting for the winner's broadcast.
    AwaitingNetwork { sb_hash: ObjectHash },
}

pub struct SuperblockEngine<'a, D: ?Sized> {
    store: &'a ObjectStore,
    ledger: &'a VoteLedger,
    chain: &'a ChainQueries<'a, D>,
    election: &'a dyn Election,
}

impl<'a, D: ChainDaemon + ?Sized> SuperblockEngine<'a, D> {
    pub fn new(
        store: &'a ObjectStore,
        ledger: &'a VoteLedger,
        chain: &'a ChainQueries<'a, D>,
        election: &'a dyn Election,
    ) -> Self {
        Self {
            store,
            ledger,
            chain,
            election,
        }
    }

    /// Have we already taken a funding or delete position on `object`?
    async fn has_position(&self, object: &GovernanceObject) -> SentinelResult<bool> {
        Ok(self
            .ledger
            .has_voted(&object.object_hash, VoteSignal::Funding)
            .await?
            || self
                .ledger
                .has_voted(&object.object_hash, VoteSignal::Delete)
                .await?)
    }

    /// `funding=no` on every superblock at `event_block_height` we hold no
    /// position on.
    async fn down_vote_competitors(&self, event_block_height: u64) -> SentinelResult<usize> {
        let daemon = self.chain.daemon();
        let mut down_voted = 0;
        for sb in self.store.superblocks_at_height(event_block_height).await? {
            if self.has_position(&sb).await? {
                continue;
            }
            let outcome = self
                .ledger
                .cast(daemon, &sb.object_hash, VoteSignal::Funding, VoteOutcome::No)
                .await?;
            if outcome == CastOutcome::Cast {
                down_voted += 1;
            }
        }
        Ok(down_voted)
    }

    pub async fn attempt_superblock_creation(&self) -> SentinelResult<SuperblockDecision> {
        let daemon = self.chain.daemon();
        let event_block_height = self.chain.next_superblock_height().await?;

        if self.ledger.is_voted_funding(event_block_height).await? {
            let down_voted = self.down_vote_competitors(event_block_height).await?;
            debug!(event_block_height, down_voted, "already voted funding at this height");
            return Ok(SuperblockDecision::AlreadyDecided {
                event_block_height,
                down_voted,
            });
        }

        if !self.chain.is_govobj_maturity_phase().await? {
            debug!(event_block_height, "not in maturity phase, will not attempt superblock");
            return Ok(SuperblockDecision::AwaitingMaturity { event_block_height });
        }

        let quorum = self.chain.governance_quorum().await?;
        let max_budget = self.chain.next_superblock_max_budget().await?;
        let proposals = self.store.objects(ObjectType::Proposal).await?;
        let ranked = approved_and_ranked(&proposals, quorum, max_budget);

        let budget_max = self
            .chain
            .get_superblock_budget_allocation(event_block_height)
            .await?;
        let sb_epoch_time = self.chain.block_height_to_epoch(event_block_height).await?;

        let Some(candidate) =
            create_superblock(&ranked, event_block_height, budget_max, sb_epoch_time)
        else {
            debug!(event_block_height, ranked = ranked.len(), "no superblock candidate");
            return Ok(SuperblockDecision::NoCandidate);
        };
        let sb_hash = candidate.deterministic_hash();

        if let Some(record) = self.store.find_highest_deterministic(&sb_hash).await? {
            self.ledger
                .cast(daemon, &record.object_hash, VoteSignal::Funding, VoteOutcome::Yes)
                .await?;

            let mut duplicates_deleted = 0;
            for dup in self.store.superblocks_with_hash(&sb_hash).await? {
                if dup.object_hash == record.object_hash || self.has_position(&dup).await? {
                    continue;
                }
                let outcome = self
                    .ledger
                    .cast(daemon, &dup.object_hash, VoteSignal::Delete, VoteOutcome::Yes)
                    .await?;
                if outcome == CastOutcome::Cast {
                    duplicates_deleted += 1;
                }
            }

            let down_voted = if self.ledger.is_voted_funding(event_block_height).await? {
                self.down_vote_competitors(event_block_height).await?
            } else {
                0
            };

            info!(
                object_hash = %record.object_hash,
                %sb_hash,
                duplicates_deleted,
                down_voted,
                "voted funding for superblock"
            );
            return Ok(SuperblockDecision::MatchFound {
                object_hash: record.object_hash,
                duplicates_deleted,
                down_voted,
            });
        }

        debug!(%sb_hash, "candidate superblock not found on the network");
        if !self.election.we_are_the_winner().await? {
            return Ok(SuperblockDecision::AwaitingNetwork { sb_hash });
        }

        let object_hash = daemon
            .submit_superblock(self.chain.now(), &candidate.serialise())
            .await?;
        info!(%object_hash, %sb_hash, event_block_height, "submitted superblock");
        Ok(SuperblockDecision::Submitted { object_hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::daemon::{MockChainDaemon, NetworkParams};
    use crate::store::test_support::*;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FixedElection(bool);

    #[async_trait]
    impl Election for FixedElection {
        async fn we_are_the_winner(&self) -> SentinelResult<bool> {
            Ok(self.0)
        }
    }

    struct Fixture {
        store: ObjectStore,
        ledger: VoteLedger,
        daemon: MockChainDaemon,
        clock: MockClock,
    }

    impl Fixture {
        async fn new() -> Self {
            let store = ObjectStore::in_memory().await.unwrap();
            let clock = MockClock::new(0);
            let ledger = VoteLedger::new(&store, Arc::new(clock.clone()));
            Self {
                store,
                ledger,
                daemon: MockChainDaemon::new(),
                clock,
            }
        }

        async fn attempt(&self, elected: bool) -> SuperblockDecision {
            let chain = ChainQueries::new(&self.daemon, NetworkParams::testnet(), &self.clock);
            let election = FixedElection(elected);
            SuperblockEngine::new(&self.store, &self.ledger, &chain, &election)
                .attempt_superblock_creation()
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_awaiting_maturity() {
        let f = Fixture::new().await;
        f.daemon.set_block_count(900);
        f.store.upsert(&proposal(1, 5, 10, 10_000), 0).await.unwrap();

        assert_eq!(
            f.attempt(true).await,
            SuperblockDecision::AwaitingMaturity {
                event_block_height: 1000
            }
        );
        assert!(f.daemon.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_no_candidate_without_proposals() {
        let f = Fixture::new().await;
        assert_eq!(f.attempt(true).await, SuperblockDecision::NoCandidate);
    }

    #[tokio::test]
    async fn test_submits_when_elected_then_votes_next_run() {
        let f = Fixture::new().await;
        f.store.upsert(&proposal(1, 5, 10, 10_000), 0).await.unwrap();

        let submitted = match f.attempt(true).await {
            SuperblockDecision::Submitted { object_hash } => object_hash,
            other => panic!("expected submission, got {:?}", other),
        };
        assert_eq!(f.daemon.submissions().len(), 1);

        f.store.sync_from(&f.daemon, 0).await.unwrap();
        assert_eq!(
            f.attempt(true).await,
            SuperblockDecision::MatchFound {
                object_hash: submitted.clone(),
                duplicates_deleted: 0,
                down_voted: 0
            }
        );
        assert_eq!(
            f.attempt(true).await,
            SuperblockDecision::AlreadyDecided {
                event_block_height: 1000,
                down_voted: 0
            }
        );
        assert_eq!(f.daemon.submissions().len(), 1);
        assert_eq!(f.daemon.votes_cast().len(), 1);
    }

    #[tokio::test]
    async fn test_awaiting_network_when_not_elected() {
        let f = Fixture::new().await;
        f.store.upsert(&proposal(1, 5, 10, 10_000), 0).await.unwrap();

        assert!(matches!(
            f.attempt(false).await,
            SuperblockDecision::AwaitingNetwork { .. }
        ));
        assert!(f.daemon.submissions().is_empty());
        assert!(f.daemon.votes_cast().is_empty());
    }

    #[tokio::test]
    async fn test_duplicates_deleted_and_highest_funded() {
        let f = Fixture::new().await;
        f.store.upsert(&proposal(1, 5, 10, 10_000), 0).await.unwrap();
        let low = superblock(0x10, 1000, &[1]);
        let high = superblock(0x20, 1000, &[1]);
        f.store.upsert(&low, 0).await.unwrap();
        f.store.upsert(&high, 0).await.unwrap();

        assert_eq!(
            f.attempt(false).await,
            SuperblockDecision::MatchFound {
                object_hash: high.object_hash.clone(),
                duplicates_deleted: 1,
                down_voted: 0
            }
        );
        let funding = f
            .ledger
            .vote_for(&high.object_hash, VoteSignal::Funding)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(funding.outcome, VoteOutcome::Yes);
        assert!(f
            .ledger
            .has_voted(&low.object_hash, VoteSignal::Delete)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_already_decided_down_votes_competitors_once() {
        let f = Fixture::new().await;
        let ours = superblock(0x10, 1000, &[1]);
        let rival = superblock(0x20, 1000, &[2]);
        f.store.upsert(&ours, 0).await.unwrap();
        f.ledger
            .record(&ours.object_hash, VoteSignal::Funding, VoteOutcome::Yes)
            .await
            .unwrap();
        f.store.upsert(&rival, 0).await.unwrap();

        assert_eq!(
            f.attempt(true).await,
            SuperblockDecision::AlreadyDecided {
                event_block_height: 1000,
                down_voted: 1
            }
        );
        assert_eq!(
            f.attempt(true).await,
            SuperblockDecision::AlreadyDecided {
                event_block_height: 1000,
                down_voted: 0
            }
        );

        let votes = f.daemon.votes_cast();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].object_hash, rival.object_hash);
        assert_eq!(votes[0].outcome, VoteOutcome::No);
    }

    #[tokio::test]
    async fn test_daemon_failure_aborts_attempt() {
        let f = Fixture::new().await;
        f.daemon.set_reachable(false);
        let chain = ChainQueries::new(&f.daemon, NetworkParams::testnet(), &f.clock);
        let election = FixedElection(true);
        let engine = SuperblockEngine::new(&f.store, &f.ledger, &chain, &election);

        assert!(engine.attempt_superblock_creation().await.is_err());
    }
}
