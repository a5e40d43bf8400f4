//! Governance queries derived from raw daemon calls.

use super::traits::{ChainDaemon, DaemonResult};
use crate::clock::Clock;
use crate::governance::proposal::cycle_boundary;
use crate::governance::Amount;
use tracing::debug;

/// Per-network chain constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkParams {
    /// Blocks before a superblock during which funding is locked in.
    pub maturity_phase_delta: u64,
    /// Target seconds between blocks.
    pub block_spacing_secs: i64,
}

impl NetworkParams {
    pub fn mainnet() -> Self {
        Self {
            // ~3 days of 150 second blocks
            maturity_phase_delta: 1728,
            block_spacing_secs: 150,
        }
    }

    pub fn testnet() -> Self {
        Self {
            maturity_phase_delta: 24,
            block_spacing_secs: 150,
        }
    }

    pub fn for_network(name: &str) -> Self {
        match name {
            "mainnet" => Self::mainnet(),
            _ => Self::testnet(),
        }
    }

    pub fn blocks_to_seconds(&self, blocks: u64) -> i64 {
        blocks as i64 * self.block_spacing_secs
    }
}

/// Chain state views over a [`ChainDaemon`].
pub struct ChainQueries<'a, D: ?Sized> {
    daemon: &'a D,
    params: NetworkParams,
    clock: &'a dyn Clock,
}

impl<'a, D: ChainDaemon + ?Sized> ChainQueries<'a, D> {
    pub fn new(daemon: &'a D, params: NetworkParams, clock: &'a dyn Clock) -> Self {
        Self {
            daemon,
            params,
            clock,
        }
    }

    pub fn daemon(&self) -> &'a D {
        self.daemon
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub async fn superblock_cycle(&self) -> DaemonResult<u64> {
        Ok(self.daemon.governance_info().await?.superblock_cycle)
    }

    pub async fn next_superblock_height(&self) -> DaemonResult<u64> {
        Ok(self.daemon.governance_info().await?.next_superblock)
    }

    /// True once the chain is within `maturity_phase_delta` blocks of the
    /// next superblock.
    pub async fn is_govobj_maturity_phase(&self) -> DaemonResult<bool> {
        let event_block_height = self.next_superblock_height().await?;
        let current_height = self.daemon.block_count().await?;
        let maturity_start = event_block_height.saturating_sub(self.params.maturity_phase_delta);
        debug!(
            current_height,
            event_block_height, maturity_start, "maturity phase check"
        );
        Ok(current_height >= maturity_start)
    }

    /// `max(governanceminquorum, enabled masternodes / 10)`
    pub async fn governance_quorum(&self) -> DaemonResult<i64> {
        let min_quorum = self.daemon.governance_info().await?.min_quorum;
        let enabled = self.daemon.enabled_masternode_count().await? as i64;
        Ok(min_quorum.max(enabled / 10))
    }

    pub async fn get_superblock_budget_allocation(&self, height: u64) -> DaemonResult<Amount> {
        self.daemon.superblock_budget(height).await
    }

    /// Budget of the first cycle height after the current tip.
    pub async fn next_superblock_max_budget(&self) -> DaemonResult<Amount> {
        let cycle = self.superblock_cycle().await?.max(1);
        let current_height = self.daemon.block_count().await?;
        let next_height = (current_height / cycle) * cycle + cycle;
        self.get_superblock_budget_allocation(next_height).await
    }

    /// Block time if mined, otherwise an estimate from the block spacing.
    pub async fn block_height_to_epoch(&self, height: u64) -> DaemonResult<i64> {
        if let Some(time) = self.daemon.block_time(height).await? {
            return Ok(time);
        }
        let current_height = self.daemon.block_count().await?;
        let ahead = height.saturating_sub(current_height);
        Ok(self.clock.now() + self.params.blocks_to_seconds(ahead))
    }

    /// Epoch before which ended proposals are expired.
    pub async fn expiration_boundary(&self) -> DaemonResult<i64> {
        let cycle = self.superblock_cycle().await?;
        let current_height = self.daemon.block_count().await?;
        let current_epoch = self.block_height_to_epoch(current_height).await?;
        Ok(cycle_boundary(
            current_epoch,
            cycle,
            self.params.block_spacing_secs,
        ))
    }

    /// Block hash the masternode election is seeded from.
    ///
    /// Prefers the best chainlock; any failure there falls back to the best
    /// block hash.
    pub async fn election_block_hash(&self) -> DaemonResult<String> {
        match self.daemon.best_chainlock().await {
            Ok(lock) => {
                debug!(
                    height = lock.height,
                    block_hash = %lock.block_hash,
                    "seeding election from chainlock"
                );
                Ok(lock.block_hash)
            }
            Err(e) => {
                debug!(error = %e, "no chainlock, seeding election from best block");
                self.daemon.best_block_hash().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::daemon::mock::MockChainDaemon;
    use crate::daemon::traits::{ChainLock, GovernanceInfo, MasternodeEntry};

    fn info(next: u64) -> GovernanceInfo {
        GovernanceInfo {
            min_quorum: 3,
            superblock_cycle: 50,
            next_superblock: next,
        }
    }

    #[tokio::test]
    async fn test_maturity_phase_boundary() {
        let daemon = MockChainDaemon::new();
        daemon.set_governance_info(info(1000));
        let clock = MockClock::new(0);
        let chain = ChainQueries::new(&daemon, NetworkParams::testnet(), &clock);

        daemon.set_block_count(975);
        assert!(!chain.is_govobj_maturity_phase().await.unwrap());

        daemon.set_block_count(976);
        assert!(chain.is_govobj_maturity_phase().await.unwrap());
    }

    #[tokio::test]
    async fn test_quorum_scales_with_masternodes() {
        let daemon = MockChainDaemon::new();
        daemon.set_governance_info(info(1000));
        let clock = MockClock::new(0);
        let chain = ChainQueries::new(&daemon, NetworkParams::testnet(), &clock);

        assert_eq!(chain.governance_quorum().await.unwrap(), 3);

        let many = (0..100)
            .map(|i| MasternodeEntry {
                outpoint: format!("{:02x}-0", i),
                status: "ENABLED".to_string(),
            })
            .collect();
        daemon.set_masternodes(many);
        assert_eq!(chain.governance_quorum().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_next_superblock_max_budget_uses_next_cycle_height() {
        let daemon = MockChainDaemon::new();
        daemon.set_governance_info(info(1000));
        daemon.set_block_count(990);
        daemon.set_budget(1000, Amount::from_coins(77));
        let clock = MockClock::new(0);
        let chain = ChainQueries::new(&daemon, NetworkParams::testnet(), &clock);

        assert_eq!(
            chain.next_superblock_max_budget().await.unwrap(),
            Amount::from_coins(77)
        );
    }

    #[tokio::test]
    async fn test_block_height_to_epoch_estimates_future_blocks() {
        let daemon = MockChainDaemon::new();
        daemon.set_block_count(990);
        daemon.set_block_time(990, 5_000);
        let clock = MockClock::new(10_000);
        let chain = ChainQueries::new(&daemon, NetworkParams::testnet(), &clock);

        assert_eq!(chain.block_height_to_epoch(990).await.unwrap(), 5_000);
        assert_eq!(chain.block_height_to_epoch(1000).await.unwrap(), 10_000 + 1_500);
    }

    #[tokio::test]
    async fn test_expiration_boundary() {
        let daemon = MockChainDaemon::new();
        daemon.set_governance_info(info(1000));
        daemon.set_block_count(990);
        daemon.set_block_time(990, 100_000);
        let clock = MockClock::new(0);
        let chain = ChainQueries::new(&daemon, NetworkParams::testnet(), &clock);

        assert_eq!(
            chain.expiration_boundary().await.unwrap(),
            100_000 - 50 * 150
        );
    }

    #[tokio::test]
    async fn test_election_seed_falls_back_to_best_block() {
        let daemon = MockChainDaemon::new();
        daemon.set_best_block_hash("beef");
        let clock = MockClock::new(0);
        let chain = ChainQueries::new(&daemon, NetworkParams::testnet(), &clock);

        assert_eq!(chain.election_block_hash().await.unwrap(), "beef");

        daemon.set_chainlock(Some(ChainLock {
            block_hash: "cafe".to_string(),
            height: 980,
        }));
        assert_eq!(chain.election_block_hash().await.unwrap(), "cafe");
    }
}
