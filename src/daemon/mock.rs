//! Mock chain daemon for testing.
//!
//! Holds a scripted chain state and records every broadcast so tests can
//! assert on exactly which votes and submissions went out.

use super::traits::*;
use crate::governance::{Amount, ObjectHash, VoteOutcome, VoteSignal};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// A vote the mock received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastVote {
    pub object_hash: ObjectHash,
    pub signal: VoteSignal,
    pub outcome: VoteOutcome,
}

/// Mock chain daemon.
#[derive(Clone)]
pub struct MockChainDaemon {
    state: Arc<Mutex<MockState>>,
}

struct MockState {
    reachable: bool,
    synced: bool,
    governance_info: GovernanceInfo,
    masternode: Option<MasternodeStatus>,
    masternodes: Vec<MasternodeEntry>,
    block_count: u64,
    block_times: HashMap<u64, i64>,
    best_block_hash: String,
    chainlock: Option<ChainLock>,
    default_budget: Amount,
    budgets: HashMap<u64, Amount>,
    objects: Vec<RawGovernanceObject>,
    vote_rejection: Option<String>,
    failing: HashSet<String>,
    network_votes: HashMap<ObjectHash, Vec<NetworkVote>>,
    votes_cast: Vec<CastVote>,
    submissions: Vec<(i64, String)>,
}

impl MockChainDaemon {
    /// Synced masternode at height 990, next superblock at 1000.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                reachable: true,
                synced: true,
                governance_info: GovernanceInfo {
                    min_quorum: 1,
                    superblock_cycle: 50,
                    next_superblock: 1000,
                },
                masternode: Some(MasternodeStatus {
                    outpoint: "aa-0".to_string(),
                    state: "READY".to_string(),
                }),
                masternodes: vec![MasternodeEntry {
                    outpoint: "aa-0".to_string(),
                    status: "ENABLED".to_string(),
                }],
                block_count: 990,
                block_times: HashMap::new(),
                best_block_hash: "00".repeat(32),
                chainlock: None,
                default_budget: Amount::from_coins(1_000),
                budgets: HashMap::new(),
                objects: Vec::new(),
                vote_rejection: None,
                failing: HashSet::new(),
                network_votes: HashMap::new(),
                votes_cast: Vec::new(),
                submissions: Vec::new(),
            })),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.with_state(|s| s.reachable = reachable);
    }

    pub fn set_synced(&self, synced: bool) {
        self.with_state(|s| s.synced = synced);
    }

    pub fn set_governance_info(&self, info: GovernanceInfo) {
        self.with_state(|s| s.governance_info = info);
    }

    pub fn set_masternode(&self, status: Option<MasternodeStatus>) {
        self.with_state(|s| s.masternode = status);
    }

    pub fn set_masternodes(&self, list: Vec<MasternodeEntry>) {
        self.with_state(|s| s.masternodes = list);
    }

    pub fn set_block_count(&self, height: u64) {
        self.with_state(|s| s.block_count = height);
    }

    pub fn set_block_time(&self, height: u64, time: i64) {
        self.with_state(|s| {
            s.block_times.insert(height, time);
        });
    }

    pub fn set_best_block_hash(&self, hash: &str) {
        self.with_state(|s| s.best_block_hash = hash.to_string());
    }

    pub fn set_chainlock(&self, lock: Option<ChainLock>) {
        self.with_state(|s| s.chainlock = lock);
    }

    pub fn set_budget(&self, height: u64, budget: Amount) {
        self.with_state(|s| {
            s.budgets.insert(height, budget);
        });
    }

    pub fn set_default_budget(&self, budget: Amount) {
        self.with_state(|s| s.default_budget = budget);
    }

    pub fn add_object(&self, object: RawGovernanceObject) {
        self.with_state(|s| s.objects.push(object));
    }

    /// Make every vote fail with `reason` until cleared with `None`.
    pub fn reject_votes(&self, reason: Option<&str>) {
        self.with_state(|s| s.vote_rejection = reason.map(str::to_string));
    }

    pub fn set_network_votes(&self, object_hash: ObjectHash, votes: Vec<NetworkVote>) {
        self.with_state(|s| {
            s.network_votes.insert(object_hash, votes);
        });
    }

    pub fn votes_cast(&self) -> Vec<CastVote> {
        self.with_state(|s| s.votes_cast.clone())
    }

    /// Submitted `(epoch, data_hex)` pairs.
    pub fn submissions(&self) -> Vec<(i64, String)> {
        self.with_state(|s| s.submissions.clone())
    }

    /// Make `method` (a `ChainDaemon` method name) fail with an RPC error.
    pub fn fail_call(&self, method: &str) {
        self.with_state(|s| {
            s.failing.insert(method.to_string());
        });
    }

    fn check(&self, method: &str) -> DaemonResult<()> {
        self.with_state(|s| {
            if !s.reachable {
                Err(DaemonError::Transport("connection refused".to_string()))
            } else if s.failing.contains(method) {
                Err(DaemonError::Rpc {
                    code: -1,
                    message: format!("{} failed", method),
                })
            } else {
                Ok(())
            }
        })
    }
}

impl Default for MockChainDaemon {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainDaemon for MockChainDaemon {
    async fn governance_info(&self) -> DaemonResult<GovernanceInfo> {
        self.check("governance_info")?;
        Ok(self.with_state(|s| s.governance_info.clone()))
    }

    async fn is_synced(&self) -> DaemonResult<bool> {
        self.check("is_synced")?;
        Ok(self.with_state(|s| s.synced))
    }

    async fn masternode_status(&self) -> DaemonResult<Option<MasternodeStatus>> {
        self.check("masternode_status")?;
        Ok(self.with_state(|s| s.masternode.clone()))
    }

    async fn block_count(&self) -> DaemonResult<u64> {
        self.check("block_count")?;
        Ok(self.with_state(|s| s.block_count))
    }

    async fn block_time(&self, height: u64) -> DaemonResult<Option<i64>> {
        self.check("block_time")?;
        Ok(self.with_state(|s| {
            if height > s.block_count {
                None
            } else {
                Some(s.block_times.get(&height).copied().unwrap_or(height as i64 * 150))
            }
        }))
    }

    async fn best_block_hash(&self) -> DaemonResult<String> {
        self.check("best_block_hash")?;
        Ok(self.with_state(|s| s.best_block_hash.clone()))
    }

    async fn best_chainlock(&self) -> DaemonResult<ChainLock> {
        self.check("best_chainlock")?;
        self.with_state(|s| s.chainlock.clone()).ok_or(DaemonError::Rpc {
            code: -32603,
            message: "Unable to find any chainlock".to_string(),
        })
    }

    async fn masternode_list(&self) -> DaemonResult<Vec<MasternodeEntry>> {
        self.check("masternode_list")?;
        Ok(self.with_state(|s| s.masternodes.clone()))
    }

    async fn enabled_masternode_count(&self) -> DaemonResult<u64> {
        self.check("enabled_masternode_count")?;
        Ok(self.with_state(|s| s.masternodes.iter().filter(|m| m.is_enabled()).count() as u64))
    }

    async fn superblock_budget(&self, height: u64) -> DaemonResult<Amount> {
        self.check("superblock_budget")?;
        Ok(self.with_state(|s| s.budgets.get(&height).copied().unwrap_or(s.default_budget)))
    }

    async fn governance_objects(&self) -> DaemonResult<Vec<RawGovernanceObject>> {
        self.check("governance_objects")?;
        Ok(self.with_state(|s| s.objects.clone()))
    }

    async fn vote(
        &self,
        object_hash: &ObjectHash,
        signal: VoteSignal,
        outcome: VoteOutcome,
    ) -> DaemonResult<VoteReceipt> {
        self.check("vote")?;
        Ok(self.with_state(|s| match &s.vote_rejection {
            Some(reason) => VoteReceipt::rejected(reason.clone()),
            None => {
                s.votes_cast.push(CastVote {
                    object_hash: object_hash.clone(),
                    signal,
                    outcome,
                });
                VoteReceipt::accepted()
            }
        }))
    }

    async fn current_votes(
        &self,
        object_hash: &ObjectHash,
        _outpoint: &str,
    ) -> DaemonResult<Vec<NetworkVote>> {
        self.check("current_votes")?;
        Ok(self.with_state(|s| s.network_votes.get(object_hash).cloned().unwrap_or_default()))
    }

    async fn submit_superblock(&self, epoch: i64, data_hex: &str) -> DaemonResult<ObjectHash> {
        self.check("submit_superblock")?;
        let digest: [u8; 32] = Sha256::digest(format!("{}:{}", epoch, data_hex).as_bytes()).into();
        let hash = ObjectHash::from_digest(&digest);

        let data_string = hex::decode(data_hex)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| DaemonError::Rpc {
                code: -32602,
                message: "invalid data hex".to_string(),
            })?;

        self.with_state(|s| {
            s.submissions.push((epoch, data_hex.to_string()));
            s.objects.push(RawGovernanceObject {
                hash: hash.to_string(),
                data_string,
                object_type: 2,
                absolute_yes_count: 0,
                yes_count: 0,
                no_count: 0,
                abstain_count: 0,
            });
        });
        Ok(hash)
    }
}
