//! Chain daemon trait abstraction.
//!
//! Everything the sentinel needs from the node goes through [`ChainDaemon`]:
//! a JSON-RPC implementation for production and `MockChainDaemon` for tests.

use crate::governance::{Amount, ObjectHash, VoteOutcome, VoteSignal};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Daemon errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DaemonError {
    /// Daemon unreachable, connection refused, timeout.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The daemon answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    /// The daemon answered with something we could not interpret.
    #[error("Decode error: {0}")]
    Decode(String),
}

/// `getgovernanceinfo` subset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceInfo {
    #[serde(rename = "governanceminquorum")]
    pub min_quorum: i64,
    #[serde(rename = "superblockcycle")]
    pub superblock_cycle: u64,
    #[serde(rename = "nextsuperblock")]
    pub next_superblock: u64,
}

/// One entry of `gobject_list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawGovernanceObject {
    #[serde(rename = "Hash")]
    pub hash: String,
    #[serde(rename = "DataString")]
    pub data_string: String,
    #[serde(rename = "ObjectType")]
    pub object_type: i64,
    #[serde(rename = "AbsoluteYesCount", default)]
    pub absolute_yes_count: i64,
    #[serde(rename = "YesCount", default)]
    pub yes_count: i64,
    #[serde(rename = "NoCount", default)]
    pub no_count: i64,
    #[serde(rename = "AbstainCount", default)]
    pub abstain_count: i64,
}

/// Our own masternode as reported by `masternode_status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasternodeStatus {
    pub outpoint: String,
    pub state: String,
}

/// One entry of the masternode list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasternodeEntry {
    pub outpoint: String,
    pub status: String,
}

impl MasternodeEntry {
    pub fn is_enabled(&self) -> bool {
        self.status.eq_ignore_ascii_case("ENABLED")
    }
}

/// Best chainlock (`getbestchainlock`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLock {
    pub block_hash: String,
    pub height: u64,
}

/// Result of a vote broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteReceipt {
    pub success: bool,
    pub error: Option<String>,
}

impl VoteReceipt {
    pub fn accepted() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(reason.into()),
        }
    }

    /// The network already holds a recent vote from us on this signal.
    pub fn is_voting_too_often(&self) -> bool {
        self.error.as_deref().is_some_and(|e| {
            e.starts_with("time between votes is too soon")
                || e.contains("Masternode voting too often")
        })
    }
}

/// A vote the network has recorded for our masternode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkVote {
    pub signal: VoteSignal,
    pub outcome: VoteOutcome,
    pub time: i64,
}

/// Chain daemon abstraction.
///
/// All queries are pure reads of chain state except `vote` and
/// `submit_superblock`, which broadcast.
#[async_trait]
pub trait ChainDaemon: Send + Sync {
    /// `getgovernanceinfo`; also used as the connectivity probe.
    async fn governance_info(&self) -> DaemonResult<GovernanceInfo>;

    /// Whether the node has finished masternode/governance sync.
    async fn is_synced(&self) -> DaemonResult<bool>;

    /// `None` when this node is not running as a masternode.
    async fn masternode_status(&self) -> DaemonResult<Option<MasternodeStatus>>;

    async fn block_count(&self) -> DaemonResult<u64>;

    /// Block time at `height`, `None` if the block does not exist yet.
    async fn block_time(&self, height: u64) -> DaemonResult<Option<i64>>;

    async fn best_block_hash(&self) -> DaemonResult<String>;

    async fn best_chainlock(&self) -> DaemonResult<ChainLock>;

    async fn masternode_list(&self) -> DaemonResult<Vec<MasternodeEntry>>;

    async fn enabled_masternode_count(&self) -> DaemonResult<u64>;

    /// `getsuperblockbudget height`
    async fn superblock_budget(&self, height: u64) -> DaemonResult<Amount>;

    /// Full governance object list.
    async fn governance_objects(&self) -> DaemonResult<Vec<RawGovernanceObject>>;

    /// Broadcast a vote with the masternode key from the daemon config.
    async fn vote(
        &self,
        object_hash: &ObjectHash,
        signal: VoteSignal,
        outcome: VoteOutcome,
    ) -> DaemonResult<VoteReceipt>;

    /// Votes the network has recorded for `outpoint` on `object_hash`.
    async fn current_votes(
        &self,
        object_hash: &ObjectHash,
        outpoint: &str,
    ) -> DaemonResult<Vec<NetworkVote>>;

    /// Broadcast a superblock; returns the new object hash.
    async fn submit_superblock(&self, epoch: i64, data_hex: &str) -> DaemonResult<ObjectHash>;
}
