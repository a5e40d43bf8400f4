//! Which masternode broadcasts this cycle's superblock.
//!
//! Every participant evaluates the same function over the same chain state,
//! so at most one of them finds itself elected.

use crate::daemon::traits::MasternodeEntry;
use crate::daemon::{ChainDaemon, ChainQueries};
use crate::error::SentinelResult;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use tracing::debug;

/// Broadcast election capability.
#[async_trait]
pub trait Election: Send + Sync {
    /// True iff this participant must submit the candidate itself.
    async fn we_are_the_winner(&self) -> SentinelResult<bool>;
}

/// Election over the ENABLED masternode list, seeded by a recent block hash.
pub struct MasternodeElection<'a, D: ?Sized> {
    chain: &'a ChainQueries<'a, D>,
}

impl<'a, D: ChainDaemon + ?Sized> MasternodeElection<'a, D> {
    pub fn new(chain: &'a ChainQueries<'a, D>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl<'a, D: ChainDaemon + ?Sized> Election for MasternodeElection<'a, D> {
    async fn we_are_the_winner(&self) -> SentinelResult<bool> {
        let daemon = self.chain.daemon();
        let Some(status) = daemon.masternode_status().await? else {
            return Ok(false);
        };
        let block_hash = self.chain.election_block_hash().await?;
        let masternodes = daemon.masternode_list().await?;

        let winner = elect_masternode(&block_hash, &masternodes);
        debug!(
            %block_hash,
            winner = winner.unwrap_or("none"),
            ours = %status.outpoint,
            "masternode election"
        );
        Ok(winner == Some(status.outpoint.as_str()))
    }
}

fn digest(s: &str) -> [u8; 32] {
    Sha256::digest(s.as_bytes()).into()
}

/// `|a - b|` over big-endian 256-bit integers.
fn distance(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let (hi, lo) = match a.cmp(b) {
        Ordering::Less => (b, a),
        _ => (a, b),
    };
    let mut out = [0u8; 32];
    let mut borrow = 0i16;
    for i in (0..32).rev() {
        let mut d = hi[i] as i16 - lo[i] as i16 - borrow;
        if d < 0 {
            d += 256;
            borrow = 1;
        } else {
            borrow = 0;
        }
        out[i] = d as u8;
    }
    out
}

/// Outpoint of the ENABLED masternode closest to `block_hash`.
///
/// Equal distances go to the lower outpoint.
pub fn elect_masternode<'m>(block_hash: &str, masternodes: &'m [MasternodeEntry]) -> Option<&'m str> {
    let seed = digest(block_hash);
    masternodes
        .iter()
        .filter(|mn| mn.is_enabled())
        .map(|mn| (distance(&seed, &digest(&mn.outpoint)), mn.outpoint.as_str()))
        .min()
        .map(|(_, outpoint)| outpoint)
}
