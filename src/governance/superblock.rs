//! Superblock candidate construction and its deterministic hash.
//!
//! The hash is the anchor two masternodes use to recognise that they built
//! the same candidate, so the canonical serialisation must never change:
//! sorted-key JSON with `", "` and `": "` separators, hex-encoded, then SHA-256.

use super::ranking::RankedProposal;
use super::types::{Amount, ObjectHash, ObjectType, Payment, Superblock};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Slack around a proposal's payment window, in seconds.
pub const EPOCH_FUDGE_SECS: i64 = 2 * 60 * 60;

/// Build the superblock this masternode would propose.
///
/// Returns `None` when nothing is payable: no ranked proposals, or none that
/// fit both `budget_max` and the superblock's epoch.
pub fn create_superblock(
    ranked: &[RankedProposal],
    event_block_height: u64,
    budget_max: Amount,
    sb_epoch_time: i64,
) -> Option<Superblock> {
    if ranked.is_empty() {
        debug!("no ranked proposals, not building a superblock");
        return None;
    }

    let mut allocated = Amount::ZERO;
    let mut payments = Vec::new();

    for entry in ranked {
        let proposal = &entry.proposal;
        let total = match allocated.checked_add(proposal.payment_amount) {
            Some(total) if total <= budget_max => total,
            _ => {
                debug!(object_hash = %entry.object_hash, "skipping proposal, over budget");
                continue;
            }
        };

        let window_start = proposal.start_epoch.saturating_sub(EPOCH_FUDGE_SECS);
        let window_end = proposal.end_epoch.saturating_add(EPOCH_FUDGE_SECS);
        if sb_epoch_time < window_start || sb_epoch_time > window_end {
            debug!(object_hash = %entry.object_hash, "skipping proposal, outside payment window");
            continue;
        }

        allocated = total;
        payments.push(Payment {
            address: proposal.payment_address.clone(),
            amount: proposal.payment_amount,
            proposal_hash: entry.object_hash.clone(),
        });
    }

    if payments.is_empty() {
        return None;
    }

    payments.sort_by(|a, b| a.proposal_hash.cmp(&b.proposal_hash));

    Some(Superblock {
        event_block_height,
        payments,
    })
}

impl Superblock {
    /// Sorted-key JSON body.
    pub fn canonical_json(&self) -> String {
        format!(
            "{{\"event_block_height\": {}, \"payment_addresses\": {}, \"payment_amounts\": {}, \"proposal_hashes\": {}, \"type\": {}}}",
            self.event_block_height,
            json_string(&self.payment_addresses()),
            json_string(&self.payment_amounts()),
            json_string(&self.proposal_hashes()),
            ObjectType::Superblock.code(),
        )
    }

    /// Hex form broadcast with `gobject_submit`.
    pub fn serialise(&self) -> String {
        hex::encode(self.canonical_json())
    }

    pub fn deterministic_hash(&self) -> ObjectHash {
        let digest: [u8; 32] = Sha256::digest(self.serialise().as_bytes()).into();
        ObjectHash::from_digest(&digest)
    }
}

fn json_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::types::Proposal;

    fn ranked(hash: &str, coins: u64, start: i64, end: i64) -> RankedProposal {
        RankedProposal {
            object_hash: ObjectHash::parse(hash).unwrap(),
            net_votes: 10,
            proposal: Proposal {
                name: format!("p{}", hash),
                url: "https://example.org".to_string(),
                payment_address: format!("addr{}", hash),
                payment_amount: Amount::from_coins(coins),
                start_epoch: start,
                end_epoch: end,
            },
        }
    }

    #[test]
    fn test_empty_list_builds_nothing() {
        assert!(create_superblock(&[], 1000, Amount::from_coins(100), 0).is_none());
    }

    #[test]
    fn test_payments_sorted_by_proposal_hash() {
        let list = vec![ranked("0b", 10, 0, 10_000), ranked("0a", 10, 0, 10_000)];
        let sb = create_superblock(&list, 1000, Amount::from_coins(100), 5_000).unwrap();

        assert_eq!(sb.payments.len(), 2);
        assert!(sb.payments[0].proposal_hash < sb.payments[1].proposal_hash);
    }

    #[test]
    fn test_epoch_window_with_fudge() {
        let list = vec![ranked("01", 10, 10_000, 20_000)];

        // Two hours before start is still inside the window.
        assert!(create_superblock(&list, 1, Amount::from_coins(100), 10_000 - EPOCH_FUDGE_SECS).is_some());
        assert!(create_superblock(&list, 1, Amount::from_coins(100), 10_000 - EPOCH_FUDGE_SECS - 1).is_none());
        assert!(create_superblock(&list, 1, Amount::from_coins(100), 20_000 + EPOCH_FUDGE_SECS).is_some());
        assert!(create_superblock(&list, 1, Amount::from_coins(100), 20_000 + EPOCH_FUDGE_SECS + 1).is_none());
    }

    #[test]
    fn test_budget_max_skips_expensive_proposal() {
        let list = vec![ranked("01", 100, 0, 10_000), ranked("02", 50, 0, 10_000)];
        let sb = create_superblock(&list, 1000, Amount::from_coins(120), 5_000).unwrap();

        assert_eq!(sb.payments.len(), 1);
        assert_eq!(sb.payments[0].amount, Amount::from_coins(100));
    }

    #[test]
    fn test_canonical_json_layout() {
        let list = vec![ranked("01", 10, 0, 10_000)];
        let sb = create_superblock(&list, 1000, Amount::from_coins(100), 5_000).unwrap();
        let hash = "0".repeat(63) + "1";

        assert_eq!(
            sb.canonical_json(),
            format!(
                "{{\"event_block_height\": 1000, \"payment_addresses\": \"addr01\", \"payment_amounts\": \"10.00000000\", \"proposal_hashes\": \"{}\", \"type\": 2}}",
                hash
            )
        );
    }

    #[test]
    fn test_deterministic_hash_stable_across_rebuilds() {
        let a = vec![ranked("01", 10, 0, 10_000), ranked("02", 20, 0, 10_000)];
        let b = vec![ranked("02", 20, 0, 10_000), ranked("01", 10, 0, 10_000)];

        let sb_a = create_superblock(&a, 1000, Amount::from_coins(100), 5_000).unwrap();
        let sb_b = create_superblock(&b, 1000, Amount::from_coins(100), 5_000).unwrap();

        assert_eq!(sb_a.deterministic_hash(), sb_b.deterministic_hash());
        assert_eq!(sb_a.deterministic_hash().as_str().len(), 64);
    }

    #[test]
    fn test_hash_changes_with_height() {
        let list = vec![ranked("01", 10, 0, 10_000)];
        let sb_a = create_superblock(&list, 1000, Amount::from_coins(100), 5_000).unwrap();
        let sb_b = create_superblock(&list, 1050, Amount::from_coins(100), 5_000).unwrap();

        assert_ne!(sb_a.deterministic_hash(), sb_b.deterministic_hash());
    }

    #[test]
    fn test_stored_payload_reproduces_hash() {
        let list = vec![ranked("01", 10, 0, 10_000)];
        let built = create_superblock(&list, 1000, Amount::from_coins(100), 5_000).unwrap();
        let reparsed = Superblock::from_payload(&built.canonical_json()).unwrap();

        assert_eq!(built.deterministic_hash(), reparsed.deterministic_hash());
    }
}
