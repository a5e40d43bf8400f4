//! Proposal ranking for superblock construction.
//!
//! Every masternode must derive the same list from the same synced objects,
//! so the ordering is total: net votes descending, then object hash ascending.

use super::types::{Amount, GovernanceObject, ObjectHash, Proposal};

/// A proposal that cleared quorum and fits in the budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedProposal {
    pub object_hash: ObjectHash,
    pub net_votes: i64,
    pub proposal: Proposal,
}

/// Rank fundable proposals.
///
/// Proposals below `quorum` are dropped. The rest are walked in rank order
/// and kept while the running total stays within `max_budget`; one that would
/// overflow the cap is skipped and the walk continues with the next.
pub fn approved_and_ranked<'a, I>(objects: I, quorum: i64, max_budget: Amount) -> Vec<RankedProposal>
where
    I: IntoIterator<Item = &'a GovernanceObject>,
{
    let mut candidates: Vec<RankedProposal> = objects
        .into_iter()
        .filter(|obj| obj.absolute_yes_count >= quorum)
        .filter_map(|obj| {
            obj.as_proposal().map(|p| RankedProposal {
                object_hash: obj.object_hash.clone(),
                net_votes: obj.absolute_yes_count,
                proposal: p.clone(),
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.net_votes
            .cmp(&a.net_votes)
            .then_with(|| a.object_hash.cmp(&b.object_hash))
    });

    let mut allocated = Amount::ZERO;
    candidates
        .into_iter()
        .filter(|ranked| match allocated.checked_add(ranked.proposal.payment_amount) {
            Some(total) if total <= max_budget => {
                allocated = total;
                true
            }
            _ => false,
        })
        .collect()
}
