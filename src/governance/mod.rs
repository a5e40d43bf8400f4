//! Governance objects and the superblock decision procedure.
//!
//! - `types`: object model (proposals, superblocks, votes, amounts)
//! - `proposal`: expiration and structural validity
//! - `ranking`: quorum and budget filtered proposal ranking
//! - `superblock`: candidate builder and deterministic hash
//! - `election`: which masternode broadcasts the candidate
//! - `engine`: the per-cycle vote/submit state machine

pub mod election;
pub mod engine;
pub mod proposal;
pub mod ranking;
pub mod superblock;
pub mod types;

pub use election::{Election, MasternodeElection};
pub use engine::{SuperblockDecision, SuperblockEngine};
pub use proposal::InvalidObject;
pub use ranking::{approved_and_ranked, RankedProposal};
pub use superblock::create_superblock;
pub use types::{
    Amount, GovernanceObject, ObjectBody, ObjectHash, ObjectType, Payment, Proposal, Superblock,
    Vote, VoteOutcome, VoteSignal,
};

pub type GovernanceResult<T> = Result<T, GovernanceError>;

/// Errors decoding governance payloads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GovernanceError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Invalid object hash: {0}")]
    InvalidHash(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unknown object type: {0}")]
    UnknownObjectType(i64),
}
