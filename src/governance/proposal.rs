//! Proposal lifecycle: expiration pruning and validity voting.
//!
//! Expired proposals get a `delete=yes` vote; the object itself stays in the
//! store. Validity looks at object content only, so the verdict for a given
//! object hash never changes and never triggers a second broadcast.

use super::types::{
    Amount, GovernanceObject, ObjectBody, Proposal, Superblock, VoteOutcome, VoteSignal,
};
use crate::daemon::ChainDaemon;
use crate::error::SentinelResult;
use crate::store::{CastOutcome, ObjectStore, VoteLedger};
use std::collections::HashSet;
use tracing::{debug, info};

/// Longest accepted proposal name.
pub const MAX_NAME_LEN: usize = 40;

/// Longest accepted proposal URL.
pub const MAX_URL_LEN: usize = 255;

/// Start of the current disbursement window, in unix seconds.
///
/// A proposal whose `end_epoch` is before this boundary can no longer be
/// paid by any upcoming superblock. `end_epoch == boundary` is still live.
pub fn cycle_boundary(current_epoch: i64, cycle_blocks: u64, block_spacing_secs: i64) -> i64 {
    current_epoch - (cycle_blocks as i64) * block_spacing_secs
}

fn valid_address(address: &str) -> bool {
    !address.is_empty() && address.chars().all(|c| c.is_ascii_alphanumeric())
}

impl Proposal {
    pub fn check_validity(&self) -> Result<(), InvalidObject> {
        if self.name.is_empty()
            || self.name.len() > MAX_NAME_LEN
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(InvalidObject::Name(self.name.clone()));
        }
        if self.url.is_empty() || self.url.len() > MAX_URL_LEN || self.url.contains(char::is_whitespace)
        {
            return Err(InvalidObject::Url(self.url.clone()));
        }
        if !valid_address(&self.payment_address) {
            return Err(InvalidObject::PaymentAddress(self.payment_address.clone()));
        }
        if self.payment_amount == Amount::ZERO {
            return Err(InvalidObject::Amount(self.payment_amount));
        }
        if self.start_epoch >= self.end_epoch {
            return Err(InvalidObject::Window {
                start: self.start_epoch,
                end: self.end_epoch,
            });
        }
        Ok(())
    }
}

impl Superblock {
    pub fn check_validity(&self) -> Result<(), InvalidObject> {
        if self.event_block_height == 0 {
            return Err(InvalidObject::Height(self.event_block_height));
        }
        if self.payments.is_empty() {
            return Err(InvalidObject::NoPayments);
        }

        let mut seen = HashSet::new();
        let mut total = Amount::ZERO;
        for payment in &self.payments {
            if payment.amount == Amount::ZERO {
                return Err(InvalidObject::Amount(payment.amount));
            }
            if !valid_address(&payment.address) {
                return Err(InvalidObject::PaymentAddress(payment.address.clone()));
            }
            if !seen.insert(&payment.proposal_hash) {
                return Err(InvalidObject::DuplicatePayment(
                    payment.proposal_hash.to_string(),
                ));
            }
            total = total
                .checked_add(payment.amount)
                .ok_or(InvalidObject::Amount(payment.amount))?;
        }
        Ok(())
    }
}

impl ObjectBody {
    pub fn check_validity(&self) -> Result<(), InvalidObject> {
        match self {
            ObjectBody::Proposal(p) => p.check_validity(),
            ObjectBody::Superblock(sb) => sb.check_validity(),
        }
    }
}

/// Why an object fails its structural check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidObject {
    #[error("invalid name '{0}'")]
    Name(String),

    #[error("invalid url '{0}'")]
    Url(String),

    #[error("invalid payment address '{0}'")]
    PaymentAddress(String),

    #[error("amount {0} out of range")]
    Amount(Amount),

    #[error("start epoch {start} is not before end epoch {end}")]
    Window { start: i64, end: i64 },

    #[error("invalid event block height {0}")]
    Height(u64),

    #[error("superblock has no payments")]
    NoPayments,

    #[error("proposal {0} paid twice")]
    DuplicatePayment(String),
}

/// Cast `delete=yes` on every stored proposal that ended before `cycle_boundary`.
///
/// Returns how many new votes reached the network. Repeated runs are no-ops
/// for proposals already delete-voted.
pub async fn prune_expired_proposals<D: ChainDaemon + ?Sized>(
    store: &ObjectStore,
    ledger: &VoteLedger,
    daemon: &D,
    cycle_boundary: i64,
) -> SentinelResult<usize> {
    let expired = store.expired_proposals(cycle_boundary).await?;
    debug!(count = expired.len(), cycle_boundary, "expired proposals");

    let mut cast = 0;
    for proposal in &expired {
        let outcome = ledger
            .cast(daemon, &proposal.object_hash, VoteSignal::Delete, VoteOutcome::Yes)
            .await?;
        if outcome == CastOutcome::Cast {
            info!(object_hash = %proposal.object_hash, "voted delete on expired proposal");
            cast += 1;
        }
    }
    Ok(cast)
}

/// Cast `valid=yes` or `valid=no` on one object from its structural check.
pub async fn vote_validity<D: ChainDaemon + ?Sized>(
    ledger: &VoteLedger,
    daemon: &D,
    object: &GovernanceObject,
) -> SentinelResult<CastOutcome> {
    let outcome = match object.body.check_validity() {
        Ok(()) => VoteOutcome::Yes,
        Err(reason) => {
            debug!(object_hash = %object.object_hash, %reason, "object failed validity check");
            VoteOutcome::No
        }
    };
    ledger
        .cast(daemon, &object.object_hash, VoteSignal::Valid, outcome)
        .await
}
