//! Top-level error type for a sentinel run.

use crate::daemon::DaemonError;
use crate::governance::GovernanceError;
use crate::store::StoreError;

pub type SentinelResult<T> = Result<T, SentinelError>;

#[derive(Debug, thiserror::Error)]
pub enum SentinelError {
    #[error(transparent)]
    Daemon(#[from] DaemonError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Governance(#[from] GovernanceError),
}
