//! Mirror the daemon's governance object list into the store.

use super::ObjectStore;
use crate::daemon::traits::RawGovernanceObject;
use crate::daemon::ChainDaemon;
use crate::error::SentinelResult;
use crate::governance::{GovernanceObject, GovernanceResult, ObjectBody, ObjectHash, ObjectType};
use tracing::{debug, info, warn};

/// Counts from one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub imported: usize,
    pub skipped: usize,
}

fn decode(raw: &RawGovernanceObject) -> GovernanceResult<GovernanceObject> {
    let object_type = ObjectType::from_code(raw.object_type)?;
    Ok(GovernanceObject {
        object_hash: ObjectHash::parse(&raw.hash)?,
        body: ObjectBody::parse(object_type, &raw.data_string)?,
        data_string: raw.data_string.clone(),
        absolute_yes_count: raw.absolute_yes_count,
        yes_count: raw.yes_count,
        no_count: raw.no_count,
        abstain_count: raw.abstain_count,
    })
}

impl ObjectStore {
    /// Import every object the daemon knows about, refreshing vote tallies
    /// of objects already stored.
    ///
    /// Objects that fail to decode are logged and skipped. Nothing is ever
    /// removed: an object the daemon has dropped stays in the store.
    pub async fn sync_from<D: ChainDaemon + ?Sized>(
        &self,
        daemon: &D,
        now: i64,
    ) -> SentinelResult<SyncReport> {
        let raw_objects = daemon.governance_objects().await?;
        let mut report = SyncReport::default();

        for raw in &raw_objects {
            match decode(raw) {
                Ok(object) => {
                    self.upsert(&object, now).await?;
                    report.imported += 1;
                }
                Err(e) => {
                    warn!(hash = %raw.hash, error = %e, "skipping malformed governance object");
                    report.skipped += 1;
                }
            }
        }

        debug!(total = raw_objects.len(), "governance objects fetched");
        info!(
            imported = report.imported,
            skipped = report.skipped,
            "synced governance objects"
        );
        Ok(report)
    }
}
