//! Local SQLite store.
//!
//! One database file holds the synced governance objects, the votes this
//! masternode has cast, the run lock lease and the schedule row. Only the
//! process holding the run lock writes to it.

pub mod sync;
pub mod votes;

pub use sync::SyncReport;
pub use votes::{CastOutcome, VoteLedger};

use crate::governance::{GovernanceError, GovernanceObject, ObjectBody, ObjectHash, ObjectType};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(#[from] GovernanceError),
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS governance_objects (
    object_hash TEXT PRIMARY KEY,
    object_type INTEGER NOT NULL,
    data_string TEXT NOT NULL,
    absolute_yes_count INTEGER NOT NULL DEFAULT 0,
    yes_count INTEGER NOT NULL DEFAULT 0,
    no_count INTEGER NOT NULL DEFAULT 0,
    abstain_count INTEGER NOT NULL DEFAULT 0,
    first_seen_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS proposals (
    object_hash TEXT PRIMARY KEY REFERENCES governance_objects(object_hash),
    start_epoch INTEGER NOT NULL,
    end_epoch INTEGER NOT NULL,
    payment_amount INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_proposals_end_epoch ON proposals(end_epoch);

CREATE TABLE IF NOT EXISTS superblocks (
    object_hash TEXT PRIMARY KEY REFERENCES governance_objects(object_hash),
    event_block_height INTEGER NOT NULL,
    sb_hash TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_superblocks_height ON superblocks(event_block_height);
CREATE INDEX IF NOT EXISTS idx_superblocks_sb_hash ON superblocks(sb_hash);

CREATE TABLE IF NOT EXISTS votes (
    object_hash TEXT NOT NULL,
    signal TEXT NOT NULL,
    outcome TEXT NOT NULL,
    voted_at INTEGER NOT NULL,
    PRIMARY KEY (object_hash, signal)
);

CREATE TABLE IF NOT EXISTS run_locks (
    key TEXT PRIMARY KEY,
    owner_token TEXT NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS schedule (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    next_run_at INTEGER NOT NULL
);
"#;

const OBJECT_COLUMNS: &str = "o.object_hash, o.object_type, o.data_string, o.absolute_yes_count, \
     o.yes_count, o.no_count, o.abstain_count";

#[derive(Debug, sqlx::FromRow)]
struct ObjectRow {
    object_hash: String,
    object_type: i64,
    data_string: String,
    absolute_yes_count: i64,
    yes_count: i64,
    no_count: i64,
    abstain_count: i64,
}

impl TryFrom<ObjectRow> for GovernanceObject {
    type Error = StoreError;

    fn try_from(row: ObjectRow) -> StoreResult<Self> {
        let object_type = ObjectType::from_code(row.object_type)?;
        Ok(GovernanceObject {
            object_hash: ObjectHash::parse(&row.object_hash)?,
            body: ObjectBody::parse(object_type, &row.data_string)?,
            data_string: row.data_string,
            absolute_yes_count: row.absolute_yes_count,
            yes_count: row.yes_count,
            no_count: row.no_count,
            abstain_count: row.abstain_count,
        })
    }
}

/// Typed access to synced governance objects.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    pool: SqlitePool,
}

impl ObjectStore {
    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Database(sqlx::Error::Io(e)))?;
            }
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Private in-memory database (tests).
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // Every connection to :memory: is its own database, so pin to one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> StoreResult<Self> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or refresh an object and its type-specific index row.
    pub async fn upsert(&self, object: &GovernanceObject, now: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO governance_objects \
                (object_hash, object_type, data_string, absolute_yes_count, yes_count, no_count, \
                 abstain_count, first_seen_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(object_hash) DO UPDATE SET \
                data_string = excluded.data_string, \
                absolute_yes_count = excluded.absolute_yes_count, \
                yes_count = excluded.yes_count, \
                no_count = excluded.no_count, \
                abstain_count = excluded.abstain_count, \
                updated_at = excluded.updated_at",
        )
        .bind(object.object_hash.as_str())
        .bind(object.object_type().code())
        .bind(&object.data_string)
        .bind(object.absolute_yes_count)
        .bind(object.yes_count)
        .bind(object.no_count)
        .bind(object.abstain_count)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        match &object.body {
            ObjectBody::Proposal(p) => {
                sqlx::query(
                    "INSERT OR REPLACE INTO proposals \
                        (object_hash, start_epoch, end_epoch, payment_amount) \
                     VALUES (?, ?, ?, ?)",
                )
                .bind(object.object_hash.as_str())
                .bind(p.start_epoch)
                .bind(p.end_epoch)
                .bind(p.payment_amount.as_sat() as i64)
                .execute(&mut *tx)
                .await?;
            }
            ObjectBody::Superblock(sb) => {
                sqlx::query(
                    "INSERT OR REPLACE INTO superblocks (object_hash, event_block_height, sb_hash) \
                     VALUES (?, ?, ?)",
                )
                .bind(object.object_hash.as_str())
                .bind(sb.event_block_height as i64)
                .bind(sb.deterministic_hash().as_str())
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get(&self, object_hash: &ObjectHash) -> StoreResult<Option<GovernanceObject>> {
        let sql = format!(
            "SELECT {} FROM governance_objects o WHERE o.object_hash = ?",
            OBJECT_COLUMNS
        );
        sqlx::query_as::<_, ObjectRow>(&sql)
            .bind(object_hash.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(GovernanceObject::try_from)
            .transpose()
    }

    async fn fetch_objects(&self, sql: &str, bind: Option<BindValue<'_>>) -> StoreResult<Vec<GovernanceObject>> {
        let query = sqlx::query_as::<_, ObjectRow>(sql);
        let query = match bind {
            Some(BindValue::Int(v)) => query.bind(v),
            Some(BindValue::Text(v)) => query.bind(v),
            None => query,
        };
        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(GovernanceObject::try_from)
            .collect()
    }

    /// All stored objects of one type, ordered by hash.
    pub async fn objects(&self, object_type: ObjectType) -> StoreResult<Vec<GovernanceObject>> {
        let sql = format!(
            "SELECT {} FROM governance_objects o WHERE o.object_type = ? ORDER BY o.object_hash",
            OBJECT_COLUMNS
        );
        self.fetch_objects(&sql, Some(BindValue::Int(object_type.code())))
            .await
    }

    /// Proposals whose `end_epoch` is before `cycle_boundary`.
    pub async fn expired_proposals(&self, cycle_boundary: i64) -> StoreResult<Vec<GovernanceObject>> {
        let sql = format!(
            "SELECT {} FROM governance_objects o \
             JOIN proposals p ON p.object_hash = o.object_hash \
             WHERE p.end_epoch < ? ORDER BY o.object_hash",
            OBJECT_COLUMNS
        );
        self.fetch_objects(&sql, Some(BindValue::Int(cycle_boundary)))
            .await
    }

    pub async fn superblocks_at_height(&self, height: u64) -> StoreResult<Vec<GovernanceObject>> {
        let sql = format!(
            "SELECT {} FROM governance_objects o \
             JOIN superblocks s ON s.object_hash = o.object_hash \
             WHERE s.event_block_height = ? ORDER BY o.object_hash",
            OBJECT_COLUMNS
        );
        self.fetch_objects(&sql, Some(BindValue::Int(height as i64)))
            .await
    }

    pub async fn superblocks_with_hash(&self, sb_hash: &ObjectHash) -> StoreResult<Vec<GovernanceObject>> {
        let sql = format!(
            "SELECT {} FROM governance_objects o \
             JOIN superblocks s ON s.object_hash = o.object_hash \
             WHERE s.sb_hash = ? ORDER BY o.object_hash",
            OBJECT_COLUMNS
        );
        self.fetch_objects(&sql, Some(BindValue::Text(sb_hash.as_str())))
            .await
    }

    /// Highest object hash among records carrying `sb_hash`.
    ///
    /// Object hashes are stored as zero-padded lowercase hex, so the text
    /// ordering here is the 256-bit numeric ordering.
    pub async fn find_highest_deterministic(
        &self,
        sb_hash: &ObjectHash,
    ) -> StoreResult<Option<GovernanceObject>> {
        Ok(self.superblocks_with_hash(sb_hash).await?.pop())
    }

    pub async fn count(&self) -> StoreResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM governance_objects")
            .fetch_one(&self.pool)
            .await?)
    }
}

enum BindValue<'a> {
    Int(i64),
    Text(&'a str),
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = ObjectStore::in_memory().await.unwrap();
        let p = proposal(1, 5, 10, 2_000);

        store.upsert(&p, 100).await.unwrap();
        let loaded = store.get(&p.object_hash).await.unwrap().unwrap();

        assert_eq!(loaded, p);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_refreshes_tallies() {
        let store = ObjectStore::in_memory().await.unwrap();
        let mut p = proposal(1, 5, 10, 2_000);
        store.upsert(&p, 100).await.unwrap();

        p.absolute_yes_count = 42;
        store.upsert(&p, 200).await.unwrap();

        let loaded = store.get(&p.object_hash).await.unwrap().unwrap();
        assert_eq!(loaded.absolute_yes_count, 42);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_proposals_boundary() {
        let store = ObjectStore::in_memory().await.unwrap();
        store.upsert(&proposal(1, 0, 1, 949), 0).await.unwrap();
        store.upsert(&proposal(2, 0, 1, 999), 0).await.unwrap();
        store.upsert(&proposal(3, 0, 1, 1000), 0).await.unwrap();
        store.upsert(&proposal(4, 0, 1, 1001), 0).await.unwrap();
        store.upsert(&superblock(0x10, 1, &[1]), 0).await.unwrap();

        let expired: Vec<_> = store
            .expired_proposals(1000)
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.object_hash)
            .collect();

        assert_eq!(expired, vec![hash(1), hash(2)]);
    }

    #[tokio::test]
    async fn test_superblock_queries() {
        let store = ObjectStore::in_memory().await.unwrap();
        let a = superblock(0x10, 1000, &[1]);
        let b = superblock(0x20, 1000, &[1]);
        let c = superblock(0x30, 1000, &[2]);
        for sb in [&a, &b, &c] {
            store.upsert(sb, 0).await.unwrap();
        }

        assert_eq!(store.superblocks_at_height(1000).await.unwrap().len(), 3);
        assert!(store.superblocks_at_height(1050).await.unwrap().is_empty());

        let sb_hash = a.as_superblock().unwrap().deterministic_hash();
        let dups = store.superblocks_with_hash(&sb_hash).await.unwrap();
        assert_eq!(dups.len(), 2);

        let highest = store.find_highest_deterministic(&sb_hash).await.unwrap().unwrap();
        assert_eq!(highest.object_hash, b.object_hash);
    }

    #[tokio::test]
    async fn test_open_on_disk_persists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db").join("sentinel.db");

        {
            let store = ObjectStore::open(&path).await.unwrap();
            store.upsert(&proposal(7, 1, 1, 10), 0).await.unwrap();
            store.pool().close().await;
        }

        let store = ObjectStore::open(&path).await.unwrap();
        assert!(store.get(&hash(7)).await.unwrap().is_some());
    }
}
