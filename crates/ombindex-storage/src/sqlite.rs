//! SQLite indexing store.
//!
//! Persists blocks, bulletins, endorsements, tags, and the blacklist to a
//! single SQLite file. Uses `sqlx` with WAL mode so readers never block on
//! the single writer.
//!
//! # Usage
//! ```rust,no_run
//! use ombindex_core::StoreConfig;
//! use ombindex_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./ombuds.db", StoreConfig::default()).await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory(StoreConfig::default()).await?;
//! # Ok(())
//! # }
//! ```

use std::str::FromStr;

use async_trait::async_trait;
use bitcoin::Network;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use ombindex_core::error::IndexerError;
use ombindex_core::store::RecordStore;
use ombindex_core::types::{BlockRecord, BulletinRecord, EndorsementRecord, IndexedBlock};
use ombindex_core::StoreConfig;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS blocks (
        hash        TEXT    NOT NULL,
        prevhash    TEXT    UNIQUE NOT NULL,
        height      INTEGER UNIQUE NOT NULL,
        timestamp   INTEGER NOT NULL,
        version     INTEGER NOT NULL,
        merkleroot  TEXT    NOT NULL,
        difficulty  INTEGER NOT NULL,
        nonce       INTEGER NOT NULL,
        PRIMARY KEY (hash),
        FOREIGN KEY (prevhash) REFERENCES blocks(hash)
    );",
    "CREATE TABLE IF NOT EXISTS bulletins (
        txid        TEXT    NOT NULL,
        block       TEXT    NOT NULL,
        author      TEXT    NOT NULL,
        message     TEXT    NOT NULL,
        timestamp   INTEGER NOT NULL,
        latitude    REAL,
        longitude   REAL,
        height      REAL,
        PRIMARY KEY (txid),
        FOREIGN KEY (block) REFERENCES blocks(hash) ON DELETE CASCADE
    );",
    "CREATE TABLE IF NOT EXISTS endorsements (
        txid        TEXT    NOT NULL,
        block       TEXT    NOT NULL,
        bid         TEXT    NOT NULL,
        timestamp   INTEGER NOT NULL,
        author      TEXT    NOT NULL,
        PRIMARY KEY (txid),
        FOREIGN KEY (block) REFERENCES blocks(hash) ON DELETE CASCADE
    );",
    "CREATE TABLE IF NOT EXISTS tags (
        txid   TEXT NOT NULL,
        value  TEXT NOT NULL,
        FOREIGN KEY (txid) REFERENCES bulletins(txid) ON DELETE CASCADE
    );",
    "CREATE TABLE IF NOT EXISTS blacklist (
        txid    TEXT NOT NULL,
        reason  TEXT NOT NULL,
        PRIMARY KEY (txid)
    );",
    "CREATE INDEX IF NOT EXISTS idx_tags ON tags (value);",
    "CREATE INDEX IF NOT EXISTS idx_tags_txid ON tags (txid);",
    "CREATE INDEX IF NOT EXISTS idx_height ON blocks (height);",
    "CREATE INDEX IF NOT EXISTS idx_timestamp ON blocks (timestamp);",
    "CREATE INDEX IF NOT EXISTS idx_bulletins_block ON bulletins (block);",
    "CREATE INDEX IF NOT EXISTS idx_bulletins_author ON bulletins (author);",
    "CREATE INDEX IF NOT EXISTS idx_endorsements_block ON endorsements (block);",
    "CREATE INDEX IF NOT EXISTS idx_endorsements_bid ON endorsements (bid);",
];

pub(crate) const BLOCK_COLUMNS: &str =
    "hash, prevhash, height, timestamp, version, merkleroot, difficulty, nonce";

pub(crate) fn storage_err(e: sqlx::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

pub(crate) fn block_from_row(row: &SqliteRow) -> Result<BlockRecord, IndexerError> {
    Ok(BlockRecord {
        hash: row.try_get("hash").map_err(storage_err)?,
        prev_hash: row.try_get("prevhash").map_err(storage_err)?,
        height: row.try_get::<i64, _>("height").map_err(storage_err)? as u64,
        timestamp: row.try_get("timestamp").map_err(storage_err)?,
        version: row.try_get::<i64, _>("version").map_err(storage_err)? as i32,
        merkle_root: row.try_get("merkleroot").map_err(storage_err)?,
        bits: row.try_get::<i64, _>("difficulty").map_err(storage_err)? as u32,
        nonce: row.try_get::<i64, _>("nonce").map_err(storage_err)? as u32,
    })
}

/// SQLite-backed indexing store.
pub struct SqliteStorage {
    pub(crate) pool: SqlitePool,
    pub(crate) config: StoreConfig,
    pub(crate) peg: BlockRecord,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path` and seed the peg block.
    ///
    /// The path may be a plain file path (`"./ombuds.db"`) or a full
    /// SQLite URL (`"sqlite:./ombuds.db"`).
    pub async fn open(path: &str, config: StoreConfig) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}")
        };

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(storage_err)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(storage_err)?;

        Self::init(pool, config).await
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the pool is dropped. Ideal for tests.
    pub async fn in_memory(config: StoreConfig) -> Result<Self, IndexerError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(storage_err)?
            .foreign_keys(true);

        // Every connection to `:memory:` is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(storage_err)?;

        Self::init(pool, config).await
    }

    async fn init(pool: SqlitePool, config: StoreConfig) -> Result<Self, IndexerError> {
        let peg = config.validate()?;
        let storage = Self { pool, config, peg };
        storage.init_schema().await?;
        storage.seed_peg().await?;
        Ok(storage)
    }

    /// Create tables and indexes.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(storage_err)?;
        }
        Ok(())
    }

    /// Insert the peg block if the store is empty, and check an existing
    /// store was built on the same peg.
    ///
    /// The peg's parent is never stored, so its row is written with foreign
    /// key enforcement switched off on that one connection.
    async fn seed_peg(&self) -> Result<(), IndexerError> {
        let mut conn = self.pool.acquire().await.map_err(storage_err)?;

        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&mut *conn)
            .await
            .map_err(storage_err)?;
        let inserted = sqlx::query(&format!(
            "INSERT OR IGNORE INTO blocks ({BLOCK_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&self.peg.hash)
        .bind(&self.peg.prev_hash)
        .bind(self.peg.height as i64)
        .bind(self.peg.timestamp)
        .bind(self.peg.version as i64)
        .bind(&self.peg.merkle_root)
        .bind(self.peg.bits as i64)
        .bind(self.peg.nonce as i64)
        .execute(&mut *conn)
        .await;
        let enabled = sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&mut *conn)
            .await;
        if enabled.is_err() {
            conn.detach();
        } else {
            drop(conn);
        }
        let inserted = inserted.map_err(storage_err)?;
        enabled.map_err(storage_err)?;

        if inserted.rows_affected() > 0 {
            info!(hash = %self.peg.hash, height = self.peg.height, "Seeded peg block");
        }

        match find_block_by_height(&self.pool, self.peg.height).await? {
            Some(stored) if stored.hash == self.peg.hash => Ok(()),
            Some(stored) => Err(IndexerError::Config(format!(
                "store holds block {} at peg height {}, configured peg is {}",
                stored.hash, self.peg.height, self.peg.hash
            ))),
            None => Err(IndexerError::Config(format!(
                "store does not contain the peg height {}",
                self.peg.height
            ))),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The peg block as stored.
    pub fn peg(&self) -> &BlockRecord {
        &self.peg
    }

    // ─── Block writes ────────────────────────────────────────────────────────────

    /// Insert a block header with no records.
    pub async fn insert_block(&self, block: &BlockRecord) -> Result<(), IndexerError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        insert_header(&mut tx, block).await?;
        tx.commit().await.map_err(storage_err)?;
        debug!(hash = %block.hash, height = block.height, "block stored");
        Ok(())
    }

    /// Insert a block header, its bulletins (with tags), and its endorsements
    /// in one transaction.
    pub async fn insert_block_with_records(
        &self,
        indexed: &IndexedBlock,
    ) -> Result<(), IndexerError> {
        let block = &indexed.block;
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        insert_header(&mut tx, block).await?;
        for bulletin in &indexed.bulletins {
            insert_bulletin_row(&mut tx, bulletin).await?;
        }
        for endorsement in &indexed.endorsements {
            insert_endorsement_row(&mut tx, endorsement).await?;
        }

        tx.commit().await.map_err(storage_err)?;
        info!(
            hash = %block.hash,
            height = block.height,
            bulletins = indexed.bulletins.len(),
            endorsements = indexed.endorsements.len(),
            "Block committed"
        );
        Ok(())
    }

    /// Insert a single bulletin (and its tags) into an already-stored block.
    pub async fn insert_bulletin(&self, bulletin: &BulletinRecord) -> Result<(), IndexerError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        insert_bulletin_row(&mut tx, bulletin).await?;
        tx.commit().await.map_err(storage_err)
    }

    /// Insert a single endorsement into an already-stored block.
    pub async fn insert_endorsement(
        &self,
        endorsement: &EndorsementRecord,
    ) -> Result<(), IndexerError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        insert_endorsement_row(&mut tx, endorsement).await?;
        tx.commit().await.map_err(storage_err)
    }

    // ─── Rollback ────────────────────────────────────────────────────────────────

    /// Delete the tip block. Its bulletins, tags, and endorsements go with it.
    ///
    /// Fails with `NotTip` unless `hash` is the highest stored block and no
    /// stored block names it as parent.
    pub async fn delete_tip(&self, hash: &str) -> Result<(), IndexerError> {
        if hash == self.peg.hash {
            return Err(IndexerError::PegProtected { hash: hash.into() });
        }

        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        let is_tip: i64 = sqlx::query_scalar(
            "SELECT EXISTS(
                 SELECT 1 FROM blocks WHERE hash = ?1
                 AND height = (SELECT MAX(height) FROM blocks))
             AND NOT EXISTS(SELECT 1 FROM blocks WHERE prevhash = ?1)",
        )
        .bind(hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage_err)?;

        if is_tip == 0 {
            return Err(IndexerError::NotTip { hash: hash.into() });
        }

        sqlx::query("DELETE FROM blocks WHERE hash = ?")
            .bind(hash)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        tx.commit().await.map_err(storage_err)?;

        info!(hash, "Deleted tip block");
        Ok(())
    }

    /// Delete every block above `height`, cascading to their records.
    ///
    /// Unlike [`delete_tip`](Self::delete_tip) this does not re-check the
    /// tip invariant block by block; it is the bulk path for resyncing after
    /// a deep fork. Returns the number of blocks removed.
    pub async fn drop_after_height(&self, height: u64) -> Result<u64, IndexerError> {
        if height < self.peg.height {
            return Err(IndexerError::PegProtected {
                hash: self.peg.hash.clone(),
            });
        }

        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        let removed = sqlx::query("DELETE FROM blocks WHERE height > ?")
            .bind(height as i64)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?
            .rows_affected();
        tx.commit().await.map_err(storage_err)?;

        info!(height, removed, "Dropped blocks above height");
        Ok(removed)
    }

    // ─── Chain reads ─────────────────────────────────────────────────────────────

    /// The block with the greatest height.
    pub async fn current_tip(&self) -> Result<BlockRecord, IndexerError> {
        let row = sqlx::query(&format!(
            "SELECT {BLOCK_COLUMNS} FROM blocks ORDER BY height DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        match row {
            Some(row) => block_from_row(&row),
            None => Err(IndexerError::not_found("chain tip")),
        }
    }

    /// Height of the stored block `hash`.
    ///
    /// The peg's parent is never stored but is answered as `peg height - 1`,
    /// so ranges can be expressed down to and including the peg. Under a
    /// genesis peg that height is `-1`.
    pub async fn find_height(&self, hash: &str) -> Result<i64, IndexerError> {
        if hash == self.peg.prev_hash {
            return Ok(self.peg.height as i64 - 1);
        }

        let height: Option<i64> = sqlx::query_scalar("SELECT height FROM blocks WHERE hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        height.ok_or_else(|| IndexerError::not_found(format!("block {hash}")))
    }

    /// Hash of the stored block at `height`, if any.
    pub async fn block_hash_at(&self, height: u64) -> Result<Option<String>, IndexerError> {
        sqlx::query_scalar("SELECT hash FROM blocks WHERE height = ?")
            .bind(height as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)
    }

    /// Total number of stored blocks, the peg included.
    pub async fn block_count(&self) -> Result<u64, IndexerError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blocks")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(count as u64)
    }

    // ─── Blacklist ───────────────────────────────────────────────────────────────

    /// Mark a bulletin as censored. Replaces any earlier reason.
    pub async fn censor(&self, txid: &str, reason: &str) -> Result<(), IndexerError> {
        sqlx::query("INSERT OR REPLACE INTO blacklist (txid, reason) VALUES (?, ?)")
            .bind(txid)
            .bind(reason)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        info!(txid, reason, "Bulletin censored");
        Ok(())
    }

    /// Lift censorship. Returns `false` if the bulletin wasn't censored.
    pub async fn uncensor(&self, txid: &str) -> Result<bool, IndexerError> {
        let removed = sqlx::query("DELETE FROM blacklist WHERE txid = ?")
            .bind(txid)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?
            .rows_affected();
        Ok(removed > 0)
    }
}

// ─── Row writers ─────────────────────────────────────────────────────────────

async fn find_block_by_height(
    pool: &SqlitePool,
    height: u64,
) -> Result<Option<BlockRecord>, IndexerError> {
    let row = sqlx::query(&format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE height = ?"))
        .bind(height as i64)
        .fetch_optional(pool)
        .await
        .map_err(storage_err)?;
    row.as_ref().map(block_from_row).transpose()
}

async fn insert_header(conn: &mut SqliteConnection, block: &BlockRecord) -> Result<(), IndexerError> {
    let parent_height: Option<i64> =
        sqlx::query_scalar("SELECT height FROM blocks WHERE hash = ?")
            .bind(&block.prev_hash)
            .fetch_optional(&mut *conn)
            .await
            .map_err(storage_err)?;

    let Some(parent_height) = parent_height else {
        return Err(IndexerError::UnknownParent {
            hash: block.hash.clone(),
            prev_hash: block.prev_hash.clone(),
        });
    };
    let expected = parent_height as u64 + 1;
    if block.height != expected {
        return Err(IndexerError::HeightMismatch {
            expected,
            got: block.height,
        });
    }

    sqlx::query(&format!(
        "INSERT INTO blocks ({BLOCK_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&block.hash)
    .bind(&block.prev_hash)
    .bind(block.height as i64)
    .bind(block.timestamp)
    .bind(block.version as i64)
    .bind(&block.merkle_root)
    .bind(block.bits as i64)
    .bind(block.nonce as i64)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            IndexerError::DuplicateBlock {
                hash: block.hash.clone(),
                height: block.height,
            }
        } else {
            storage_err(e)
        }
    })?;
    Ok(())
}

async fn insert_bulletin_row(
    conn: &mut SqliteConnection,
    bulletin: &BulletinRecord,
) -> Result<(), IndexerError> {
    let loc = bulletin.location;
    sqlx::query(
        "INSERT INTO bulletins (txid, block, author, message, timestamp, latitude, longitude, height)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&bulletin.txid)
    .bind(&bulletin.block_hash)
    .bind(&bulletin.author)
    .bind(&bulletin.message)
    .bind(bulletin.timestamp)
    .bind(loc.map(|l| l.lat))
    .bind(loc.map(|l| l.lon))
    .bind(loc.map(|l| l.altitude))
    .execute(&mut *conn)
    .await
    .map_err(|e| record_insert_err(e, &bulletin.txid, &bulletin.block_hash))?;

    for tag in bulletin.tags() {
        sqlx::query("INSERT INTO tags (txid, value) VALUES (?, ?)")
            .bind(&bulletin.txid)
            .bind(&tag)
            .execute(&mut *conn)
            .await
            .map_err(storage_err)?;
    }

    debug!(txid = %bulletin.txid, block = %bulletin.block_hash, "bulletin stored");
    Ok(())
}

async fn insert_endorsement_row(
    conn: &mut SqliteConnection,
    endorsement: &EndorsementRecord,
) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO endorsements (txid, block, bid, timestamp, author) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&endorsement.txid)
    .bind(&endorsement.block_hash)
    .bind(&endorsement.bid)
    .bind(endorsement.timestamp)
    .bind(&endorsement.author)
    .execute(&mut *conn)
    .await
    .map_err(|e| record_insert_err(e, &endorsement.txid, &endorsement.block_hash))?;

    debug!(txid = %endorsement.txid, bid = %endorsement.bid, "endorsement stored");
    Ok(())
}

fn record_insert_err(e: sqlx::Error, txid: &str, block: &str) -> IndexerError {
    if is_foreign_key_violation(&e) {
        IndexerError::not_found(format!("block {block} for record {txid}"))
    } else if is_unique_violation(&e) {
        IndexerError::Storage(format!("record {txid} is already stored"))
    } else {
        storage_err(e)
    }
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

#[async_trait]
impl RecordStore for SqliteStorage {
    async fn current_tip(&self) -> Result<BlockRecord, IndexerError> {
        SqliteStorage::current_tip(self).await
    }

    async fn block_at(&self, height: u64) -> Result<Option<BlockRecord>, IndexerError> {
        find_block_by_height(&self.pool, height).await
    }

    async fn insert_block_with_records(&self, block: &IndexedBlock) -> Result<(), IndexerError> {
        SqliteStorage::insert_block_with_records(self, block).await
    }

    async fn delete_tip(&self, hash: &str) -> Result<(), IndexerError> {
        SqliteStorage::delete_tip(self, hash).await
    }

    async fn drop_after_height(&self, height: u64) -> Result<u64, IndexerError> {
        SqliteStorage::drop_after_height(self, height).await
    }

    fn peg_height(&self) -> u64 {
        self.peg.height
    }

    fn network(&self) -> Network {
        self.config.network
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
