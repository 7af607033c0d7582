//! Read-side query engine over the SQLite store.
//!
//! Every list query is capped at `StoreConfig::max_query_limit` rows. A
//! missing single item is reported as `NotFound`; an empty list is just an
//! empty list.
//!
//! Blacklisted bulletins are either withheld (`withhold_censored`) or
//! returned with their message and tags scrubbed and the reason attached.

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

use ombindex_core::error::IndexerError;
use ombindex_core::geo;
use ombindex_core::tags::tag_score;
use ombindex_core::types::{
    AuthorSummary, AuthorView, BlockRef, BlockView, BulletinDetail, BulletinView,
    EndorsedBulletin, EndorsementView, Page, Statistics, TagSummary,
};
use ombindex_wire::Location;

use crate::sqlite::{storage_err, SqliteStorage};

const BULLETIN_SELECT: &str = "
    SELECT b.txid, b.author, b.message, b.timestamp,
           b.latitude, b.longitude, b.height AS altitude,
           b.block, blocks.height AS block_height, blocks.timestamp AS block_timestamp,
           (SELECT COUNT(*) FROM endorsements e WHERE e.bid = b.txid) AS num_endorsements,
           (SELECT GROUP_CONCAT(value, ' ')
              FROM (SELECT value FROM tags t WHERE t.txid = b.txid ORDER BY t.rowid)) AS tags,
           blacklist.reason AS censored
    FROM bulletins b
    JOIN blocks ON b.block = blocks.hash
    LEFT JOIN blacklist ON blacklist.txid = b.txid";

const ENDORSEMENT_SELECT: &str = "
    SELECT e.txid, e.author, e.bid, e.timestamp,
           e.block, blocks.height AS block_height, blocks.timestamp AS block_timestamp,
           EXISTS(SELECT 1 FROM bulletins WHERE bulletins.txid = e.bid) AS bulletin_exists
    FROM endorsements e
    JOIN blocks ON e.block = blocks.hash";

fn bulletin_from_row(row: &SqliteRow) -> Result<BulletinView, IndexerError> {
    let lat: Option<f64> = row.try_get("latitude").map_err(storage_err)?;
    let lon: Option<f64> = row.try_get("longitude").map_err(storage_err)?;
    let altitude: Option<f64> = row.try_get("altitude").map_err(storage_err)?;
    let location = match (lat, lon) {
        (Some(lat), Some(lon)) => Some(Location {
            lat,
            lon,
            altitude: altitude.unwrap_or_default(),
        }),
        _ => None,
    };
    let tags: Option<String> = row.try_get("tags").map_err(storage_err)?;

    Ok(BulletinView {
        txid: row.try_get("txid").map_err(storage_err)?,
        author: row.try_get("author").map_err(storage_err)?,
        message: row.try_get("message").map_err(storage_err)?,
        timestamp: row.try_get("timestamp").map_err(storage_err)?,
        location,
        block_hash: row.try_get("block").map_err(storage_err)?,
        block_height: row.try_get::<i64, _>("block_height").map_err(storage_err)? as u64,
        block_timestamp: row.try_get("block_timestamp").map_err(storage_err)?,
        num_endorsements: row.try_get::<i64, _>("num_endorsements").map_err(storage_err)? as u64,
        tags: tags
            .map(|t| t.split(' ').map(str::to_string).collect())
            .unwrap_or_default(),
        censored: row.try_get("censored").map_err(storage_err)?,
    })
}

fn endorsement_from_row(row: &SqliteRow) -> Result<EndorsementView, IndexerError> {
    Ok(EndorsementView {
        txid: row.try_get("txid").map_err(storage_err)?,
        author: row.try_get("author").map_err(storage_err)?,
        bid: row.try_get("bid").map_err(storage_err)?,
        timestamp: row.try_get("timestamp").map_err(storage_err)?,
        block_hash: row.try_get("block").map_err(storage_err)?,
        block_height: row.try_get::<i64, _>("block_height").map_err(storage_err)? as u64,
        block_timestamp: row.try_get("block_timestamp").map_err(storage_err)?,
        bulletin_exists: row.try_get::<i64, _>("bulletin_exists").map_err(storage_err)? != 0,
    })
}

impl SqliteStorage {
    fn limit(&self) -> i64 {
        self.config.max_query_limit as i64
    }

    /// Apply the censorship policy to a bulletin about to be listed.
    /// `None` means it must not be shown at all.
    fn screen(&self, mut view: BulletinView) -> Option<BulletinView> {
        if view.censored.is_none() {
            return Some(view);
        }
        if self.config.withhold_censored {
            return None;
        }
        view.message.clear();
        view.tags.clear();
        Some(view)
    }

    fn screen_all(&self, rows: Vec<SqliteRow>) -> Result<Vec<BulletinView>, IndexerError> {
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(view) = self.screen(bulletin_from_row(row)?) {
                out.push(view);
            }
        }
        Ok(out)
    }

    fn endorsements_from(rows: Vec<SqliteRow>) -> Result<Vec<EndorsementView>, IndexerError> {
        rows.iter().map(endorsement_from_row).collect()
    }

    async fn bulletin_view(&self, txid: &str) -> Result<Option<BulletinView>, IndexerError> {
        let row = sqlx::query(&format!("{BULLETIN_SELECT} WHERE b.txid = ?"))
            .bind(txid)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.as_ref().map(bulletin_from_row).transpose()
    }

    // ─── Single items ────────────────────────────────────────────────────────────

    /// A bulletin with its block, tags, and every endorsement of it.
    pub async fn get_bulletin(&self, txid: &str) -> Result<BulletinDetail, IndexerError> {
        let view = self
            .bulletin_view(txid)
            .await?
            .ok_or_else(|| IndexerError::not_found(format!("bulletin {txid}")))?;

        let bulletin = match self.screen(view.clone()) {
            Some(bulletin) => bulletin,
            None => {
                return Err(IndexerError::Censored {
                    txid: txid.into(),
                    reason: view.censored.unwrap_or_default(),
                })
            }
        };
        let endorsements = self.get_endorsements_by_bid(txid).await?;
        Ok(BulletinDetail {
            bulletin,
            endorsements,
        })
    }

    /// An endorsement, flagged with whether its target bulletin is stored.
    pub async fn get_endorsement(&self, txid: &str) -> Result<EndorsementView, IndexerError> {
        let row = sqlx::query(&format!("{ENDORSEMENT_SELECT} WHERE e.txid = ?"))
            .bind(txid)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        match row {
            Some(row) => endorsement_from_row(&row),
            None => Err(IndexerError::not_found(format!("endorsement {txid}"))),
        }
    }

    /// Every endorsement naming `bid`, oldest first.
    pub async fn get_endorsements_by_bid(
        &self,
        bid: &str,
    ) -> Result<Vec<EndorsementView>, IndexerError> {
        let rows = sqlx::query(&format!(
            "{ENDORSEMENT_SELECT} WHERE e.bid = ?
             ORDER BY blocks.height ASC, e.timestamp ASC LIMIT ?"
        ))
        .bind(bid)
        .bind(self.limit())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        Self::endorsements_from(rows)
    }

    /// Tags of a stored bulletin in message order.
    pub async fn get_tags(&self, txid: &str) -> Result<Vec<String>, IndexerError> {
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bulletins WHERE txid = ?")
            .bind(txid)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        if exists == 0 {
            return Err(IndexerError::not_found(format!("bulletin {txid}")));
        }

        sqlx::query_scalar("SELECT value FROM tags WHERE txid = ? ORDER BY rowid")
            .bind(txid)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)
    }

    /// A stored block with its record counts.
    pub async fn get_block(&self, hash: &str) -> Result<BlockView, IndexerError> {
        let row = sqlx::query(
            "SELECT hash, prevhash, height, timestamp,
                    (SELECT COUNT(*) FROM bulletins WHERE block = blocks.hash) AS num_bulletins,
                    (SELECT COUNT(*) FROM endorsements WHERE block = blocks.hash) AS num_endorsements
             FROM blocks WHERE hash = ?",
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?
        .ok_or_else(|| IndexerError::not_found(format!("block {hash}")))?;

        Ok(BlockView {
            hash: row.try_get("hash").map_err(storage_err)?,
            prev_hash: row.try_get("prevhash").map_err(storage_err)?,
            height: row.try_get::<i64, _>("height").map_err(storage_err)? as u64,
            timestamp: row.try_get("timestamp").map_err(storage_err)?,
            num_bulletins: row.try_get::<i64, _>("num_bulletins").map_err(storage_err)? as u64,
            num_endorsements: row.try_get::<i64, _>("num_endorsements").map_err(storage_err)?
                as u64,
        })
    }

    // ─── Lists ───────────────────────────────────────────────────────────────────

    /// Bulletins carrying `tag`, matched case-insensitively, newest block first.
    pub async fn get_by_tag(&self, tag: &str) -> Result<Vec<BulletinView>, IndexerError> {
        let rows = sqlx::query(&format!(
            "{BULLETIN_SELECT}
             WHERE b.txid IN (SELECT txid FROM tags WHERE value = ?1 COLLATE NOCASE)
             ORDER BY blocks.height DESC, b.timestamp DESC LIMIT ?2"
        ))
        .bind(tag)
        .bind(self.limit())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        debug!(tag, rows = rows.len(), "tag query");
        self.screen_all(rows)
    }

    /// Everything an author has posted, with summary counts.
    ///
    /// Fails with `NotFound` if the address has neither bulletins nor
    /// endorsements.
    pub async fn get_by_author(&self, address: &str) -> Result<AuthorView, IndexerError> {
        let summary = sqlx::query(
            "SELECT COUNT(*) AS num_bulletins,
                    MIN(blocks.timestamp) AS first_ts,
                    MAX(blocks.timestamp) AS last_ts
             FROM bulletins b JOIN blocks ON b.block = blocks.hash
             WHERE b.author = ?",
        )
        .bind(address)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        let num_endorsements: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM endorsements WHERE author = ?")
                .bind(address)
                .fetch_one(&self.pool)
                .await
                .map_err(storage_err)?;

        let summary = AuthorSummary {
            address: address.into(),
            num_bulletins: summary.try_get::<i64, _>("num_bulletins").map_err(storage_err)? as u64,
            num_endorsements: num_endorsements as u64,
            first_block_timestamp: summary.try_get("first_ts").map_err(storage_err)?,
            last_block_timestamp: summary.try_get("last_ts").map_err(storage_err)?,
        };
        if summary.num_bulletins == 0 && summary.num_endorsements == 0 {
            return Err(IndexerError::not_found(format!("author {address}")));
        }

        let bulletins = sqlx::query(&format!(
            "{BULLETIN_SELECT} WHERE b.author = ?1
             ORDER BY blocks.timestamp DESC, b.timestamp DESC LIMIT ?2"
        ))
        .bind(address)
        .bind(self.limit())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        let endorsements = sqlx::query(&format!(
            "{ENDORSEMENT_SELECT} WHERE e.author = ?1
             ORDER BY blocks.timestamp DESC, e.timestamp DESC LIMIT ?2"
        ))
        .bind(address)
        .bind(self.limit())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(AuthorView {
            summary,
            bulletins: self.screen_all(bulletins)?,
            endorsements: Self::endorsements_from(endorsements)?,
        })
    }

    /// Located bulletins strictly within `radius_m` metres of the point,
    /// newest block first.
    pub async fn get_nearby(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
    ) -> Result<Vec<BulletinView>, IndexerError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(IndexerError::Other(format!(
                "coordinates out of range: ({lat}, {lon})"
            )));
        }

        let sql = format!(
            "{BULLETIN_SELECT}
             WHERE b.latitude IS NOT NULL AND b.longitude IS NOT NULL
             ORDER BY blocks.timestamp DESC, b.timestamp DESC"
        );
        let mut rows = sqlx::query(&sql).fetch(&self.pool);
        let limit = self.config.max_query_limit as usize;
        let mut out = Vec::new();

        while let Some(row) = rows.try_next().await.map_err(storage_err)? {
            let view = bulletin_from_row(&row)?;
            let Some(loc) = view.location else { continue };
            if !geo::within(lat, lon, loc.lat, loc.lon, radius_m) {
                continue;
            }
            if let Some(view) = self.screen(view) {
                out.push(view);
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Endorsed ids ranked by endorsement count, ties broken by first
    /// endorsement. The bulletin is attached when it is stored and visible.
    pub async fn get_most_endorsed(
        &self,
        limit: u32,
    ) -> Result<Vec<EndorsedBulletin>, IndexerError> {
        let limit = limit.min(self.config.max_query_limit) as i64;
        let rows = sqlx::query(
            "SELECT bid, COUNT(*) AS cnt
             FROM endorsements
             GROUP BY bid
             ORDER BY cnt DESC, MIN(rowid) ASC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let bid: String = row.try_get("bid").map_err(storage_err)?;
            let count = row.try_get::<i64, _>("cnt").map_err(storage_err)? as u64;
            let bulletin = match self.bulletin_view(&bid).await? {
                Some(view) => self.screen(view),
                None => None,
            };
            out.push(EndorsedBulletin {
                bid,
                count,
                bulletin,
            });
        }
        Ok(out)
    }

    /// Tags ranked by score: usage count plus a bonus that grows with how
    /// recently the tag first appeared.
    pub async fn get_best_tags(&self, limit: u32) -> Result<Vec<TagSummary>, IndexerError> {
        let rows = sqlx::query(
            "SELECT t.value, COUNT(*) AS cnt, MIN(b.timestamp) AS first_seen
             FROM tags t JOIN bulletins b ON t.txid = b.txid
             GROUP BY t.value
             ORDER BY MIN(t.rowid) ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let mut tags = rows
            .iter()
            .map(|row| {
                let count = row.try_get::<i64, _>("cnt").map_err(storage_err)? as u64;
                let first_seen: i64 = row.try_get("first_seen").map_err(storage_err)?;
                Ok(TagSummary {
                    value: row.try_get("value").map_err(storage_err)?,
                    count,
                    first_seen,
                    score: tag_score(count, first_seen),
                })
            })
            .collect::<Result<Vec<_>, IndexerError>>()?;

        // Stable: equal scores keep first-appearance order.
        tags.sort_by(|a, b| b.score.cmp(&a.score));
        tags.truncate(limit.min(self.config.max_query_limit) as usize);
        Ok(tags)
    }

    /// Record counts in the window `(start, end]`.
    ///
    /// Bulletins and endorsements are counted by their own timestamps,
    /// blocks by their header timestamps.
    pub async fn get_statistics(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Statistics, IndexerError> {
        Ok(Statistics {
            start,
            end,
            bulletins: self.count_between("bulletins", start, end).await?,
            endorsements: self.count_between("endorsements", start, end).await?,
            blocks: self.count_between("blocks", start, end).await?,
        })
    }

    async fn count_between(
        &self,
        table: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64, IndexerError> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {table} WHERE timestamp > ? AND timestamp <= ?"
        ))
        .bind(start.timestamp())
        .bind(end.timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(count as u64)
    }

    // ─── Pages ───────────────────────────────────────────────────────────────────

    /// Records from the blocks in `(height(stop), height(start)]`, newest
    /// first.
    ///
    /// `stop` may be the peg's parent hash, which selects everything down to
    /// and including the peg.
    pub async fn query_range(&self, start: &str, stop: &str) -> Result<Page, IndexerError> {
        let start_height = self.find_height(start).await?;
        let stop_height = self.find_height(stop).await?;
        if start_height < stop_height {
            return Err(IndexerError::Other(format!(
                "range start {start} is below stop {stop}"
            )));
        }

        let bulletins = sqlx::query(&format!(
            "{BULLETIN_SELECT}
             WHERE blocks.height <= ?1 AND blocks.height > ?2
             ORDER BY blocks.height DESC, b.timestamp DESC LIMIT ?3"
        ))
        .bind(start_height)
        .bind(stop_height)
        .bind(self.limit())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        let endorsements = sqlx::query(&format!(
            "{ENDORSEMENT_SELECT}
             WHERE blocks.height <= ?1 AND blocks.height > ?2
             ORDER BY blocks.height DESC, e.timestamp DESC LIMIT ?3"
        ))
        .bind(start_height)
        .bind(stop_height)
        .bind(self.limit())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(Page {
            start: BlockRef {
                hash: start.into(),
                height: start_height.max(0) as u64,
            },
            stop: BlockRef {
                hash: stop.into(),
                height: stop_height.max(0) as u64,
            },
            bulletins: self.screen_all(bulletins)?,
            endorsements: Self::endorsements_from(endorsements)?,
        })
    }

    /// The page from the current tip down to and including the peg.
    pub async fn latest_page(&self) -> Result<Page, IndexerError> {
        let tip = self.current_tip().await?;
        let stop = self.peg.prev_hash.clone();
        self.query_range(&tip.hash, &stop).await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
