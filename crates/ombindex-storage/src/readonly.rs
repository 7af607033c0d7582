//! Ad-hoc read-only SQL.
//!
//! Statements are screened twice: a syntactic check that admits a single
//! `SELECT`/`WITH` statement, then SQLite's own `query_only` mode on the
//! connection that runs it, which rejects any write the first check missed.

use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::{debug, warn};

use ombindex_core::error::IndexerError;

use crate::sqlite::{storage_err, SqliteStorage};

/// Reject anything that is not a single `SELECT` or `WITH` statement.
fn screen_statement(sql: &str) -> Result<&str, IndexerError> {
    let trimmed = sql.trim();
    let body = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
    if body.is_empty() {
        return Err(IndexerError::NotReadOnly {
            reason: "empty statement".into(),
        });
    }
    if body.contains(';') {
        return Err(IndexerError::NotReadOnly {
            reason: "multiple statements".into(),
        });
    }

    let keyword = body
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    match keyword.as_str() {
        "SELECT" | "WITH" => Ok(body),
        _ => Err(IndexerError::NotReadOnly {
            reason: format!("statement starts with {keyword:?}"),
        }),
    }
}

fn column_value(row: &SqliteRow, index: usize) -> Result<Value, IndexerError> {
    let raw = row.try_get_raw(index).map_err(storage_err)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => Value::from(row.try_get::<i64, _>(index).map_err(storage_err)?),
        "REAL" => Value::from(row.try_get::<f64, _>(index).map_err(storage_err)?),
        "BLOB" => Value::from(hex::encode(
            row.try_get::<Vec<u8>, _>(index).map_err(storage_err)?,
        )),
        _ => Value::from(row.try_get::<String, _>(index).map_err(storage_err)?),
    };
    Ok(value)
}

fn row_to_json(row: &SqliteRow) -> Result<Value, IndexerError> {
    let mut object = Map::new();
    for column in row.columns() {
        object.insert(
            column.name().to_string(),
            column_value(row, column.ordinal())?,
        );
    }
    Ok(Value::Object(object))
}

impl SqliteStorage {
    /// Run a caller-supplied query and return each row as a JSON object.
    ///
    /// Fails with `NotReadOnly` if the statement would modify the store.
    pub async fn execute_read_only(&self, sql: &str) -> Result<Vec<Value>, IndexerError> {
        let body = screen_statement(sql)?;
        let mut conn = self.pool.acquire().await.map_err(storage_err)?;

        sqlx::query("PRAGMA query_only = ON")
            .execute(&mut *conn)
            .await
            .map_err(storage_err)?;
        let result = sqlx::query(body).fetch_all(&mut *conn).await;
        let reset = sqlx::query("PRAGMA query_only = OFF")
            .execute(&mut *conn)
            .await;
        if let Err(e) = reset {
            warn!(error = %e, "Could not leave query_only mode; discarding connection");
            conn.detach();
        }

        let rows = result.map_err(|e| match &e {
            sqlx::Error::Database(db) if db.message().contains("readonly") => {
                IndexerError::NotReadOnly {
                    reason: db.message().to_string(),
                }
            }
            _ => storage_err(e),
        })?;
        debug!(rows = rows.len(), "read-only query");
        rows.iter().map(row_to_json).collect()
    }
}
