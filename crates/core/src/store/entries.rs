//! Cache row operations.
//!
//! Two write flavours exist on purpose: `upsert*` replaces an existing row
//! (last writer wins), `insert_ignore_many` keeps it (bulk imports must not
//! clobber fresher data).

use super::connection::CacheDb;
use crate::Error;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

const INSERT_OR_REPLACE: &str = "INSERT OR REPLACE INTO simplecache (id, expires, data, checksum) VALUES (?1, ?2, ?3, ?4)";

const INSERT_OR_IGNORE: &str = "INSERT OR IGNORE INTO simplecache (id, expires, data, checksum) VALUES (?1, ?2, ?3, ?4)";

/// A persisted cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRow {
    pub key: String,
    /// Unix timestamp in seconds.
    pub expires_at: i64,
    /// Serialized payload.
    pub payload: String,
    /// Validity token, 0 when none was given.
    pub token: i64,
}

impl CacheRow {
    pub fn new(key: impl Into<String>, expires_at: i64, payload: impl Into<String>, token: i64) -> Self {
        Self { key: key.into(), expires_at, payload: payload.into(), token }
    }
}

impl CacheDb {
    /// Get a row by key.
    ///
    /// Returns None if the key doesn't exist. Expired rows are returned as-is.
    pub async fn read(&self, key: &str) -> Result<Option<CacheRow>, Error> {
        let key = key.to_string();
        self.session()
            .await?
            .call(move |conn| -> Result<Option<CacheRow>, Error> {
                let mut stmt = conn.prepare("SELECT id, expires, data, checksum FROM simplecache WHERE id = ?1")?;

                let result = stmt.query_row(params![key], |row| {
                    Ok(CacheRow { key: row.get(0)?, expires_at: row.get(1)?, payload: row.get(2)?, token: row.get(3)? })
                });

                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace a row.
    pub async fn upsert(&self, row: &CacheRow) -> Result<(), Error> {
        let row = row.clone();
        self.session()
            .await?
            .call(move |conn| -> Result<(), Error> {
                conn.execute(INSERT_OR_REPLACE, params![&row.key, row.expires_at, &row.payload, row.token])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace many rows in one transaction.
    ///
    /// Returns the number of rows written.
    pub async fn upsert_many(&self, rows: &[CacheRow]) -> Result<usize, Error> {
        self.write_many(INSERT_OR_REPLACE, rows.to_vec()).await
    }

    /// Insert many rows in one transaction, keeping any row that already exists.
    ///
    /// Returns the number of rows actually inserted.
    pub async fn insert_ignore_many(&self, rows: &[CacheRow]) -> Result<usize, Error> {
        self.write_many(INSERT_OR_IGNORE, rows.to_vec()).await
    }

    async fn write_many(&self, sql: &'static str, rows: Vec<CacheRow>) -> Result<usize, Error> {
        if rows.is_empty() {
            return Ok(0);
        }

        self.session()
            .await?
            .call(move |conn| -> Result<usize, Error> {
                let tx = conn.transaction()?;
                let mut written = 0;
                {
                    let mut stmt = tx.prepare(sql)?;
                    for row in &rows {
                        written += stmt.execute(params![&row.key, row.expires_at, &row.payload, row.token])?;
                    }
                }
                tx.commit()?;
                Ok(written)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a row.
    ///
    /// Returns false if there was nothing to delete.
    pub async fn delete(&self, key: &str) -> Result<bool, Error> {
        let key = key.to_string();
        self.session()
            .await?
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM simplecache WHERE id = ?1", params![key])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a row only if it has expired by `now`.
    ///
    /// A row refreshed since it was scanned is kept.
    pub async fn delete_expired(&self, key: &str, now: i64) -> Result<bool, Error> {
        let key = key.to_string();
        self.session()
            .await?
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM simplecache WHERE id = ?1 AND expires <= ?2", params![key, now])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// List every key with its expiry.
    pub async fn scan_all(&self) -> Result<Vec<(String, i64)>, Error> {
        self.session()
            .await?
            .call(|conn| -> Result<Vec<(String, i64)>, Error> {
                let mut stmt = conn.prepare("SELECT id, expires FROM simplecache")?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn count(&self) -> Result<u64, Error> {
        self.session()
            .await?
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM simplecache", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
