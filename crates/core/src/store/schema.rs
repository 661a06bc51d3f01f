//! Cache table schema.
//!
//! There is no version tracking: a database whose table cannot be queried
//! is deleted and recreated from this schema.

use crate::Error;
use tokio_rusqlite::Connection;

const SCHEMA: &str = include_str!("../../sql/simplecache.sql");

/// Query that must succeed against a usable database.
const PROBE: &str = "SELECT id, expires, data, checksum FROM simplecache LIMIT 1";

/// Check that the cache table exists with the expected columns.
///
/// # Errors
///
/// Returns an error if the file is not a database or the table is missing
/// or incompatible.
pub async fn probe(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.prepare(PROBE)?.exists([])?;
        Ok(())
    })
    .await
    .map_err(Error::from)
}

/// Create the cache table if it does not exist.
pub async fn create(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute_batch(SCHEMA)?;
        Ok(())
    })
    .await
    .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_idempotent() {
        let conn = Connection::open_in_memory().await.unwrap();
        create(&conn).await.unwrap();
        create(&conn).await.unwrap();
        probe(&conn).await.unwrap();
    }

    #[tokio::test]
    async fn test_probe_missing_table() {
        let conn = Connection::open_in_memory().await.unwrap();
        assert!(probe(&conn).await.is_err());
    }

    #[tokio::test]
    async fn test_probe_incompatible_table() {
        let conn = Connection::open_in_memory().await.unwrap();
        conn.call(|conn| conn.execute_batch("CREATE TABLE simplecache (id TEXT, value BLOB)"))
            .await
            .unwrap();

        assert!(probe(&conn).await.is_err());
    }
}
