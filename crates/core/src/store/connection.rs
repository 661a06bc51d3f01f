//! Database connection management.
//!
//! Opening runs an integrity probe; a database that fails it (missing file,
//! not a database, wrong table) is deleted and recreated.
//!
//! The connection opened here belongs to the thread that opened it. Any
//! other OS thread gets a private connection per operation, see
//! [`CacheDb::session`].

use super::schema;
use crate::Error;
use std::path::{Path, PathBuf};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tokio_rusqlite::Connection;

/// Pause between deleting a broken database and recreating it.
const REPAIR_DELAY: Duration = Duration::from_millis(500);

/// Cache database handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread.
#[derive(Clone, Debug)]
pub struct CacheDb {
    pub(crate) conn: Connection,
    path: Option<PathBuf>,
    busy_timeout: Duration,
    primary: ThreadId,
}

impl CacheDb {
    /// Open the database at the specified path, repairing it if needed.
    ///
    /// # Errors
    ///
    /// Returns `Error::StoreUnavailable` if the database could neither be
    /// opened nor recreated.
    pub async fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        let conn = match Self::connect_and_probe(&path, busy_timeout).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cache database unusable, recreating");
                Self::recreate(&path, busy_timeout)
                    .await
                    .map_err(|e| Error::StoreUnavailable(format!("{}: {e}", path.display())))?
            }
        };

        Ok(Self { conn, path: Some(path), busy_timeout, primary: thread::current().id() })
    }

    /// Open an in-memory database for testing.
    ///
    /// Every operation goes through the one shared connection, since a new
    /// in-memory connection would be a different database.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;

        configure(&conn, Duration::ZERO).await?;
        schema::create(&conn).await?;

        Ok(Self { conn, path: None, busy_timeout: Duration::ZERO, primary: thread::current().id() })
    }

    /// Database file, or `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Connection to use for one operation.
    ///
    /// The shared handle on the primary thread; a freshly opened private
    /// connection anywhere else.
    pub(crate) async fn session(&self) -> Result<Connection, Error> {
        match &self.path {
            Some(path) if thread::current().id() != self.primary => {
                tracing::trace!(path = %path.display(), "opening private connection");
                Self::connect(path, self.busy_timeout).await
            }
            _ => Ok(self.conn.clone()),
        }
    }

    /// Close the shared connection.
    pub async fn close(self) -> Result<(), Error> {
        self.conn.close().await.map_err(Error::from)
    }

    async fn connect(path: &Path, busy_timeout: Duration) -> Result<Connection, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;

        if let Err(e) = configure(&conn, busy_timeout).await {
            let _ = conn.close().await;
            return Err(e);
        }

        Ok(conn)
    }

    async fn connect_and_probe(path: &Path, busy_timeout: Duration) -> Result<Connection, Error> {
        let conn = Self::connect(path, busy_timeout).await?;

        if let Err(e) = schema::probe(&conn).await {
            let _ = conn.close().await;
            return Err(e);
        }

        Ok(conn)
    }

    async fn recreate(path: &Path, busy_timeout: Duration) -> Result<Connection, Error> {
        remove_database_files(path).await?;
        tokio::time::sleep(REPAIR_DELAY).await;

        let conn = Self::connect(path, busy_timeout).await?;
        schema::create(&conn).await?;
        tracing::info!(path = %path.display(), "cache database recreated");
        Ok(conn)
    }
}

/// Apply connection pragmas.
async fn configure(conn: &Connection, busy_timeout: Duration) -> Result<(), Error> {
    conn.call(move |conn| -> Result<(), Error> {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA temp_store=MEMORY;",
        )?;
        Ok(())
    })
    .await
    .map_err(Error::from)
}

/// Delete the database file and its WAL side files.
async fn remove_database_files(path: &Path) -> Result<(), Error> {
    for suffix in ["", "-wal", "-shm"] {
        let mut file = path.as_os_str().to_owned();
        file.push(suffix);
        match tokio::fs::remove_file(&file).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.path().is_none());
        schema::probe(&db.conn).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        let db = CacheDb::open(&path, Duration::from_secs(1)).await.unwrap();
        assert!(path.exists());
        assert_eq!(db.path(), Some(path.as_path()));
        schema::probe(&db.conn).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_repairs_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        std::fs::write(&path, b"this is definitely not an sqlite database, just some garbage bytes").unwrap();

        let db = CacheDb::open(&path, Duration::from_secs(1)).await.unwrap();
        schema::probe(&db.conn).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("cache.db");

        let result = CacheDb::open(&path, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(Error::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_session_on_primary_thread_is_shared() {
        let dir = tempfile::tempdir().unwrap();
        let db = CacheDb::open(dir.path().join("cache.db"), Duration::from_secs(1)).await.unwrap();

        // Same thread: no new connection is opened, so the session sees
        // the shared connection's temp table.
        db.conn
            .call(|conn| conn.execute_batch("CREATE TEMP TABLE marker (x INTEGER)"))
            .await
            .unwrap();
        let session = db.session().await.unwrap();
        session
            .call(|conn| conn.prepare("SELECT x FROM marker").map(|_| ()))
            .await
            .unwrap();
    }

    #[test]
    fn test_session_off_primary_thread_is_private() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();

        let db = rt.block_on(async {
            let db = CacheDb::open(&path, Duration::from_secs(1)).await.unwrap();
            db.conn
                .call(|conn| conn.execute_batch("CREATE TEMP TABLE marker (x INTEGER)"))
                .await
                .unwrap();
            db
        });

        let worker = thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async move {
                let session = db.session().await.unwrap();
                let sees_marker = session
                    .call(|conn| Ok::<_, tokio_rusqlite::rusqlite::Error>(conn.prepare("SELECT x FROM marker").is_ok()))
                    .await
                    .unwrap();
                let sees_table = session
                    .call(|conn| Ok::<_, tokio_rusqlite::rusqlite::Error>(conn.prepare("SELECT id FROM simplecache").is_ok()))
                    .await
                    .unwrap();
                (sees_marker, sees_table)
            })
        });

        let (sees_marker, sees_table) = worker.join().unwrap();
        assert!(!sees_marker);
        assert!(sees_table);
    }
}
