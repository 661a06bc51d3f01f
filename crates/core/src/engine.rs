//! The two-layer cache engine.
//!
//! Reads try the session memory layer first and fall back to SQLite,
//! copying durable hits back into memory. Writes go to both. Expired rows
//! are only ever removed by the cleanup sweep; until then they read as
//! misses.
//!
//! Nothing here returns an error to `get`/`set` callers: a failed read is a
//! miss and a failed write is logged and dropped.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::codec;
use crate::config::AppConfig;
use crate::lifecycle::{AbortSignal, BusyRegistry, NeverAbort, ShutdownToken, SweepGuard};
use crate::memory::{MemoryEntry, MemoryStore, PropertyBag, SessionProperties};
use crate::store::{CacheDb, CacheRow, RetryPolicy, with_retry};
use crate::Error;

/// Collaborators supplied by the hosting process.
#[derive(Clone)]
pub struct Host {
    pub properties: Arc<dyn PropertyBag>,
    pub abort: Arc<dyn AbortSignal>,
}

impl Host {
    pub fn new(properties: impl PropertyBag + 'static, abort: impl AbortSignal + 'static) -> Self {
        Self { properties: Arc::new(properties), abort: Arc::new(abort) }
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new(SessionProperties::new(), NeverAbort)
    }
}

/// Whether an entry may be served for `requested` at time `now`.
///
/// An entry stored without a token matches any request.
pub fn is_live(expires_at: i64, stored_token: i64, requested_token: i64, now: i64) -> bool {
    expires_at > now && (stored_token == 0 || stored_token == requested_token)
}

struct Inner {
    memory: MemoryStore,
    db: RwLock<Option<CacheDb>>,
    busy: BusyRegistry,
    exit: ShutdownToken,
    abort: Arc<dyn AbortSignal>,
    sweeping: AtomicBool,
    closed: AtomicBool,
    enable_mem_cache: bool,
    cleanup_interval: Duration,
    default_ttl: Duration,
    retry: RetryPolicy,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.exit.cancel();
            tracing::debug!("cache dropped without shutdown, resources released");
        }
    }
}

/// Dual-layer TTL cache.
///
/// Cheap to clone; all clones share one engine. Call [`SimpleCache::shutdown`]
/// before exit to drain in-flight operations.
#[derive(Clone)]
pub struct SimpleCache {
    inner: Arc<Inner>,
}

impl SimpleCache {
    /// Open the durable store named by `config` and start the engine.
    ///
    /// A store that cannot be opened or recreated leaves the engine in
    /// memory-only mode.
    ///
    /// # Errors
    ///
    /// Returns `Error::StoreUnavailable` if the durable store is unusable and
    /// the memory layer is disabled.
    pub async fn initialize(config: &AppConfig, host: Host) -> Result<Self, Error> {
        let db = match CacheDb::open(&config.db_path, config.busy_timeout()).await {
            Ok(db) => Some(db),
            Err(e) => {
                tracing::warn!(error = %e, "persistent cache unavailable, continuing memory-only");
                None
            }
        };

        Self::with_store(config, host, db).await
    }

    /// Start an engine over an in-memory database with default settings.
    pub async fn open_in_memory(host: Host) -> Result<Self, Error> {
        let db = CacheDb::open_in_memory().await?;
        Self::with_store(&AppConfig::default(), host, Some(db)).await
    }

    /// Start an engine over an already opened store, or none.
    pub async fn with_store(config: &AppConfig, host: Host, db: Option<CacheDb>) -> Result<Self, Error> {
        if db.is_none() && !config.enable_mem_cache {
            return Err(Error::StoreUnavailable("no persistent store and memory cache disabled".into()));
        }

        let cache = Self {
            inner: Arc::new(Inner {
                memory: MemoryStore::new(host.properties),
                db: RwLock::new(db),
                busy: BusyRegistry::new(),
                exit: ShutdownToken::new(),
                abort: host.abort,
                sweeping: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                enable_mem_cache: config.enable_mem_cache,
                cleanup_interval: config.cleanup_interval(),
                default_ttl: config.default_ttl(),
                retry: config.retry_policy(),
            }),
        };

        if let Some(dir) = &config.legacy_dir {
            cache.import_legacy(dir).await;
        }
        cache.check_cleanup().await;

        tracing::info!(
            persistent = cache.store().is_some(),
            memory = config.enable_mem_cache,
            "Initialized"
        );
        Ok(cache)
    }

    /// Get a value, or `None` if it is missing, expired, or was stored with
    /// a different checksum.
    ///
    /// The checksum can be any serializable value; blank values match only
    /// entries stored without one.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, checksum: &(impl Serialize + ?Sized)) -> Option<T> {
        if self.is_closed() {
            return None;
        }
        let _busy = self.inner.busy.enter(format!("get.{key}"));

        let token = codec::derive_token(checksum);
        let now = Utc::now().timestamp();

        if self.inner.enable_mem_cache
            && let Some(value) = self.get_mem_cache(key, token, now)
        {
            return Some(value);
        }

        self.get_db_cache(key, token, now).await
    }

    /// Store a value in both layers.
    ///
    /// `expiration` defaults to the configured TTL. Failures are logged and
    /// otherwise ignored.
    pub async fn set<T: Serialize + ?Sized>(
        &self, key: &str, data: &T, checksum: &(impl Serialize + ?Sized), expiration: Option<Duration>,
    ) {
        {
            let _busy = self.inner.busy.enter(format!("set.{key}"));
            self.set_entry(key, data, checksum, expiration).await;
        }

        self.check_cleanup().await;
    }

    fn get_mem_cache<T: DeserializeOwned>(&self, key: &str, token: i64, now: i64) -> Option<T> {
        let entry = match self.inner.memory.get(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "dropping corrupt memory entry");
                self.inner.memory.clear(key);
                return None;
            }
        };

        if !is_live(entry.expires_at, entry.token, token, now) {
            return None;
        }

        match codec::deserialize(&entry.payload) {
            Ok(value) => {
                tracing::debug!(key, "memory cache hit");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "memory payload unreadable");
                None
            }
        }
    }

    async fn get_db_cache<T: DeserializeOwned>(&self, key: &str, token: i64, now: i64) -> Option<T> {
        let db = self.store()?;

        let row = match self.retrying("read", || db.read(key)).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                tracing::debug!(key, "cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed");
                return None;
            }
        };

        if !is_live(row.expires_at, row.token, token, now) {
            return None;
        }

        let value = match codec::deserialize(&row.payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "stored payload unreadable");
                return None;
            }
        };

        if self.inner.enable_mem_cache {
            let entry = MemoryEntry { expires_at: row.expires_at, payload: row.payload, token: row.token };
            if let Err(e) = self.inner.memory.set(key, &entry) {
                tracing::warn!(key, error = %e, "memory write-back failed");
            }
        }

        tracing::debug!(key, "database cache hit");
        Some(value)
    }

    async fn set_entry<T: Serialize + ?Sized>(
        &self, key: &str, data: &T, checksum: &(impl Serialize + ?Sized), expiration: Option<Duration>,
    ) {
        let token = codec::derive_token(checksum);
        let ttl = expiration.unwrap_or(self.inner.default_ttl);
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp().saturating_add(ttl_secs);

        let payload = match codec::serialize(data) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(key, error = %e, "value not cached");
                return;
            }
        };

        let entry = MemoryEntry { expires_at, payload, token };
        let mut wrote_memory = false;
        if self.inner.enable_mem_cache && !self.is_exiting() {
            match self.inner.memory.set(key, &entry) {
                Ok(()) => wrote_memory = true,
                Err(e) => tracing::warn!(key, error = %e, "memory write failed"),
            }
        }

        if self.is_exiting() {
            return;
        }
        let Some(db) = self.store() else {
            return;
        };

        let row = CacheRow::new(key, expires_at, entry.payload, token);
        if let Err(e) = self.retrying("upsert", || db.upsert(&row)).await {
            tracing::warn!(key, error = %e, "cache write not applied");
            // Keep memory in line with the last write that actually landed.
            if wrote_memory {
                self.inner.memory.clear(key);
            }
        }
    }

    /// Run a sweep if the cleanup interval has elapsed since the last one.
    ///
    /// The first call in a session only records the current time. Returns
    /// whether a sweep ran.
    pub async fn check_cleanup(&self) -> bool {
        if self.should_stop() {
            return false;
        }

        let now = Utc::now();
        match self.inner.memory.last_cleanup() {
            None => {
                self.inner.memory.record_cleanup(now);
                false
            }
            Some(last) => match (now - last).to_std() {
                Ok(elapsed) if elapsed > self.inner.cleanup_interval => self.do_cleanup().await,
                _ => false,
            },
        }
    }

    /// Clear every memory entry the store knows about and delete expired rows.
    ///
    /// Returns false without doing anything if shutdown or abort is pending,
    /// or another sweep is already running.
    pub async fn do_cleanup(&self) -> bool {
        if self.should_stop() {
            return false;
        }
        let Some(_sweep) = SweepGuard::acquire(&self.inner.sweeping) else {
            tracing::debug!("cleanup already running");
            return false;
        };
        let _busy = self.inner.busy.enter("cleanup");

        let started = Utc::now();
        self.inner.memory.record_cleanup(started);
        let now = started.timestamp();
        tracing::info!("Running cleanup...");

        let Some(db) = self.store() else {
            tracing::info!("Auto cleanup done, no persistent store");
            return true;
        };

        let rows = match self.retrying("scan", || db.scan_all()).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "cleanup scan failed");
                return true;
            }
        };

        let mut deleted = 0usize;
        for (key, expires_at) in rows {
            if self.should_stop() {
                tracing::info!(deleted, "cleanup interrupted");
                return true;
            }

            self.inner.memory.clear(&key);

            // Re-checked in the delete itself; the row may have been refreshed since the scan.
            if expires_at <= now {
                match self.retrying("delete", || db.delete_expired(&key, now)).await {
                    Ok(true) => deleted += 1,
                    Ok(false) => {}
                    Err(e) => tracing::warn!(key = %key, error = %e, "expired row not deleted"),
                }
            }
        }

        tracing::info!(deleted, "Auto cleanup done");
        true
    }

    /// Stop accepting work, wait for in-flight operations, release the store.
    ///
    /// Idempotent. Must not be awaited from inside a cache operation: the
    /// drain would wait on itself.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.exit.cancel();

        self.inner.busy.wait_idle().await;

        let db = self.inner.db.write().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
        if let Some(db) = db
            && let Err(e) = db.close().await
        {
            tracing::warn!(error = %e, "closing cache database failed");
        }

        tracing::info!("Closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// The memory layer.
    pub fn memory(&self) -> &MemoryStore {
        &self.inner.memory
    }

    /// The persistent layer, if one is open.
    pub fn store(&self) -> Option<CacheDb> {
        self.inner.db.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Lifetime given to entries stored without an explicit expiration.
    pub fn default_ttl(&self) -> Duration {
        self.inner.default_ttl
    }

    pub(crate) fn busy_tasks(&self) -> &BusyRegistry {
        &self.inner.busy
    }

    fn is_exiting(&self) -> bool {
        self.inner.exit.is_cancelled()
    }

    pub(crate) fn should_stop(&self) -> bool {
        self.is_exiting() || self.inner.abort.abort_requested()
    }

    pub(crate) async fn retrying<T, F, Fut>(&self, op: &str, run: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        with_retry(&self.inner.retry, op, || self.should_stop(), run).await
    }
}

impl fmt::Debug for SimpleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleCache")
            .field("store", &self.store())
            .field("enable_mem_cache", &self.inner.enable_mem_cache)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
