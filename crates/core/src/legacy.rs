//! One-shot import of the old file-per-entry cache format.
//!
//! Each legacy file is zlib-compressed JSON:
//! `{"endpoint": .., "expires": <unix secs>, "data": .., "checksum": ..}`.
//! Files are deleted as they are read; unexpired items are inserted without
//! overwriting rows the current cache already holds.

use std::io::Read;
use std::path::Path;

use chrono::Utc;
use flate2::read::ZlibDecoder;
use serde::Deserialize;
use serde_json::Value;

use crate::codec;
use crate::engine::SimpleCache;
use crate::store::CacheRow;
use crate::Error;

/// A cache item as written by the legacy format.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyItem {
    pub endpoint: String,
    pub expires: i64,
    pub data: Value,
    #[serde(default)]
    pub checksum: Value,
}

impl LegacyItem {
    /// Decode a compressed legacy file.
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let mut text = String::new();
        ZlibDecoder::new(bytes)
            .read_to_string(&mut text)
            .map_err(|e| Error::CorruptLegacySource(format!("decompress: {e}")))?;
        serde_json::from_str(&text).map_err(|e| Error::CorruptLegacySource(e.to_string()))
    }

    /// Convert to a row, or `None` if already expired at `now`.
    pub fn into_row(self, now: i64) -> Result<Option<CacheRow>, Error> {
        if self.expires <= now {
            return Ok(None);
        }
        let payload = codec::serialize(&self.data)?;
        let token = codec::derive_token(&self.checksum);
        Ok(Some(CacheRow::new(self.endpoint, self.expires, payload, token)))
    }
}

impl SimpleCache {
    /// Import legacy cache files from `dir`, once per session.
    ///
    /// Returns the number of rows inserted. Unreadable items are logged and
    /// skipped; the directory is removed afterwards.
    pub async fn import_legacy(&self, dir: &Path) -> usize {
        if self.memory().legacy_checked() {
            return 0;
        }
        self.memory().mark_legacy_checked();

        let _busy = self.busy_tasks().enter("legacy-import");
        if self.should_stop() || !tokio::fs::try_exists(dir).await.unwrap_or(false) {
            return 0;
        }

        tracing::info!(dir = %dir.display(), "Running cache conversion...");
        let rows = self.read_legacy_dir(dir, Utc::now().timestamp()).await;

        let mut imported = 0;
        if !rows.is_empty() {
            match self.store() {
                Some(db) => match self.retrying("legacy-import", || db.insert_ignore_many(&rows)).await {
                    Ok(n) => imported = n,
                    Err(e) => tracing::warn!(error = %e, items = rows.len(), "legacy items not imported"),
                },
                None => tracing::warn!(items = rows.len(), "no persistent store, legacy items dropped"),
            }
        }

        if let Err(e) = tokio::fs::remove_dir(dir).await {
            tracing::warn!(dir = %dir.display(), error = %e, "legacy cache directory not removed");
        }

        tracing::info!(imported, "Cache conversion done");
        imported
    }

    async fn read_legacy_dir(&self, dir: &Path, now: i64) -> Vec<CacheRow> {
        let mut rows = Vec::new();
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "legacy cache directory unreadable");
                return rows;
            }
        };

        loop {
            if self.should_stop() {
                break;
            }
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "legacy cache listing failed");
                    break;
                }
            };

            let path = entry.path();
            match read_legacy_file(&path, now).await {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => tracing::debug!(path = %path.display(), "legacy item expired or not a file"),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping legacy cache item"),
            }
        }

        rows
    }
}

async fn read_legacy_file(path: &Path, now: i64) -> Result<Option<CacheRow>, Error> {
    if !tokio::fs::metadata(path).await?.is_file() {
        return Ok(None);
    }

    let bytes = tokio::fs::read(path).await?;
    tokio::fs::remove_file(path).await?;

    LegacyItem::parse(&bytes)?.into_row(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::engine::Host;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use serde_json::json;
    use std::io::Write;

    fn write_legacy(dir: &Path, name: &str, item: &Value) {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(item.to_string().as_bytes()).unwrap();
        std::fs::write(dir.join(name), encoder.finish().unwrap()).unwrap();
    }

    fn now() -> i64 {
        Utc::now().timestamp()
    }

    #[test]
    fn test_parse_and_convert() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        let item = json!({"endpoint": "a", "expires": 2_000_000_000i64, "data": {"x": 1}, "checksum": "v1"});
        encoder.write_all(item.to_string().as_bytes()).unwrap();

        let row = LegacyItem::parse(&encoder.finish().unwrap())
            .unwrap()
            .into_row(1_000)
            .unwrap()
            .unwrap();

        assert_eq!(row.key, "a");
        assert_eq!(row.payload, r#"{"x":1}"#);
        assert_eq!(row.token, codec::derive_token("v1"));
    }

    #[test]
    fn test_expired_item_dropped() {
        let item = LegacyItem { endpoint: "a".into(), expires: 10, data: json!(1), checksum: Value::Null };
        assert!(item.into_row(10).unwrap().is_none());
    }

    #[test]
    fn test_uncompressed_input_is_corrupt() {
        let result = LegacyItem::parse(br#"{"endpoint": "a"}"#);
        assert!(matches!(result, Err(Error::CorruptLegacySource(_))));
    }

    #[tokio::test]
    async fn test_import_directory() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("legacy");
        std::fs::create_dir(&legacy).unwrap();

        write_legacy(&legacy, "live", &json!({"endpoint": "live", "expires": now() + 600, "data": [1, 2], "checksum": "c"}));
        write_legacy(&legacy, "stale", &json!({"endpoint": "stale", "expires": now() - 600, "data": 1, "checksum": ""}));
        write_legacy(&legacy, "kept", &json!({"endpoint": "kept", "expires": now() + 600, "data": "legacy", "checksum": ""}));
        std::fs::write(legacy.join("broken"), b"not zlib at all").unwrap();

        let cache = SimpleCache::open_in_memory(Host::default()).await.unwrap();
        cache
            .store()
            .unwrap()
            .upsert(&CacheRow::new("kept", now() + 600, "\"current\"", 0))
            .await
            .unwrap();

        let imported = cache.import_legacy(&legacy).await;

        assert_eq!(imported, 1);
        assert!(!legacy.exists());
        assert_eq!(cache.get::<Vec<i32>>("live", "c").await, Some(vec![1, 2]));
        assert!(cache.get::<i32>("stale", "").await.is_none());
        assert_eq!(cache.get::<String>("kept", "").await.as_deref(), Some("current"));
    }

    #[tokio::test]
    async fn test_import_runs_once_per_session() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("legacy");
        std::fs::create_dir(&legacy).unwrap();

        let cache = SimpleCache::open_in_memory(Host::default()).await.unwrap();
        assert_eq!(cache.import_legacy(&legacy).await, 0);
        assert!(cache.memory().legacy_checked());

        std::fs::create_dir(&legacy).unwrap();
        write_legacy(&legacy, "late", &json!({"endpoint": "late", "expires": now() + 600, "data": 1}));
        assert_eq!(cache.import_legacy(&legacy).await, 0);
        assert!(legacy.join("late").exists());
    }

    #[tokio::test]
    async fn test_import_marker_kept_without_memory_cache() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("legacy");
        std::fs::create_dir(&legacy).unwrap();
        write_legacy(&legacy, "one", &json!({"endpoint": "one", "expires": now() + 600, "data": 1}));

        let config = AppConfig {
            db_path: dir.path().join("cache.db"),
            enable_mem_cache: false,
            legacy_dir: Some(legacy.clone()),
            ..Default::default()
        };
        let cache = SimpleCache::initialize(&config, Host::default()).await.unwrap();

        assert!(cache.memory().legacy_checked());
        assert_eq!(cache.get::<i32>("one", "").await, Some(1));

        std::fs::create_dir(&legacy).unwrap();
        write_legacy(&legacy, "two", &json!({"endpoint": "two", "expires": now() + 600, "data": 2}));
        assert_eq!(cache.import_legacy(&legacy).await, 0);
    }

    #[tokio::test]
    async fn test_initialize_imports_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("legacy");
        std::fs::create_dir(&legacy).unwrap();
        write_legacy(&legacy, "one", &json!({"endpoint": "one", "expires": now() + 600, "data": {"k": "v"}}));

        let config = AppConfig {
            db_path: dir.path().join("cache.db"),
            legacy_dir: Some(legacy.clone()),
            ..Default::default()
        };
        let cache = SimpleCache::initialize(&config, Host::default()).await.unwrap();

        assert_eq!(cache.get::<Value>("one", "").await, Some(json!({"k": "v"})));
        assert!(!legacy.exists());
    }
}
