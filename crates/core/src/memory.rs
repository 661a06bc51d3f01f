//! Session-scoped memory layer.
//!
//! The host exposes a flat string property bag that lives as long as the
//! process session. Entries are stored as the JSON text of
//! `[expires_at, payload, token]`; this module does no expiry checks.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Property holding the time of the last cleanup sweep.
pub const LAST_CLEANUP_PROPERTY: &str = "simplecache.clean.lastexecuted";

/// Property marking that the legacy import already ran in this session.
pub const LEGACY_CHECK_PROPERTY: &str = "simplecache.legacycheck";

/// Ephemeral key/value surface provided by the host.
pub trait PropertyBag: Send + Sync {
    fn get_property(&self, key: &str) -> Option<String>;
    fn set_property(&self, key: &str, value: String);
    fn clear_property(&self, key: &str);
}

/// In-process property bag.
///
/// Clones share the same map, so every cache built from one instance sees
/// the same session state.
#[derive(Debug, Clone, Default)]
pub struct SessionProperties {
    props: Arc<DashMap<String, String>>,
}

impl SessionProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }
}

impl PropertyBag for SessionProperties {
    fn get_property(&self, key: &str) -> Option<String> {
        self.props.get(key).map(|v| v.value().clone())
    }

    fn set_property(&self, key: &str, value: String) {
        self.props.insert(key.to_string(), value);
    }

    fn clear_property(&self, key: &str) {
        self.props.remove(key);
    }
}

/// A cached value as held by the memory layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub expires_at: i64,
    pub payload: String,
    pub token: i64,
}

impl MemoryEntry {
    fn encode(&self) -> Result<String, Error> {
        let triple = (self.expires_at, &self.payload, self.token);
        serde_json::to_string(&triple).map_err(|e| Error::InvalidInput(e.to_string()))
    }

    fn decode(text: &str) -> Result<Self, Error> {
        let (expires_at, payload, token): (i64, String, i64) =
            serde_json::from_str(text).map_err(|e| Error::CorruptEntry(format!("memory entry: {e}")))?;
        Ok(Self { expires_at, payload, token })
    }
}

/// Memory store adapter over a host property bag.
#[derive(Clone)]
pub struct MemoryStore {
    props: Arc<dyn PropertyBag>,
}

impl MemoryStore {
    pub fn new(props: Arc<dyn PropertyBag>) -> Self {
        Self { props }
    }

    /// Read the entry stored under `key`.
    ///
    /// Returns `Ok(None)` if the property is unset and `Error::CorruptEntry`
    /// if it holds text that is not an entry.
    pub fn get(&self, key: &str) -> Result<Option<MemoryEntry>, Error> {
        match self.props.get_property(key) {
            Some(text) if !text.is_empty() => MemoryEntry::decode(&text).map(Some),
            _ => Ok(None),
        }
    }

    pub fn set(&self, key: &str, entry: &MemoryEntry) -> Result<(), Error> {
        self.props.set_property(key, entry.encode()?);
        Ok(())
    }

    pub fn clear(&self, key: &str) {
        self.props.clear_property(key);
    }

    /// Time of the last recorded cleanup sweep, if any.
    ///
    /// An unparsable value reads as absent.
    pub fn last_cleanup(&self) -> Option<DateTime<Utc>> {
        let text = self.props.get_property(LAST_CLEANUP_PROPERTY)?;
        DateTime::parse_from_rfc3339(&text).ok().map(|t| t.with_timezone(&Utc))
    }

    pub fn record_cleanup(&self, at: DateTime<Utc>) {
        self.props.set_property(LAST_CLEANUP_PROPERTY, at.to_rfc3339());
    }

    pub fn legacy_checked(&self) -> bool {
        self.props.get_property(LEGACY_CHECK_PROPERTY).is_some_and(|v| !v.is_empty())
    }

    pub fn mark_legacy_checked(&self) {
        self.props.set_property(LEGACY_CHECK_PROPERTY, "done".to_string());
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store() -> (SessionProperties, MemoryStore) {
        let props = SessionProperties::new();
        let store = MemoryStore::new(Arc::new(props.clone()));
        (props, store)
    }

    #[test]
    fn test_set_get_clear() {
        let (_, store) = store();
        let entry = MemoryEntry { expires_at: 1_700_000_000, payload: r#"{"x":1}"#.into(), token: 7 };

        store.set("a", &entry).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(entry));

        store.clear("a");
        assert!(store.get("a").unwrap().is_none());
    }

    #[test]
    fn test_get_unset() {
        let (_, store) = store();
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_property() {
        let (props, store) = store();
        props.set_property("a", "(123, 'py-repr', 0)".into());
        assert!(matches!(store.get("a"), Err(Error::CorruptEntry(_))));
    }

    #[test]
    fn test_clones_share_session() {
        let (props, store) = store();
        let other = props.clone();
        store.set("k", &MemoryEntry { expires_at: 1, payload: "1".into(), token: 0 }).unwrap();
        assert!(other.get_property("k").is_some());
        assert_eq!(props.len(), 1);
    }

    #[test]
    fn test_last_cleanup_round_trip() {
        let (props, store) = store();
        assert!(store.last_cleanup().is_none());

        let at = Utc::now() - Duration::hours(5);
        store.record_cleanup(at);
        assert_eq!(store.last_cleanup().map(|t| t.timestamp()), Some(at.timestamp()));

        props.set_property(LAST_CLEANUP_PROPERTY, "yesterday".into());
        assert!(store.last_cleanup().is_none());
    }

    #[test]
    fn test_legacy_marker() {
        let (_, store) = store();
        assert!(!store.legacy_checked());
        store.mark_legacy_checked();
        assert!(store.legacy_checked());
    }
}
