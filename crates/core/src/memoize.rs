//! Memoization helpers for methods whose results are worth caching.
//!
//! ```ignore
//! let key = CallKey::for_method::<Catalog>("lookup").arg(id);
//! let item = use_cache(&catalog, &key, CallOptions::default(), || catalog.fetch(id)).await;
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::engine::SimpleCache;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Something that owns a cache and may opt out of it wholesale.
pub trait CacheHolder {
    fn cache(&self) -> &SimpleCache;

    /// When true every memoized call on this holder recomputes.
    fn ignore_cache(&self) -> bool {
        false
    }
}

impl CacheHolder for SimpleCache {
    fn cache(&self) -> &SimpleCache {
        self
    }
}

/// Cache key for one call: owner type, method and positional arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallKey(String);

impl CallKey {
    /// Start a key for `method` on `Owner`, named by the type's short name.
    pub fn for_method<Owner: ?Sized>(method: &str) -> Self {
        let owner = short_type_name(std::any::type_name::<Owner>());
        Self(format!("{owner}.{method}").to_lowercase())
    }

    /// Append a positional argument.
    #[must_use]
    pub fn arg(mut self, value: impl Display) -> Self {
        self.0.push('.');
        self.0.push_str(&value.to_string().to_lowercase());
        self
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CallKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-call options. They never enter the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOptions {
    pub ignore_cache: bool,
    pub cache_days: u32,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self { ignore_cache: false, cache_days: 14 }
    }
}

impl CallOptions {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.cache_days) * SECS_PER_DAY)
    }

    fn bypass(&self, holder: &(impl CacheHolder + ?Sized)) -> bool {
        self.ignore_cache || holder.ignore_cache()
    }
}

/// Return the cached result for `key`, or run `f` and cache what it returns.
pub async fn use_cache<H, T, F, Fut>(holder: &H, key: &CallKey, opts: CallOptions, f: F) -> T
where
    H: CacheHolder + ?Sized,
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    if !opts.bypass(holder)
        && let Some(hit) = holder.cache().get::<T>(key.as_str(), "").await
    {
        return hit;
    }

    let value = f().await;
    holder.cache().set(key.as_str(), &value, "", Some(opts.retention())).await;
    value
}

/// Like [`use_cache`] for fallible work; errors are returned and not cached.
pub async fn try_use_cache<H, T, E, F, Fut>(holder: &H, key: &CallKey, opts: CallOptions, f: F) -> Result<T, E>
where
    H: CacheHolder + ?Sized,
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if !opts.bypass(holder)
        && let Some(hit) = holder.cache().get::<T>(key.as_str(), "").await
    {
        return Ok(hit);
    }

    let value = f().await?;
    holder.cache().set(key.as_str(), &value, "", Some(opts.retention())).await;
    Ok(value)
}

fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
