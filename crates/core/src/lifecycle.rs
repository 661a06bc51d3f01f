//! Shutdown coordination for the cache engine.
//!
//! - `ShutdownToken`: shared flag raised by `shutdown()` and polled by every
//!   operation.
//! - `AbortSignal`: the host's "process is being torn down" flag.
//! - `BusyRegistry`: in-flight operations, drained before resources are released.
//! - `SweepGuard`: keeps cleanup sweeps from overlapping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Poll interval used while waiting for in-flight operations to finish.
const DRAIN_POLL: Duration = Duration::from_millis(25);

/// Host-provided abort flag, polled at safe points.
pub trait AbortSignal: Send + Sync {
    fn abort_requested(&self) -> bool;
}

/// Abort signal for hosts that never tear down early.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverAbort;

impl AbortSignal for NeverAbort {
    fn abort_requested(&self) -> bool {
        false
    }
}

/// A cancellation token for cooperative shutdown.
///
/// Clones share state: cancelling any clone is observed by all of them.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    cancelled: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl AbortSignal for ShutdownToken {
    fn abort_requested(&self) -> bool {
        self.is_cancelled()
    }
}

/// Registry of in-flight operations.
///
/// Names may repeat (two concurrent `set` calls on one key), so each name
/// carries a count.
#[derive(Debug, Default)]
pub struct BusyRegistry {
    tasks: Mutex<HashMap<String, usize>>,
}

impl BusyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<String, usize>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register an operation; it stays registered until the guard drops.
    pub fn enter(&self, name: impl Into<String>) -> BusyGuard<'_> {
        let name = name.into();
        *self.tasks().entry(name.clone()).or_insert(0) += 1;
        BusyGuard { registry: self, name }
    }

    fn leave(&self, name: &str) {
        let mut tasks = self.tasks();
        if let Some(count) = tasks.get_mut(name) {
            *count -= 1;
            if *count == 0 {
                tasks.remove(name);
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        self.tasks().is_empty()
    }

    /// Number of in-flight operations.
    pub fn len(&self) -> usize {
        self.tasks().values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.is_idle()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks().contains_key(name)
    }

    /// Wait until no operation is registered.
    ///
    /// There is no timeout: an operation that never finishes stalls the
    /// caller forever.
    pub async fn wait_idle(&self) {
        while !self.is_idle() {
            tracing::trace!(in_flight = self.len(), "waiting for busy tasks");
            tokio::time::sleep(DRAIN_POLL).await;
        }
    }
}

/// Registration of one in-flight operation.
#[must_use = "the operation is unregistered as soon as the guard is dropped"]
pub struct BusyGuard<'a> {
    registry: &'a BusyRegistry,
    name: String,
}

impl BusyGuard<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.registry.leave(&self.name);
    }
}

/// Exclusive right to run a cleanup sweep.
pub struct SweepGuard<'a> {
    running: &'a AtomicBool,
}

impl<'a> SweepGuard<'a> {
    /// Returns `None` if a sweep already holds the flag.
    pub fn acquire(running: &'a AtomicBool) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { running })
    }
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}
