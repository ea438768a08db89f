//! Pending correlations keyed by `messageId`.
//!
//! A continuation is invoked once per matching response and retired on the
//! response whose payload carries the terminal marker. After
//! [`CorrelationRegistry::cancel_all`] nothing registered earlier fires again
//! and new registrations are refused.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::RegistryError;

/// Log target for correlation bookkeeping.
const REGISTRY_TARGET: &str = "shuttle_broker::registry";

/// Callback receiving each response payload for one correlation.
///
/// Runs on the thread that delivered the response and must not block.
pub type Continuation = Box<dyn FnMut(&Value) + Send>;

type Entry = Arc<Mutex<Continuation>>;

/// Concurrent `messageId → continuation` map.
#[derive(Default)]
pub struct CorrelationRegistry {
    entries: Mutex<HashMap<String, Entry>>,
    closed: AtomicBool,
}

impl CorrelationRegistry {
    /// Creates an empty, open registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a continuation for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateId`] when `id` is still pending and
    /// [`RegistryError::Closed`] after shutdown.
    pub fn register(
        &self,
        id: impl Into<String>,
        continuation: Continuation,
    ) -> Result<(), RegistryError> {
        let id = id.into();
        let mut entries = self.lock_entries();
        if self.closed.load(Ordering::Acquire) {
            return Err(RegistryError::Closed);
        }
        if entries.contains_key(&id) {
            return Err(RegistryError::DuplicateId { id });
        }
        debug!(target: REGISTRY_TARGET, message_id = %id, "registered correlation");
        entries.insert(id, Arc::new(Mutex::new(continuation)));
        Ok(())
    }

    /// Delivers `data` to the continuation registered for `id`.
    ///
    /// The entry is removed iff `terminal`. Returns `false` when nothing is
    /// registered for `id`, which is not an error.
    pub fn resolve(&self, id: &str, data: &Value, terminal: bool) -> bool {
        let entry = {
            let mut entries = self.lock_entries();
            if terminal {
                entries.remove(id)
            } else {
                entries.get(id).cloned()
            }
        };
        let Some(entry) = entry else {
            debug!(target: REGISTRY_TARGET, message_id = %id, "no pending correlation");
            return false;
        };

        let mut continuation = entry.lock().unwrap_or_else(|poison| poison.into_inner());
        // Re-checked under the entry lock so a concurrent cancel wins.
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (*continuation)(data)));
        if outcome.is_err() {
            warn!(target: REGISTRY_TARGET, message_id = %id, "continuation panicked");
        }
        if terminal {
            debug!(target: REGISTRY_TARGET, message_id = %id, "retired correlation");
        }
        true
    }

    /// Removes a continuation without invoking it.
    pub fn deregister(&self, id: &str) -> bool {
        self.lock_entries().remove(id).is_some()
    }

    /// Discards every continuation without invoking it and refuses new ones.
    ///
    /// Returns the number of correlations abandoned.
    pub fn cancel_all(&self) -> usize {
        let mut entries = self.lock_entries();
        self.closed.store(true, Ordering::Release);
        let abandoned = entries.len();
        entries.clear();
        if abandoned > 0 {
            debug!(target: REGISTRY_TARGET, abandoned, "cancelled pending correlations");
        }
        abandoned
    }

    /// Whether a continuation is pending for `id`.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.lock_entries().contains_key(id)
    }

    /// Number of pending correlations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    /// Whether no correlations are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    /// Whether [`CorrelationRegistry::cancel_all`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl std::fmt::Debug for CorrelationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationRegistry")
            .field("pending", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
