//! In-flight bookkeeping for invocations.
//!
//! At most one exchange per `(protocol, command)` pair may be outstanding.
//! A slot is taken with [`InFlightTracker::try_acquire`] and handed back
//! when the returned [`InFlightGuard`] drops, so a cancelled, failed or
//! timed-out invocation never leaks its slot.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{DynwireError, Result};

type Key = (String, String);

/// Shared set of outstanding `(protocol, command)` pairs.
#[derive(Debug, Clone, Default)]
pub struct InFlightTracker {
    slots: Arc<Mutex<HashSet<Key>>>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Key>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the slot for `(protocol, command)`.
    ///
    /// # Errors
    ///
    /// [`DynwireError::InFlight`] if the pair is already outstanding.
    pub fn try_acquire(&self, protocol: &str, command: &str) -> Result<InFlightGuard> {
        let key = (protocol.to_string(), command.to_string());
        if !self.lock().insert(key.clone()) {
            return Err(DynwireError::InFlight {
                protocol: key.0,
                command: key.1,
            });
        }
        Ok(InFlightGuard {
            tracker: self.clone(),
            key: Some(key),
        })
    }

    /// Whether `(protocol, command)` is outstanding.
    pub fn is_in_flight(&self, protocol: &str, command: &str) -> bool {
        self.lock()
            .contains(&(protocol.to_string(), command.to_string()))
    }

    /// Outstanding pairs, sorted.
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<_> = self.lock().iter().cloned().collect();
        pairs.sort();
        pairs
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn release(&self, key: &Key) {
        self.lock().remove(key);
    }
}

/// Releases its in-flight slot on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    tracker: InFlightTracker,
    key: Option<Key>,
}

impl InFlightGuard {
    /// Release the slot now.
    pub fn release(mut self) {
        if let Some(key) = self.key.take() {
            self.tracker.release(&key);
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.tracker.release(&key);
        }
    }
}
