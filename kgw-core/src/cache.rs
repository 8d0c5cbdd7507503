//! Local event cache fed by the informer and read by workers.

use kgw_sdk::objects::Event;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Errors a cache lookup can report.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Point-in-time lookup of the latest delivered state of an event.
///
/// `Ok(None)` means the event was deleted or never observed; that is not an
/// error.
pub trait EventLookup: Send + Sync {
    fn get_by_key(&self, key: &str) -> Result<Option<Arc<Event>>, LookupError>;
}

/// Thread-safe map of event key to its most recent snapshot.
///
/// Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct EventCache {
    inner: Arc<RwLock<HashMap<String, Arc<Event>>>>,
}

impl EventCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest snapshot. Returns `true` if the key was not cached before.
    pub fn upsert(&self, event: Event) -> bool {
        let key = event.key();
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::new(event))
            .is_none()
    }

    pub fn remove(&self, key: &str) -> Option<Arc<Event>> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Replace the whole cache with a fresh listing.
    ///
    /// Returns the keys that were not cached before, in listing order.
    pub fn replace(&self, events: Vec<Event>) -> Vec<String> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut fresh = HashMap::with_capacity(events.len());
        let mut added = Vec::new();
        for event in events {
            let key = event.key();
            if !map.contains_key(&key) && !fresh.contains_key(&key) {
                added.push(key.clone());
            }
            fresh.insert(key, Arc::new(event));
        }
        *map = fresh;
        added
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventLookup for EventCache {
    fn get_by_key(&self, key: &str) -> Result<Option<Arc<Event>>, LookupError> {
        Ok(self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }
}
