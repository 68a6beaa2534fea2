//! Fingerprint-keyed store of live connections.
//!
//! A registry is created once at application start, handed to the
//! [`ConnectionFactory`](super::ConnectionFactory), and drained at shutdown.
//! While in service it only grows: entries are never evicted or re-validated.

use super::fingerprint::ConnectionFingerprint;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct ConnectionRegistry<C> {
    entries: Mutex<HashMap<ConnectionFingerprint, Arc<C>>>,
}

impl<C> ConnectionRegistry<C> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionFingerprint, Arc<C>>> {
        // A panic inside `build` cannot leave a half-written entry behind.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the entry for `key`, calling `build` to create it on a miss.
    ///
    /// The lookup and the insert happen under one lock, so concurrent first
    /// callers for the same key get the same `Arc` and a successful `build`
    /// runs once. A failed `build` inserts nothing. The second value is
    /// `true` when this call created the entry.
    pub fn get_or_try_insert_with<F, E>(
        &self,
        key: ConnectionFingerprint,
        build: F,
    ) -> Result<(Arc<C>, bool), E>
    where
        F: FnOnce() -> Result<C, E>,
    {
        let mut entries = self.lock();
        if let Some(existing) = entries.get(&key) {
            return Ok((Arc::clone(existing), false));
        }
        let created = Arc::new(build()?);
        entries.insert(key, Arc::clone(&created));
        Ok((created, true))
    }

    pub fn get(&self, key: &ConnectionFingerprint) -> Option<Arc<C>> {
        self.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &ConnectionFingerprint) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove and return every entry. Used at shutdown.
    pub fn drain(&self) -> Vec<(ConnectionFingerprint, Arc<C>)> {
        self.lock().drain().collect()
    }
}

impl<C> Default for ConnectionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> std::fmt::Debug for ConnectionRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("entries", &self.len())
            .finish()
    }
}
