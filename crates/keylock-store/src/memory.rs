//! In-memory key-value store
//!
//! Keys carry an optional deadline and a modify index drawn from a global
//! counter. Any write, TTL change or expiry gives the key a new index (or
//! removes it), so a transaction aborts when a watched key's index differs
//! from the one recorded at `watch` time. Expired keys are purged lazily on
//! access.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::traits::{KeyValueStore, MAX_TTL, StoreSession, Ttl, TxOutcome};

struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
    modify_index: u64,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

struct Inner {
    entries: Mutex<HashMap<String, StoredValue>>,
    /// Global index counter
    index: AtomicU64,
    available: AtomicBool,
}

impl Inner {
    fn next_index(&self) -> u64 {
        self.index.fetch_add(1, Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is offline".to_string()))
        }
    }
}

/// Look up a key, dropping it first if its deadline has passed
fn live<'a>(entries: &'a mut HashMap<String, StoredValue>, key: &str) -> Option<&'a mut StoredValue> {
    let now = Instant::now();
    if entries.get(key).is_some_and(|e| e.is_expired(now)) {
        entries.remove(key);
        debug!(key = %key, "Expired key purged");
    }
    entries.get_mut(key)
}

/// In-process store shared by cloning
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                index: AtomicU64::new(1),
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Take the store offline (`false`) or back online (`true`).
    /// While offline every session operation fails with [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .entries
            .lock()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn session(&self) -> Result<Box<dyn StoreSession>> {
        self.inner.check_available()?;
        Ok(Box::new(MemorySession {
            inner: self.inner.clone(),
            watched: Vec::new(),
        }))
    }
}

struct MemorySession {
    inner: Arc<Inner>,
    /// Watched keys with the modify index seen at watch time (`None` = absent)
    watched: Vec<(String, Option<u64>)>,
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn set_if_absent(&mut self, key: &str, value: &str) -> Result<bool> {
        self.inner.check_available()?;
        let mut entries = self.inner.entries.lock();
        if live(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: None,
                modify_index: self.inner.next_index(),
            },
        );
        Ok(true)
    }

    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        self.inner.check_available()?;
        let mut entries = self.inner.entries.lock();
        Ok(live(&mut entries, key).map(|e| e.value.clone()))
    }

    async fn expire(&mut self, key: &str, ttl: Duration) -> Result<bool> {
        self.inner.check_available()?;
        let mut entries = self.inner.entries.lock();
        if live(&mut entries, key).is_none() {
            return Ok(false);
        }
        // A zero TTL deletes the key immediately, as PEXPIRE 0 does
        if ttl.is_zero() {
            entries.remove(key);
            return Ok(true);
        }
        if let Some(entry) = entries.get_mut(key) {
            // None only if the clock cannot represent the deadline; the key stays persistent
            entry.expires_at = Instant::now().checked_add(ttl.min(MAX_TTL));
            entry.modify_index = self.inner.next_index();
        }
        Ok(true)
    }

    async fn ttl(&mut self, key: &str) -> Result<Ttl> {
        self.inner.check_available()?;
        let mut entries = self.inner.entries.lock();
        let ttl = match live(&mut entries, key) {
            None => Ttl::Missing,
            Some(StoredValue {
                expires_at: None, ..
            }) => Ttl::Persistent,
            Some(StoredValue {
                expires_at: Some(at),
                ..
            }) => Ttl::Remaining(at.saturating_duration_since(Instant::now())),
        };
        Ok(ttl)
    }

    async fn watch(&mut self, key: &str) -> Result<()> {
        self.inner.check_available()?;
        let mut entries = self.inner.entries.lock();
        let index = live(&mut entries, key).map(|e| e.modify_index);
        self.watched.push((key.to_string(), index));
        Ok(())
    }

    async fn unwatch(&mut self) -> Result<()> {
        self.inner.check_available()?;
        self.watched.clear();
        Ok(())
    }

    async fn commit_delete(&mut self, key: &str) -> Result<TxOutcome> {
        let watched = std::mem::take(&mut self.watched);
        self.inner.check_available()?;
        let mut entries = self.inner.entries.lock();

        for (watched_key, seen) in &watched {
            let current = live(&mut entries, watched_key).map(|e| e.modify_index);
            if current != *seen {
                debug!(key = %watched_key, "Watched key changed, transaction aborted");
                return Ok(TxOutcome::Aborted);
            }
        }

        entries.remove(key);
        Ok(TxOutcome::Committed)
    }
}
