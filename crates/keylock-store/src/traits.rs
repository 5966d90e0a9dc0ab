//! Store contract consumed by the lock client
//!
//! A [`KeyValueStore`] hands out [`StoreSession`]s. A session is a single
//! scoped connection: watch state lives on it, and dropping it returns the
//! connection to its pool.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Longest TTL a backend installs; longer requests are clamped to it
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Remaining lifetime of a key as reported by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Key does not exist
    Missing,
    /// Key exists without an expiry
    Persistent,
    /// Key expires after the given duration
    Remaining(Duration),
}

/// Result of committing a watched transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Committed,
    /// A watched key changed between `watch` and commit; nothing was applied
    Aborted,
}

/// Shared key-value store able to open sessions
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Borrow a connection for the duration of the returned session
    async fn session(&self) -> Result<Box<dyn StoreSession>>;
}

/// Operations available on one store connection
#[async_trait]
pub trait StoreSession: Send {
    /// Set `key` to `value` only if the key is absent. Returns whether it took effect.
    async fn set_if_absent(&mut self, key: &str, value: &str) -> Result<bool>;

    async fn get(&mut self, key: &str) -> Result<Option<String>>;

    /// Install a TTL on an existing key. Returns `false` if the key is absent.
    async fn expire(&mut self, key: &str, ttl: Duration) -> Result<bool>;

    async fn ttl(&mut self, key: &str) -> Result<Ttl>;

    /// Watch `key` for modification until the next commit or `unwatch`
    async fn watch(&mut self, key: &str) -> Result<()>;

    async fn unwatch(&mut self) -> Result<()>;

    /// Delete `key` in a transaction conditioned on every watched key being
    /// unchanged. Clears the watch set whatever the outcome.
    async fn commit_delete(&mut self, key: &str) -> Result<TxOutcome>;
}
