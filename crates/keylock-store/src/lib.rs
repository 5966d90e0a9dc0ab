//! Keylock Store - the key-value contract used for lock coordination
//!
//! This crate provides:
//! - `KeyValueStore` / `StoreSession`: the minimal store contract (conditional
//!   set, read, TTL management, watch + conditional delete)
//! - `MemoryStore`: an in-process backend with Redis-compatible watch semantics
//! - `RedisStore`: a pooled Redis backend (feature `redis`, enabled by default)

pub mod error;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::{RedisPoolConfig, RedisStore};
pub use traits::{KeyValueStore, MAX_TTL, StoreSession, Ttl, TxOutcome};
