//! Keylock Core - distributed locks over a shared key-value store
//!
//! This crate provides:
//! - `LockClient`: polling acquire with TTL healing and watch-guarded release
//! - `LockConfig`: retry and backoff settings
//! - `TokenGenerator`: unpredictable owner tokens
//! - Metrics recorded through the `metrics` facade
//!
//! A lock named `N` lives in the store under the key `lock:N`; its value is the
//! holder's token and its TTL bounds how long a crashed holder can block others.

pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod token;

pub use client::{LockClient, LockToken};
pub use config::LockConfig;
pub use error::{AcquireError, ReleaseError};
pub use token::{TokenGenerator, UuidTokenGenerator};

// Store contract re-exports
pub use keylock_store::{KeyValueStore, MemoryStore, StoreError};
#[cfg(feature = "redis")]
pub use keylock_store::{RedisPoolConfig, RedisStore};

/// Prefix prepended to every lock name to form its store key
pub const LOCK_KEY_PREFIX: &str = "lock:";

/// Store key materializing the lock `name`
pub fn lock_key(name: &str) -> String {
    format!("{}{}", LOCK_KEY_PREFIX, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lock_key() {
        assert_eq!(lock_key("res"), "lock:res");
        assert_eq!(lock_key(""), "lock:");
    }

    proptest! {
        #[test]
        fn prop_lock_key_is_prefixed(name in ".*") {
            let key = lock_key(&name);
            prop_assert!(key.starts_with(LOCK_KEY_PREFIX));
            prop_assert_eq!(&key[LOCK_KEY_PREFIX.len()..], name.as_str());
        }

        #[test]
        fn prop_distinct_names_distinct_keys(a in "[a-z:]{0,8}", b in "[a-z:]{0,8}") {
            prop_assume!(a != b);
            prop_assert_ne!(lock_key(&a), lock_key(&b));
        }
    }
}
