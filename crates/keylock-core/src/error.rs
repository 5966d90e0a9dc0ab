//! Lock error types
//!
//! A timeout and an ownership mismatch are ordinary outcomes, not store
//! failures: `AcquireError::Timeout` means the lock stayed held for the whole
//! budget, and `release` reports a mismatch as `Ok(false)`.

use std::time::Duration;

use keylock_store::StoreError;

/// Error returned by [`crate::LockClient::acquire`]
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("lock '{name}' unavailable after {waited:?}")]
    Timeout { name: String, waited: Duration },

    #[error("store failure while acquiring lock '{name}': {source}")]
    Store {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("acquire of lock '{name}' cancelled")]
    Cancelled { name: String },
}

impl AcquireError {
    /// The lock was held by someone else for the whole wait
    pub fn is_timeout(&self) -> bool {
        matches!(self, AcquireError::Timeout { .. })
    }

    /// The last attempt failed on the store rather than on contention
    pub fn is_store_failure(&self) -> bool {
        matches!(self, AcquireError::Store { .. })
    }
}

/// Error returned by [`crate::LockClient::release`]
#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    #[error("store failure while releasing lock '{name}': {source}")]
    Store {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("release of lock '{name}' aborted by concurrent writes {attempts} times")]
    Contended { name: String, attempts: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AcquireError::Timeout {
            name: "res".to_string(),
            waited: Duration::from_millis(5000),
        };
        assert_eq!(err.to_string(), "lock 'res' unavailable after 5s");
        assert!(err.is_timeout());
        assert!(!err.is_store_failure());

        let err = AcquireError::Store {
            name: "res".to_string(),
            source: StoreError::PoolTimeout,
        };
        assert_eq!(
            err.to_string(),
            "store failure while acquiring lock 'res': timed out waiting for a pooled connection"
        );
        assert!(err.is_store_failure());

        let err = ReleaseError::Contended {
            name: "res".to_string(),
            attempts: 4,
        };
        assert_eq!(
            err.to_string(),
            "release of lock 'res' aborted by concurrent writes 4 times"
        );
    }
}
