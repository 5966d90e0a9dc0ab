//! Lock client
//!
//! Acquire polls a conditional write (`SETNX`) until it wins, the deadline
//! passes, or the caller cancels. Each losing attempt installs a TTL on the
//! existing key if it has none, so a holder that crashed between the write and
//! its `EXPIRE` cannot block the lock forever.
//!
//! Release watches the key, checks that it still holds the caller's token and
//! deletes it in a transaction that aborts if the key changed in between. An
//! aborted transaction is retried from the watch.
//!
//! A store connection is taken per attempt and returned before any backoff
//! sleep.

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use keylock_store::{KeyValueStore, StoreError, Ttl, TxOutcome};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::LockConfig;
use crate::error::{AcquireError, ReleaseError};
use crate::lock_key;
use crate::metrics;
use crate::token::{TokenGenerator, UuidTokenGenerator};

/// Shortest TTL ever installed on a lock key
const MIN_HOLD: Duration = Duration::from_millis(1);

/// Deadline horizon used when `started + acquire_timeout` is not representable
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Ownership token returned by a successful acquire
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for LockToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for LockToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

enum ReleaseAttempt {
    Released,
    NotOwner,
    Aborted,
}

/// Client for named locks held in a shared [`KeyValueStore`]
///
/// Cheap to clone; clones share the store handle.
#[derive(Clone)]
pub struct LockClient {
    store: Arc<dyn KeyValueStore>,
    tokens: Arc<dyn TokenGenerator>,
    config: LockConfig,
}

impl LockClient {
    pub fn new(store: Arc<dyn KeyValueStore>, config: LockConfig) -> Self {
        Self {
            store,
            tokens: Arc::new(UuidTokenGenerator),
            config,
        }
    }

    /// Replace the default UUID token source
    pub fn with_token_generator(mut self, tokens: Arc<dyn TokenGenerator>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Acquire the lock `name`, waiting up to `acquire_timeout`.
    ///
    /// On success the lock expires after `hold_timeout` unless released first.
    pub async fn acquire(
        &self,
        name: &str,
        acquire_timeout: Duration,
        hold_timeout: Duration,
    ) -> Result<LockToken, AcquireError> {
        self.acquire_with_cancel(name, acquire_timeout, hold_timeout, &CancellationToken::new())
            .await
    }

    /// Same as [`LockClient::acquire`], returning [`AcquireError::Cancelled`]
    /// as soon as `cancel` fires.
    pub async fn acquire_with_cancel(
        &self,
        name: &str,
        acquire_timeout: Duration,
        hold_timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<LockToken, AcquireError> {
        let started = Instant::now();
        let result = self
            .poll_acquire(name, acquire_timeout, hold_timeout, cancel)
            .await;

        let outcome = match &result {
            Ok(_) => "acquired",
            Err(AcquireError::Timeout { .. }) => "timeout",
            Err(AcquireError::Store { .. }) => "store_error",
            Err(AcquireError::Cancelled { .. }) => "cancelled",
        };
        metrics::record_acquire(outcome, started.elapsed());

        result
    }

    async fn poll_acquire(
        &self,
        name: &str,
        acquire_timeout: Duration,
        hold_timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<LockToken, AcquireError> {
        let token = self.tokens.generate();
        let key = lock_key(name);
        let hold = hold_timeout.max(MIN_HOLD);
        let backoff = self.config.retry_backoff();

        let started = Instant::now();
        let deadline = started
            .checked_add(acquire_timeout)
            .unwrap_or_else(|| started + FAR_FUTURE);
        let mut attempt: u32 = 0;
        let mut last_error: Option<StoreError> = None;

        while Instant::now() < deadline {
            if cancel.is_cancelled() {
                return Err(AcquireError::Cancelled {
                    name: name.to_string(),
                });
            }

            attempt += 1;
            match self.try_acquire(&key, &token, hold).await {
                Ok(true) => {
                    debug!(key = %key, attempt, "Lock acquired");
                    return Ok(LockToken(token));
                }
                Ok(false) => last_error = None,
                Err(e) => {
                    warn!(key = %key, attempt, error = %e, "Store error during lock acquire attempt");
                    last_error = Some(e);
                }
            }

            // Never sleep past the deadline
            let pause = backoff.min(deadline.saturating_duration_since(Instant::now()));
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(key = %key, attempt, "Lock acquire cancelled");
                    return Err(AcquireError::Cancelled {
                        name: name.to_string(),
                    });
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }

        debug!(key = %key, attempt, "Lock acquire deadline reached");
        Err(match last_error {
            Some(source) => AcquireError::Store {
                name: name.to_string(),
                source,
            },
            None => AcquireError::Timeout {
                name: name.to_string(),
                waited: started.elapsed(),
            },
        })
    }

    /// One conditional write. Heals a missing TTL when the write loses.
    async fn try_acquire(&self, key: &str, token: &str, hold: Duration) -> Result<bool, StoreError> {
        let mut session = self.store.session().await?;

        if session.set_if_absent(key, token).await? {
            // The key is ours even without a TTL; the next contender installs one
            if let Err(e) = session.expire(key, hold).await {
                warn!(key = %key, error = %e, "Lock acquired but its TTL could not be installed");
            }
            return Ok(true);
        }

        if session.ttl(key).await? == Ttl::Persistent {
            session.expire(key, hold).await?;
            metrics::record_ttl_heal();
            debug!(
                key = %key,
                hold_ms = hold.as_millis() as u64,
                "Installed missing TTL on orphaned lock key"
            );
        }

        Ok(false)
    }

    /// Release the lock `name` if `token` is its current holder.
    ///
    /// Returns `Ok(false)` when the lock is free or held under another token;
    /// the key is left untouched in that case.
    pub async fn release(&self, name: &str, token: &str) -> Result<bool, ReleaseError> {
        let result = self.release_until_decided(name, token).await;

        let outcome = match &result {
            Ok(true) => "released",
            Ok(false) => "not_owner",
            Err(ReleaseError::Store { .. }) => "store_error",
            Err(ReleaseError::Contended { .. }) => "contended",
        };
        metrics::record_release(outcome);

        result
    }

    async fn release_until_decided(&self, name: &str, token: &str) -> Result<bool, ReleaseError> {
        let key = lock_key(name);
        let store_failure = |source: StoreError| ReleaseError::Store {
            name: name.to_string(),
            source,
        };
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            match self.try_release(&key, token).await.map_err(store_failure)? {
                ReleaseAttempt::Released => {
                    debug!(key = %key, attempts, "Lock released");
                    return Ok(true);
                }
                ReleaseAttempt::NotOwner => {
                    debug!(key = %key, "Lock not held by this token, nothing released");
                    return Ok(false);
                }
                ReleaseAttempt::Aborted => {
                    if let Some(max_retries) = self.config.release_max_retries
                        && attempts > max_retries
                    {
                        warn!(key = %key, attempts, "Giving up lock release after repeated aborts");
                        return Err(ReleaseError::Contended {
                            name: name.to_string(),
                            attempts,
                        });
                    }

                    debug!(key = %key, attempts, "Lock release transaction aborted, retrying");
                    let pause = self.config.release_retry_backoff();
                    if !pause.is_zero() {
                        tokio::time::sleep(pause).await;
                    }
                }
            }
        }
    }

    /// One watch / verify / guarded-delete cycle on a fresh connection
    async fn try_release(&self, key: &str, token: &str) -> Result<ReleaseAttempt, StoreError> {
        let mut session = self.store.session().await?;

        session.watch(key).await?;
        if session.get(key).await?.as_deref() != Some(token) {
            session.unwatch().await?;
            return Ok(ReleaseAttempt::NotOwner);
        }

        Ok(match session.commit_delete(key).await? {
            TxOutcome::Committed => ReleaseAttempt::Released,
            TxOutcome::Aborted => ReleaseAttempt::Aborted,
        })
    }
}
