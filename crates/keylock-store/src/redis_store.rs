//! Pooled Redis backend
//!
//! Each [`StoreSession`] owns one pooled connection for its lifetime, so a
//! `WATCH` issued on a session is seen by the `EXEC` issued on that same
//! session. TTLs are installed with millisecond precision (`PEXPIRE`/`PTTL`).

use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use bb8_redis::RedisConnectionManager;
use serde::Deserialize;
use tracing::info;

use crate::error::{Result, StoreError};
use crate::traits::{KeyValueStore, MAX_TTL, StoreSession, Ttl, TxOutcome};

/// Connection pool settings for [`RedisStore`]
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RedisPoolConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379/0`
    pub url: String,
    /// Maximum number of pooled connections
    pub max_connections: u32,
    /// Idle connections the pool keeps open
    pub min_idle: u32,
    /// Maximum time to wait for a free connection, in milliseconds
    pub max_wait_ms: u64,
    /// Validate a connection with `PING` before handing it out
    pub test_on_checkout: bool,
}

impl Default for RedisPoolConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            max_connections: 500,
            min_idle: 8,
            max_wait_ms: 100_000,
            test_on_checkout: true,
        }
    }
}

impl RedisPoolConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_min_idle(mut self, min_idle: u32) -> Self {
        self.min_idle = min_idle;
        self
    }

    pub fn with_max_wait_ms(mut self, max_wait_ms: u64) -> Self {
        self.max_wait_ms = max_wait_ms;
        self
    }
}

/// Redis-backed store using a `bb8` connection pool
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool<RedisConnectionManager>,
}

impl RedisStore {
    /// Build the pool and open the idle connections
    pub async fn connect(config: &RedisPoolConfig) -> Result<Self> {
        if config.max_connections == 0 {
            return Err(StoreError::InvalidConfig(
                "max_connections must be greater than zero".to_string(),
            ));
        }
        if config.max_wait_ms == 0 {
            return Err(StoreError::InvalidConfig(
                "max_wait_ms must be greater than zero".to_string(),
            ));
        }

        let manager = RedisConnectionManager::new(config.url.as_str())?;
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(config.min_idle.min(config.max_connections)))
            .connection_timeout(Duration::from_millis(config.max_wait_ms))
            .test_on_check_out(config.test_on_checkout)
            .build(manager)
            .await?;

        info!(
            url = %config.url,
            max_connections = config.max_connections,
            min_idle = config.min_idle,
            "Redis connection pool initialized"
        );

        Ok(Self { pool })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn session(&self) -> Result<Box<dyn StoreSession>> {
        let conn = self.pool.get_owned().await?;
        Ok(Box::new(RedisSession { conn }))
    }
}

struct RedisSession {
    conn: PooledConnection<'static, RedisConnectionManager>,
}

/// Round up to whole milliseconds so a sub-millisecond TTL never becomes zero
fn ttl_millis(ttl: Duration) -> u64 {
    // MAX_TTL in milliseconds fits in u64 and keeps PEXPIRE in range
    ttl.min(MAX_TTL).as_nanos().div_ceil(1_000_000) as u64
}

#[async_trait]
impl StoreSession for RedisSession {
    async fn set_if_absent(&mut self, key: &str, value: &str) -> Result<bool> {
        let set: bool = redis::cmd("SETNX")
            .arg(key)
            .arg(value)
            .query_async(&mut *self.conn)
            .await?;
        Ok(set)
    }

    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut *self.conn)
            .await?;
        Ok(value)
    }

    async fn expire(&mut self, key: &str, ttl: Duration) -> Result<bool> {
        let applied: bool = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(ttl))
            .query_async(&mut *self.conn)
            .await?;
        Ok(applied)
    }

    async fn ttl(&mut self, key: &str) -> Result<Ttl> {
        let millis: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut *self.conn)
            .await?;
        let ttl = match millis {
            -1 => Ttl::Persistent,
            n if n >= 0 => Ttl::Remaining(Duration::from_millis(n as u64)),
            _ => Ttl::Missing,
        };
        Ok(ttl)
    }

    async fn watch(&mut self, key: &str) -> Result<()> {
        let _: () = redis::cmd("WATCH")
            .arg(key)
            .query_async(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn unwatch(&mut self) -> Result<()> {
        let _: () = redis::cmd("UNWATCH").query_async(&mut *self.conn).await?;
        Ok(())
    }

    async fn commit_delete(&mut self, key: &str) -> Result<TxOutcome> {
        // EXEC replies nil when a watched key changed
        let reply: Option<(i64,)> = redis::pipe()
            .atomic()
            .del(key)
            .query_async(&mut *self.conn)
            .await?;
        Ok(match reply {
            Some(_) => TxOutcome::Committed,
            None => TxOutcome::Aborted,
        })
    }
}
