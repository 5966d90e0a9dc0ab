//! Configuration management for the demo driver
//!
//! Sources, lowest precedence first:
//! - `conf/keylock.yml` (or the file given with `--config`), optional
//! - `KEYLOCK_*` environment variables, `__` separating nested keys
//!   (e.g. `KEYLOCK_DEMO__WORKERS=50`, `KEYLOCK_REDIS__URL=redis://cache:6379`)
//! - command line flags

use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use config::{Config, ConfigError, Environment, File};
use keylock_core::LockConfig;
use keylock_store::RedisPoolConfig;
use serde::de::DeserializeOwned;

use crate::logging::LoggingConfig;
use crate::service::DemoSettings;

pub const DEFAULT_CONFIG_FILE: &str = "conf/keylock.yml";

pub const STORE_PROPERTY: &str = "store";
pub const DEMO_WORKERS_PROPERTY: &str = "demo.workers";
pub const DEMO_RESOURCE_PROPERTY: &str = "demo.resource";
pub const DEMO_ACQUIRE_TIMEOUT_PROPERTY: &str = "demo.acquire_timeout_ms";
pub const DEMO_HOLD_TIMEOUT_PROPERTY: &str = "demo.hold_timeout_ms";
pub const REDIS_URL_PROPERTY: &str = "redis.url";

/// Backend the demo coordinates through
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    Memory,
    Redis,
}

impl StoreKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreKind::Memory => "memory",
            StoreKind::Redis => "redis",
        }
    }
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "redis" => Ok(StoreKind::Redis),
            other => anyhow::bail!("unknown store '{}', expected 'memory' or 'redis'", other),
        }
    }
}

/// Command line arguments for the demo
#[derive(Debug, Parser)]
#[command(name = "keylock-demo", about = "Run many workers contending for one distributed lock")]
pub struct Cli {
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: String,
    #[arg(short = 's', long = "store", value_enum)]
    pub store: Option<StoreKind>,
    #[arg(short = 'w', long = "workers")]
    pub workers: Option<u32>,
    #[arg(short = 'r', long = "resource")]
    pub resource: Option<String>,
    #[arg(long = "redis-url")]
    pub redis_url: Option<String>,
    #[arg(long = "acquire-timeout-ms")]
    pub acquire_timeout_ms: Option<u32>,
    #[arg(long = "hold-timeout-ms")]
    pub hold_timeout_ms: Option<u32>,
}

/// Layered demo configuration
#[derive(Clone, Debug)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::with_name(&cli.config_file).required(false))
            .add_source(
                Environment::with_prefix("keylock")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(v) = cli.store {
            builder = builder.set_override(STORE_PROPERTY, v.as_str())?;
        }
        if let Some(v) = cli.workers {
            builder = builder.set_override(DEMO_WORKERS_PROPERTY, i64::from(v))?;
        }
        if let Some(v) = &cli.resource {
            builder = builder.set_override(DEMO_RESOURCE_PROPERTY, v.as_str())?;
        }
        if let Some(v) = &cli.redis_url {
            builder = builder.set_override(REDIS_URL_PROPERTY, v.as_str())?;
        }
        if let Some(v) = cli.acquire_timeout_ms {
            builder = builder.set_override(DEMO_ACQUIRE_TIMEOUT_PROPERTY, i64::from(v))?;
        }
        if let Some(v) = cli.hold_timeout_ms {
            builder = builder.set_override(DEMO_HOLD_TIMEOUT_PROPERTY, i64::from(v))?;
        }

        Ok(Configuration {
            config: builder.build()?,
        })
    }

    fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.config
            .get_int(key)
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(default)
    }

    /// Deserialize a section, falling back to its defaults when absent
    fn section<T: DeserializeOwned + Default>(&self, key: &str) -> anyhow::Result<T> {
        match self.config.get::<T>(key) {
            Ok(v) => Ok(v),
            Err(ConfigError::NotFound(_)) => Ok(T::default()),
            Err(e) => Err(e.into()),
        }
    }

    // ========================================================================
    // Store Configuration
    // ========================================================================

    pub fn store_kind(&self) -> anyhow::Result<StoreKind> {
        self.config
            .get_string(STORE_PROPERTY)
            .unwrap_or_else(|_| StoreKind::Memory.as_str().to_string())
            .parse()
    }

    pub fn redis_pool_config(&self) -> anyhow::Result<RedisPoolConfig> {
        self.section("redis")
    }

    // ========================================================================
    // Lock Configuration
    // ========================================================================

    pub fn lock_config(&self) -> anyhow::Result<LockConfig> {
        self.section("lock")
    }

    // ========================================================================
    // Demo Configuration
    // ========================================================================

    pub fn demo_settings(&self) -> DemoSettings {
        let defaults = DemoSettings::default();
        DemoSettings {
            workers: self.get_u64(DEMO_WORKERS_PROPERTY, defaults.workers as u64) as usize,
            resource: self
                .config
                .get_string(DEMO_RESOURCE_PROPERTY)
                .unwrap_or(defaults.resource),
            acquire_timeout: Duration::from_millis(self.get_u64(
                DEMO_ACQUIRE_TIMEOUT_PROPERTY,
                defaults.acquire_timeout.as_millis() as u64,
            )),
            hold_timeout: Duration::from_millis(self.get_u64(
                DEMO_HOLD_TIMEOUT_PROPERTY,
                defaults.hold_timeout.as_millis() as u64,
            )),
        }
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_config(
            self.config.get_string("logging.dir").ok(),
            self.config.get_bool("logging.console").unwrap_or(true),
            self.config.get_bool("logging.file").unwrap_or(false),
            self.config
                .get_string("logging.level")
                .unwrap_or("info".to_string()),
            self.config
                .get_string("logging.rotation")
                .unwrap_or("daily".to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogRotation;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".yml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn cli_for(path: &str, extra: &[&str]) -> Cli {
        let mut args = vec!["keylock-demo", "--config", path];
        args.extend_from_slice(extra);
        Cli::parse_from(args)
    }

    #[test]
    fn test_defaults_without_file() {
        let cli = cli_for("does/not/exist.yml", &[]);
        let configuration = Configuration::load(&cli).unwrap();

        assert_eq!(configuration.store_kind().unwrap(), StoreKind::Memory);
        assert_eq!(configuration.lock_config().unwrap(), LockConfig::default());

        let demo = configuration.demo_settings();
        assert_eq!(demo.workers, 500);
        assert_eq!(demo.resource, "res");
        assert_eq!(demo.acquire_timeout, Duration::from_millis(5000));
        assert_eq!(demo.hold_timeout, Duration::from_millis(1000));

        let redis = configuration.redis_pool_config().unwrap();
        assert_eq!(redis.max_connections, 500);

        assert_eq!(configuration.logging_config().rotation, LogRotation::Daily);
    }

    #[test]
    fn test_file_values() {
        let file = write_config(
            r#"
store: redis
demo:
  workers: 20
  resource: orders
lock:
  retry_backoff_ms: 25
  release_max_retries: 5
redis:
  url: redis://cache:6002
  min_idle: 2
logging:
  level: debug
  rotation: never
"#,
        );
        let cli = cli_for(file.path().to_str().unwrap(), &[]);
        let configuration = Configuration::load(&cli).unwrap();

        assert_eq!(configuration.store_kind().unwrap(), StoreKind::Redis);
        let demo = configuration.demo_settings();
        assert_eq!(demo.workers, 20);
        assert_eq!(demo.resource, "orders");

        let lock = configuration.lock_config().unwrap();
        assert_eq!(lock.retry_backoff_ms, 25);
        assert_eq!(lock.release_max_retries, Some(5));
        assert_eq!(lock.release_retry_backoff_ms, 0);

        let redis = configuration.redis_pool_config().unwrap();
        assert_eq!(redis.url, "redis://cache:6002");
        assert_eq!(redis.min_idle, 2);
        assert_eq!(redis.max_connections, 500);

        let logging = configuration.logging_config();
        assert_eq!(logging.level, tracing::Level::DEBUG);
        assert_eq!(logging.rotation, LogRotation::Never);
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = write_config("store: redis\ndemo:\n  workers: 20\n");
        let cli = cli_for(
            file.path().to_str().unwrap(),
            &["--store", "memory", "--workers", "3", "--hold-timeout-ms", "250"],
        );
        let configuration = Configuration::load(&cli).unwrap();

        assert_eq!(configuration.store_kind().unwrap(), StoreKind::Memory);
        let demo = configuration.demo_settings();
        assert_eq!(demo.workers, 3);
        assert_eq!(demo.hold_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_store_kind_parse() {
        assert_eq!("Redis".parse::<StoreKind>().unwrap(), StoreKind::Redis);
        assert!("etcd".parse::<StoreKind>().is_err());
    }
}
