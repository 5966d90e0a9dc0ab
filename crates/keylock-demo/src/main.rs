//! Main entry point for the keylock contention demo.

use std::sync::Arc;

use clap::Parser;
use keylock_core::LockClient;
use keylock_demo::{Cli, Configuration, StoreKind, init_logging, run_contention};
use keylock_store::{KeyValueStore, MemoryStore, RedisStore};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let configuration = Configuration::load(&cli)?;
    let _logging_guard = init_logging(&configuration.logging_config())?;

    keylock_core::metrics::describe_metrics();

    let store: Arc<dyn KeyValueStore> = match configuration.store_kind()? {
        StoreKind::Memory => {
            info!("Using in-process memory store");
            Arc::new(MemoryStore::new())
        }
        StoreKind::Redis => {
            let pool_config = configuration.redis_pool_config()?;
            Arc::new(RedisStore::connect(&pool_config).await?)
        }
    };

    let client = LockClient::new(store, configuration.lock_config()?);
    let settings = configuration.demo_settings();
    info!(
        workers = settings.workers,
        resource = %settings.resource,
        acquire_timeout_ms = settings.acquire_timeout.as_millis() as u64,
        hold_timeout_ms = settings.hold_timeout.as_millis() as u64,
        "Starting contention run"
    );

    let report = run_contention(client, &settings).await;
    info!(
        acquired = report.acquired,
        timed_out = report.timed_out,
        failed = report.failed,
        final_counter = report.final_counter,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Contention run finished"
    );

    if !report.exclusive() {
        error!(
            final_counter = report.final_counter,
            expected = report.workers as i64 - report.acquired as i64,
            "Counter inconsistent: critical sections overlapped"
        );
        anyhow::bail!("mutual exclusion violated");
    }

    Ok(())
}
