//! Contention run: every worker takes the same lock and decrements a shared
//! counter with a non-atomic read / yield / write. The counter only ends at
//! `workers - acquired` if no two workers were ever inside together.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use keylock_core::LockClient;
use tracing::{error, info, warn};

/// Parameters of one contention run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoSettings {
    pub workers: usize,
    pub resource: String,
    pub acquire_timeout: Duration,
    pub hold_timeout: Duration,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            workers: 500,
            resource: "res".to_string(),
            acquire_timeout: Duration::from_millis(5000),
            hold_timeout: Duration::from_millis(1000),
        }
    }
}

/// Result of a contention run
#[derive(Debug, Clone, Default)]
pub struct ContentionReport {
    pub workers: usize,
    /// Workers that entered the critical section
    pub acquired: usize,
    /// Workers whose acquire ran out of time
    pub timed_out: usize,
    /// Workers stopped by store failures or panics
    pub failed: usize,
    pub final_counter: i64,
    pub elapsed: Duration,
}

impl ContentionReport {
    /// Every decrement happened under exclusive ownership
    pub fn exclusive(&self) -> bool {
        self.final_counter == self.workers as i64 - self.acquired as i64
    }
}

enum WorkerOutcome {
    Acquired,
    TimedOut,
    Failed,
}

pub async fn run_contention(client: LockClient, settings: &DemoSettings) -> ContentionReport {
    let counter = Arc::new(AtomicI64::new(settings.workers as i64));
    let started = Instant::now();

    let tasks: Vec<_> = (0..settings.workers)
        .map(|worker| {
            let client = client.clone();
            let settings = settings.clone();
            let counter = counter.clone();
            tokio::spawn(async move { run_worker(worker, &client, &settings, &counter).await })
        })
        .collect();

    let mut report = ContentionReport {
        workers: settings.workers,
        ..Default::default()
    };
    for result in futures::future::join_all(tasks).await {
        match result {
            Ok(WorkerOutcome::Acquired) => report.acquired += 1,
            Ok(WorkerOutcome::TimedOut) => report.timed_out += 1,
            Ok(WorkerOutcome::Failed) => report.failed += 1,
            Err(e) => {
                error!(error = %e, "Worker task panicked");
                report.failed += 1;
            }
        }
    }

    report.final_counter = counter.load(Ordering::SeqCst);
    report.elapsed = started.elapsed();
    report
}

async fn run_worker(
    worker: usize,
    client: &LockClient,
    settings: &DemoSettings,
    counter: &AtomicI64,
) -> WorkerOutcome {
    let token = match client
        .acquire(
            &settings.resource,
            settings.acquire_timeout,
            settings.hold_timeout,
        )
        .await
    {
        Ok(token) => token,
        Err(e) if e.is_timeout() => {
            warn!(worker, error = %e, "Lock not acquired in time");
            return WorkerOutcome::TimedOut;
        }
        Err(e) => {
            error!(worker, error = %e, "Lock acquire failed");
            return WorkerOutcome::Failed;
        }
    };
    info!(worker, "Worker acquired the lock");

    let current = counter.load(Ordering::SeqCst);
    tokio::task::yield_now().await;
    counter.store(current - 1, Ordering::SeqCst);
    info!(worker, remaining = current - 1, "Counter decremented");

    match client.release(&settings.resource, token.as_str()).await {
        Ok(true) => {}
        Ok(false) => warn!(worker, "Lock expired before it was released"),
        Err(e) => error!(worker, error = %e, "Lock release failed"),
    }

    WorkerOutcome::Acquired
}

#[cfg(test)]
mod tests {
    use super::*;
    use keylock_core::{LockConfig, MemoryStore};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_contention_keeps_counter_consistent() {
        let store = MemoryStore::new();
        let client = LockClient::new(Arc::new(store.clone()), LockConfig::default());
        let settings = DemoSettings {
            workers: 40,
            acquire_timeout: Duration::from_secs(20),
            hold_timeout: Duration::from_secs(5),
            ..Default::default()
        };

        let report = run_contention(client, &settings).await;

        assert_eq!(report.acquired, 40);
        assert_eq!(report.timed_out, 0);
        assert_eq!(report.failed, 0);
        assert_eq!(report.final_counter, 0);
        assert!(report.exclusive());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_contention_reports_timeouts() {
        let store = MemoryStore::new();
        let client = LockClient::new(Arc::new(store.clone()), LockConfig::default());
        let _held = client
            .acquire("res", Duration::from_secs(1), Duration::from_secs(30))
            .await
            .unwrap();

        let settings = DemoSettings {
            workers: 3,
            acquire_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let report = run_contention(client, &settings).await;

        assert_eq!(report.acquired, 0);
        assert_eq!(report.timed_out, 3);
        assert_eq!(report.final_counter, 3);
        assert!(report.exclusive());
    }
}
