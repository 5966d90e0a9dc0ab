// Metrics for lock acquire/release outcomes
// Recorded through the `metrics` facade; nothing is exported unless the
// application installs a recorder

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Register metric descriptions
/// Should be called once at application startup, after installing a recorder
pub fn describe_metrics() {
    describe_counter!(
        "keylock_acquire_total",
        "Total number of lock acquire calls by outcome"
    );
    describe_histogram!(
        "keylock_acquire_wait_seconds",
        "Time spent inside acquire before it returned"
    );
    describe_counter!(
        "keylock_release_total",
        "Total number of lock release calls by outcome"
    );
    describe_counter!(
        "keylock_ttl_heal_total",
        "Total number of TTLs installed on orphaned lock keys"
    );
}

/// Record the end of an acquire call
pub fn record_acquire(outcome: &'static str, waited: Duration) {
    counter!("keylock_acquire_total", "outcome" => outcome).increment(1);
    histogram!("keylock_acquire_wait_seconds", "outcome" => outcome).record(waited.as_secs_f64());
}

/// Record the end of a release call
pub fn record_release(outcome: &'static str) {
    counter!("keylock_release_total", "outcome" => outcome).increment(1);
}

/// Record a TTL installed on a key that had none
pub fn record_ttl_heal() {
    counter!("keylock_ttl_heal_total").increment(1);
}
