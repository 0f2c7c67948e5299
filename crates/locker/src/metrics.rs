//! Prometheus metrics for lock traffic.
//!
//! The metrics are created lazily and registered into the host's registry
//! through [`register`].

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

pub static LOCKS_ACQUIRED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "sdms_locks_acquired_total",
            "Total number of dataset locks granted, by kind",
        ),
        &["kind"],
    )
    .expect("metric creation failed")
});

pub static LOCK_CONFLICTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "sdms_lock_conflicts_total",
            "Total number of lock requests refused because of an incompatible lock",
        ),
        &["kind"],
    )
    .expect("metric creation failed")
});

pub static LOCKS_RELEASED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sdms_locks_released_total",
        "Total number of unlock calls that removed a holder",
    )
    .expect("metric creation failed")
});

pub static MUTEX_RETRIES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sdms_mutex_retries_total",
        "Total number of failed mutex acquisition attempts",
    )
    .expect("metric creation failed")
});

pub static MUTEX_TIMEOUTS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sdms_mutex_timeouts_total",
        "Total number of mutex acquisitions that exhausted the retry budget",
    )
    .expect("metric creation failed")
});

/// Register the locker metrics into `registry`.
pub fn register(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(LOCKS_ACQUIRED.clone()))?;
    registry.register(Box::new(LOCK_CONFLICTS.clone()))?;
    registry.register(Box::new(LOCKS_RELEASED.clone()))?;
    registry.register(Box::new(MUTEX_RETRIES.clone()))?;
    registry.register(Box::new(MUTEX_TIMEOUTS.clone()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_into_fresh_registry() {
        let registry = Registry::new();
        register(&registry).unwrap();
        LOCKS_ACQUIRED.with_label_values(&["write"]).inc();
        let names: Vec<_> = registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(names.contains(&"sdms_locks_acquired_total".to_string()));
    }
}
