//! Prometheus metrics for the seismic DMS server.
//!
//! Dataset operation counts and latencies, authorization refusals, and the
//! locker's lock and mutex counters, all gathered in one registry.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! It carries no tenant, subproject or dataset names, but it does expose
//! aggregate usage. Restrict it to scraper networks at the infrastructure level.

use crate::error::ApiResult;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::future::Future;
use std::sync::{LazyLock, Once};
use std::time::Instant;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static DATASET_OPERATIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "sdms_dataset_operations_total",
            "Total number of dataset operations by operation and outcome",
        ),
        &["operation", "outcome"],
    )
    .expect("metric creation failed")
});

pub static DATASET_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "sdms_dataset_operation_duration_seconds",
            "Time to serve a dataset operation",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
        ]),
        &["operation"],
    )
    .expect("metric creation failed")
});

pub static AUTHORIZATION_DENIALS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "sdms_authorization_denials_total",
            "Total number of refused authorization checks by access kind",
        ),
        &["access"],
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(DATASET_OPERATIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DATASET_OPERATION_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(AUTHORIZATION_DENIALS.clone()))
            .expect("metric registration failed");
        sdms_locker::metrics::register(&REGISTRY).expect("metric registration failed");
    });
}

/// Run a dataset operation, recording its outcome and latency.
pub async fn observe<T, F>(operation: &'static str, fut: F) -> ApiResult<T>
where
    F: Future<Output = ApiResult<T>>,
{
    let started = Instant::now();
    let result = fut.await;
    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) => e.code(),
    };
    DATASET_OPERATIONS
        .with_label_values(&[operation, outcome])
        .inc();
    DATASET_OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(started.elapsed().as_secs_f64());
    result
}

/// Handler for the /metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;

    #[tokio::test]
    async fn test_observe_counts_outcomes() {
        register_metrics();
        register_metrics();

        let before = DATASET_OPERATIONS
            .with_label_values(&["metrics-test", "locked"])
            .get();
        let result: ApiResult<()> =
            observe("metrics-test", async { Err(ApiError::Locked("x".to_string())) }).await;
        assert!(result.is_err());
        let after = DATASET_OPERATIONS
            .with_label_values(&["metrics-test", "locked"])
            .get();
        assert_eq!(after, before + 1);

        let names: Vec<String> = REGISTRY
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(names.iter().any(|n| n == "sdms_dataset_operations_total"));
        assert!(names.iter().any(|n| n == "sdms_mutex_retries_total"));
    }
}
