//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `doppler_secrets_reconciliations_total` - Total number of reconciliations
//! - `doppler_secrets_reconciliation_errors_total` - Total number of reconciliation errors
//! - `doppler_secrets_reconciliation_duration_seconds` - Duration of reconciliation passes
//! - `doppler_secrets_requeues_total` - Requeues by reason
//! - `doppler_secrets_fetches_total` - Doppler downloads by outcome (`modified`, `not_modified`, `error`)
//! - `doppler_secrets_managed_secret_writes_total` - Managed secret writes by operation (`create`, `update`)
//! - `doppler_secrets_deployments_reloaded_total` - Deployments restarted after a secret change
//! - `doppler_secrets_credential_exchanges_total` - Successful identity token exchanges
//! - `doppler_secrets_credential_cache_evictions_total` - Exchange providers dropped from the cache

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "doppler_secrets_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "doppler_secrets_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "doppler_secrets_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "doppler_secrets_requeues_total",
            "Total number of requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static SECRET_FETCHES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "doppler_secrets_fetches_total",
            "Total number of Doppler secret downloads by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create SECRET_FETCHES_TOTAL metric - this should never happen")
});

static MANAGED_SECRET_WRITES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "doppler_secrets_managed_secret_writes_total",
            "Total number of managed secret writes by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create MANAGED_SECRET_WRITES_TOTAL metric - this should never happen")
});

static DEPLOYMENTS_RELOADED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "doppler_secrets_deployments_reloaded_total",
        "Total number of deployments restarted after a managed secret changed",
    )
    .expect("Failed to create DEPLOYMENTS_RELOADED_TOTAL metric - this should never happen")
});

static CREDENTIAL_EXCHANGES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "doppler_secrets_credential_exchanges_total",
        "Total number of identity tokens exchanged for Doppler credentials",
    )
    .expect("Failed to create CREDENTIAL_EXCHANGES_TOTAL metric - this should never happen")
});

static CREDENTIAL_CACHE_EVICTIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "doppler_secrets_credential_cache_evictions_total",
        "Total number of exchange providers evicted from the credential cache",
    )
    .expect("Failed to create CREDENTIAL_CACHE_EVICTIONS_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SECRET_FETCHES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(MANAGED_SECRET_WRITES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DEPLOYMENTS_RELOADED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CREDENTIAL_EXCHANGES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CREDENTIAL_CACHE_EVICTIONS_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

/// `outcome` is one of `modified`, `not_modified` or `error`
pub fn increment_secret_fetches(outcome: &str) {
    SECRET_FETCHES_TOTAL.with_label_values(&[outcome]).inc();
}

/// `operation` is `create` or `update`
pub fn increment_secret_writes(operation: &str) {
    MANAGED_SECRET_WRITES_TOTAL
        .with_label_values(&[operation])
        .inc();
}

pub fn increment_deployments_reloaded() {
    DEPLOYMENTS_RELOADED_TOTAL.inc();
}

pub fn increment_credential_exchanges() {
    CREDENTIAL_EXCHANGES_TOTAL.inc();
}

pub fn increment_cache_evictions() {
    CREDENTIAL_CACHE_EVICTIONS_TOTAL.inc();
}
