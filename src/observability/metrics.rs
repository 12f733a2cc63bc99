use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use tracing::info;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::utils::constants::APPLICATION_NAME;

// Declare the static OnceCell to hold the Metrics.
static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Asynchronously initializes and gets a reference to the static `Metrics`.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE.get_or_init(|| async {
        info!("Initializing Metrics ...");
        Metrics::new()}
    ).await
}


#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Cache metrics
    pub token_cache_lookups: IntCounterVec,

    // Token endpoint metrics
    pub token_refreshes: IntCounterVec,
    pub token_refresh_duration: HistogramVec,

    // Data API metrics
    pub transactions_fetches: IntCounterVec,
    pub transactions_fetch_duration: Histogram,
    pub transactions_kept: IntCounter,

    // Poll cycle
    pub poll_cycles: IntCounter,
    pub poll_cycle_duration: Histogram,
    pub account_failures: IntCounterVec,
    pub accounts_last_cycle: IntGauge,

    // Config/runtime
    pub config_validation_errors: IntCounter,
    pub up: IntGauge,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some(APPLICATION_NAME.into()), None).unwrap();

        let metrics: Arc<Metrics> = Arc::new(Self {
            // Cache
            token_cache_lookups: IntCounterVec::new(Opts::new("token_cache_lookups_total", "Token cache lookups by result"),&["result"],).unwrap(),

            // Token endpoint
            token_refreshes: IntCounterVec::new(Opts::new("token_refreshes_total", "Token grants by grant type and outcome"),&["grant_type", "outcome"],).unwrap(),
            token_refresh_duration: HistogramVec::new(HistogramOpts::new("token_refresh_duration_seconds", "Token grant duration seconds").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),&["grant_type"],).unwrap(),

            // Data API
            transactions_fetches: IntCounterVec::new(Opts::new("transactions_fetches_total", "Transaction fetches by outcome"),&["outcome"],).unwrap(),
            transactions_fetch_duration: Histogram::with_opts(HistogramOpts::new("transactions_fetch_duration_seconds", "Transaction fetch duration seconds").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0])).unwrap(),
            transactions_kept: IntCounter::new("transactions_kept_total", "Round-up eligible transactions kept after filtering").unwrap(),

            // Poll cycle
            poll_cycles: IntCounter::new("poll_cycles_total", "Completed poll cycles").unwrap(),
            poll_cycle_duration: Histogram::with_opts(HistogramOpts::new("poll_cycle_duration_seconds", "Poll cycle duration seconds").buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0])).unwrap(),
            account_failures: IntCounterVec::new(Opts::new("account_failures_total", "Accounts skipped in a cycle by reason"),&["reason"],).unwrap(),
            accounts_last_cycle: IntGauge::new("accounts_last_cycle", "Accounts attempted in the last cycle").unwrap(),

            // Config/runtime
            config_validation_errors: IntCounter::new("config_validation_errors_total","Validation errors during startup",).unwrap(),
            up: IntGauge::new("up", "1 if service is healthy").unwrap(),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        reg.register(Box::new(metrics.token_cache_lookups.clone())).unwrap();
        reg.register(Box::new(metrics.token_refreshes.clone())).unwrap();
        reg.register(Box::new(metrics.token_refresh_duration.clone())).unwrap();
        reg.register(Box::new(metrics.transactions_fetches.clone())).unwrap();
        reg.register(Box::new(metrics.transactions_fetch_duration.clone())).unwrap();
        reg.register(Box::new(metrics.transactions_kept.clone())).unwrap();
        reg.register(Box::new(metrics.poll_cycles.clone())).unwrap();
        reg.register(Box::new(metrics.poll_cycle_duration.clone())).unwrap();
        reg.register(Box::new(metrics.account_failures.clone())).unwrap();
        reg.register(Box::new(metrics.accounts_last_cycle.clone())).unwrap();
        reg.register(Box::new(metrics.config_validation_errors.clone())).unwrap();
        reg.register(Box::new(metrics.up.clone())).unwrap();

        metrics
    }
}
