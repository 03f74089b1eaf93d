//! Metrics collection for observability
//!
//! Prometheus metrics for the checkout engine, held in a registry owned by
//! the marketplace instance (several instances can coexist in one process).
//!
//! # Metrics
//!
//! - `market_checkouts_total` - Committed checkouts
//! - `market_checkout_failures_total{kind}` - Rejected or failed checkouts by error kind
//! - `market_items_sold_total` - Items transferred by checkouts
//! - `market_checkout_volume_total` - Credits moved by checkouts
//! - `market_checkout_duration_seconds` - Checkout latency

use crate::error::ErrorKind;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Committed checkouts
    pub checkouts_total: IntCounter,

    /// Failed checkouts, labelled by error kind
    pub checkout_failures: IntCounterVec,

    /// Items sold
    pub items_sold: IntCounter,

    /// Credits moved
    pub checkout_volume: IntCounter,

    /// Checkout duration histogram
    pub checkout_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let checkouts_total =
            IntCounter::new("market_checkouts_total", "Total number of committed checkouts")?;
        registry.register(Box::new(checkouts_total.clone()))?;

        let checkout_failures = IntCounterVec::new(
            Opts::new(
                "market_checkout_failures_total",
                "Total number of failed checkouts by error kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(checkout_failures.clone()))?;

        let items_sold = IntCounter::new("market_items_sold_total", "Total number of items sold")?;
        registry.register(Box::new(items_sold.clone()))?;

        let checkout_volume = IntCounter::new(
            "market_checkout_volume_total",
            "Total credits moved by checkouts",
        )?;
        registry.register(Box::new(checkout_volume.clone()))?;

        let checkout_duration = Histogram::with_opts(
            HistogramOpts::new(
                "market_checkout_duration_seconds",
                "Histogram of checkout latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(checkout_duration.clone()))?;

        Ok(Self {
            checkouts_total,
            checkout_failures,
            items_sold,
            checkout_volume,
            checkout_duration,
            registry,
        })
    }

    /// Record committed checkout
    pub fn record_checkout(&self, items: usize, total: u64, duration_seconds: f64) {
        self.checkouts_total.inc();
        self.items_sold.inc_by(items as u64);
        self.checkout_volume.inc_by(total);
        self.checkout_duration.observe(duration_seconds);
    }

    /// Record failed checkout
    pub fn record_failure(&self, kind: ErrorKind) {
        self.checkout_failures
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    /// Failures recorded for one kind
    pub fn failures(&self, kind: ErrorKind) -> u64 {
        self.checkout_failures
            .with_label_values(&[kind.as_str()])
            .get()
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of every metric
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("checkouts_total", &self.checkouts_total.get())
            .field("items_sold", &self.items_sold.get())
            .field("checkout_volume", &self.checkout_volume.get())
            .finish()
    }
}
