use metrics::{register_counter, register_gauge, register_histogram, Counter, Gauge, Histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use tracing::info;

/// Metric handles updated by the thumbnail cache.
pub struct CacheMetrics {
    pub hits: Counter,
    pub misses: Counter,
    pub coalesced: Counter,
    pub productions: Counter,
    pub production_failures: Counter,
    pub evictions: Counter,
    pub cost_bytes: Gauge,
    pub entries: Gauge,
    pub production_duration: Histogram,
}

impl CacheMetrics {
    /// Register handles with the installed recorder. Without a recorder the
    /// handles do nothing.
    pub fn register() -> Self {
        Self {
            hits: register_counter!("webshot_cache_hits_total"),
            misses: register_counter!("webshot_cache_misses_total"),
            coalesced: register_counter!("webshot_cache_coalesced_total"),
            productions: register_counter!("webshot_productions_total"),
            production_failures: register_counter!("webshot_production_failures_total"),
            evictions: register_counter!("webshot_evictions_total"),
            cost_bytes: register_gauge!("webshot_cache_cost_bytes"),
            entries: register_gauge!("webshot_cache_entries"),
            production_duration: register_histogram!("webshot_production_seconds"),
        }
    }

    pub fn noop() -> Self {
        Self {
            hits: Counter::noop(),
            misses: Counter::noop(),
            coalesced: Counter::noop(),
            productions: Counter::noop(),
            production_failures: Counter::noop(),
            evictions: Counter::noop(),
            cost_bytes: Gauge::noop(),
            entries: Gauge::noop(),
            production_duration: Histogram::noop(),
        }
    }

    pub fn record_production(&self, duration: Duration, success: bool) {
        self.productions.increment(1);
        if !success {
            self.production_failures.increment(1);
        }
        self.production_duration.record(duration.as_secs_f64());
    }

    pub fn record_occupancy(&self, entries: usize, cost: usize) {
        self.entries.set(entries as f64);
        self.cost_bytes.set(cost as f64);
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::noop()
    }
}

/// Install the Prometheus recorder process-wide and return the handle used to
/// render `/metrics`. Must run before [`CacheMetrics::register`].
pub fn install_prometheus() -> Result<PrometheusHandle, Box<dyn std::error::Error + Send + Sync>> {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    metrics::set_boxed_recorder(Box::new(recorder))?;

    info!("Prometheus recorder installed");
    Ok(handle)
}
