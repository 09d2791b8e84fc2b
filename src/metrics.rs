//! Prometheus metrics for generation and validation runs
//!
//! A single global collector counts level executions and their outcomes,
//! level durations, pipeline verdicts and template cache traffic.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prometheus_client::encoding::{EncodeLabelSet, text::encode};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::Duration;

/// Global metrics registry instance
pub static METRICS: Lazy<Arc<MetricsCollector>> = Lazy::new(|| Arc::new(MetricsCollector::new()));

/// Labels for per-level outcome counters
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct LevelLabels {
    /// Validation level (e.g., "structural", "healthCheck")
    pub level: String,
    /// Outcome ("passed", "failed", "timeout", "cancelled", "error")
    pub status: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct LevelOnlyLabels {
    pub level: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PipelineLabels {
    /// "valid", "invalid" or "stopped"
    pub status: String,
}

/// Central metrics collector with Prometheus registry
pub struct MetricsCollector {
    registry: RwLock<Registry>,

    /// Level executions by level and outcome
    pub level_runs_total: Family<LevelLabels, Counter>,

    /// Level duration in seconds
    pub level_duration_seconds: Family<LevelOnlyLabels, Histogram>,

    /// Pipeline runs by verdict
    pub pipeline_runs_total: Family<PipelineLabels, Counter>,

    pub template_cache_hits_total: Counter,
    pub template_cache_misses_total: Counter,
}

impl MetricsCollector {
    /// Create a new metrics collector with all metrics registered
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let level_runs_total = Family::<LevelLabels, Counter>::default();
        registry.register(
            "svcforge_level_runs",
            "Validation level executions by level and outcome",
            level_runs_total.clone(),
        );

        let level_duration_seconds =
            Family::<LevelOnlyLabels, Histogram>::new_with_constructor(|| {
                // 10ms up to roughly 2.5 minutes
                Histogram::new(exponential_buckets(0.01, 2.6, 11))
            });
        registry.register(
            "svcforge_level_duration_seconds",
            "Validation level duration histogram in seconds",
            level_duration_seconds.clone(),
        );

        let pipeline_runs_total = Family::<PipelineLabels, Counter>::default();
        registry.register(
            "svcforge_pipeline_runs",
            "Validation pipeline runs by verdict",
            pipeline_runs_total.clone(),
        );

        let template_cache_hits_total = Counter::default();
        registry.register(
            "svcforge_template_cache_hits",
            "Template loads served from the parse cache",
            template_cache_hits_total.clone(),
        );

        let template_cache_misses_total = Counter::default();
        registry.register(
            "svcforge_template_cache_misses",
            "Template loads that read and parsed the file",
            template_cache_misses_total.clone(),
        );

        Self {
            registry: RwLock::new(registry),
            level_runs_total,
            level_duration_seconds,
            pipeline_runs_total,
            template_cache_hits_total,
            template_cache_misses_total,
        }
    }

    /// Encode metrics in Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        let registry = self.registry.read();
        if let Err(error) = encode(&mut buffer, &registry) {
            tracing::error!(%error, "failed to encode metrics");
        }
        buffer
    }

    /// Record one finished validation level
    pub fn record_level(&self, level: &str, status: &str, duration: Duration) {
        self.level_runs_total
            .get_or_create(&LevelLabels {
                level: level.to_string(),
                status: status.to_string(),
            })
            .inc();

        self.level_duration_seconds
            .get_or_create(&LevelOnlyLabels {
                level: level.to_string(),
            })
            .observe(duration.as_secs_f64());
    }

    pub fn record_pipeline(&self, status: &str) {
        self.pipeline_runs_total
            .get_or_create(&PipelineLabels {
                status: status.to_string(),
            })
            .inc();
    }

    pub fn record_template_cache(&self, hit: bool) {
        if hit {
            self.template_cache_hits_total.inc();
        } else {
            self.template_cache_misses_total.inc();
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Text exposition of the global collector
pub fn encode_metrics() -> String {
    METRICS.encode()
}
