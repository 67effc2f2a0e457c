use prometheus::{
    Counter, CounterVec, Encoder, HistogramOpts, HistogramVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use crate::adapters::template_store::TemplateStore;

pub struct MetricsCollector {
    registry: Registry,

    // Request metrics
    pub requests_total: CounterVec,
    pub request_duration: HistogramVec,

    // Mock metrics
    pub mock_hits: CounterVec,

    // Upstream metrics
    pub upstream_forwards: CounterVec,
    pub fallback_retries: Counter,
    pub upstream_errors: Counter,

    // Template metrics, refreshed from the store on scrape
    pub templates_loaded: IntGauge,
    pub template_reloads: IntGauge,
}

impl MetricsCollector {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Request metrics
        let requests_total = CounterVec::new(
            Opts::new("gproxy_requests_total", "Total number of proxied requests"),
            &["mode", "outcome"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new("gproxy_request_duration_seconds", "Request duration in seconds"),
            &["mode"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        // Mock metrics
        let mock_hits = CounterVec::new(
            Opts::new("gproxy_mock_hits_total", "Requests answered from a template"),
            &["method"],
        )?;
        registry.register(Box::new(mock_hits.clone()))?;

        // Upstream metrics
        let upstream_forwards = CounterVec::new(
            Opts::new("gproxy_upstream_forwards_total", "Upstream responses relayed"),
            &["status"],
        )?;
        registry.register(Box::new(upstream_forwards.clone()))?;

        let fallback_retries = Counter::new(
            "gproxy_upstream_fallback_retries_total",
            "Direct-path retries after an upstream 404",
        )?;
        registry.register(Box::new(fallback_retries.clone()))?;

        let upstream_errors = Counter::new("gproxy_upstream_errors_total", "Upstream network failures")?;
        registry.register(Box::new(upstream_errors.clone()))?;

        // Template metrics
        let templates_loaded = IntGauge::new("gproxy_templates_loaded", "Templates in the live snapshot")?;
        registry.register(Box::new(templates_loaded.clone()))?;

        let template_reloads = IntGauge::new("gproxy_template_reloads", "Template snapshots published")?;
        registry.register(Box::new(template_reloads.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
            mock_hits,
            upstream_forwards,
            fallback_retries,
            upstream_errors,
            templates_loaded,
            template_reloads,
        })
    }

    pub fn observe_store(&self, store: &TemplateStore) {
        self.templates_loaded.set(store.len() as i64);
        self.template_reloads.set(store.reload_count() as i64);
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

pub struct MetricsHandler {
    collector: Arc<MetricsCollector>,
    store: Arc<TemplateStore>,
}

impl MetricsHandler {
    pub fn new(collector: Arc<MetricsCollector>, store: Arc<TemplateStore>) -> Self {
        Self { collector, store }
    }

    pub async fn metrics(&self) -> String {
        self.collector.observe_store(&self.store);
        self.collector.encode().unwrap_or_else(|e| {
            tracing::error!("Failed to encode metrics: {}", e);
            String::from("# Error encoding metrics\n")
        })
    }
}
