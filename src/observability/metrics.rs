use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

// Declare the static OnceCell to hold the Metrics.
static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Asynchronously initializes and gets a reference to the process-wide `Metrics`.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE
        .get_or_init(|| async {
            info!("Initializing Metrics ...");
            Metrics::new()
        })
        .await
}

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Boundary metrics
    pub token_requests: IntCounterVec,

    // Upstream metrics
    pub upstream_refreshes: IntCounterVec,
    pub upstream_failures: IntCounterVec,
    pub upstream_duration: HistogramVec,

    // Config/runtime
    pub parse_failures: IntCounter,
    pub config_validation_errors: IntCounter,
    pub providers_configured: IntGauge,
    pub up: IntGauge,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("tokenbroker".into()), None)
            .expect("static registry prefix is valid");

        let metrics: Arc<Metrics> = Arc::new(Self {
            token_requests: IntCounterVec::new(Opts::new("token_requests_total", "Token requests by provider and outcome"), &["provider", "outcome"]).expect("valid metric"),

            upstream_refreshes: IntCounterVec::new(Opts::new("upstream_refreshes_total", "Upstream authentication calls by provider"), &["provider", "provider_type"]).expect("valid metric"),
            upstream_failures: IntCounterVec::new(Opts::new("upstream_failures_total", "Failed upstream authentication calls by reason"), &["provider", "reason"]).expect("valid metric"),
            upstream_duration: HistogramVec::new(HistogramOpts::new("upstream_duration_seconds", "Upstream authentication duration seconds").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]), &["provider"]).expect("valid metric"),

            parse_failures: IntCounter::new("config_parse_failures_total", "Config parse failures").expect("valid metric"),
            config_validation_errors: IntCounter::new("config_validation_errors_total", "Validation errors during startup").expect("valid metric"),
            providers_configured: IntGauge::new("providers_configured", "Number of registered token providers").expect("valid metric"),
            up: IntGauge::new("up", "1 if service is healthy").expect("valid metric"),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(metrics.token_requests.clone()),
            Box::new(metrics.upstream_refreshes.clone()),
            Box::new(metrics.upstream_failures.clone()),
            Box::new(metrics.upstream_duration.clone()),
            Box::new(metrics.parse_failures.clone()),
            Box::new(metrics.config_validation_errors.clone()),
            Box::new(metrics.providers_configured.clone()),
            Box::new(metrics.up.clone()),
        ];
        for collector in collectors {
            reg.register(collector).expect("metric registered once");
        }

        metrics
    }
}
