//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! Provides:
//! - `/healthz` - Liveness probe (always returns 200 if server is running)
//! - `/readyz` - Readiness probe (returns 200 once the webhook server is listening)
//! - `/metrics` - Prometheus metrics endpoint

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::info;

/// Labels for admission decisions
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct DecisionLabels {
    pub webhook: String,
    pub allowed: bool,
    pub rule: String,
}

impl EncodeLabelSet for DecisionLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("webhook", self.webhook.as_str()).encode(encoder.encode_label())?;
        let allowed = if self.allowed { "true" } else { "false" };
        ("allowed", allowed).encode(encoder.encode_label())?;
        ("rule", self.rule.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for per-webhook metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct WebhookLabels {
    pub webhook: String,
}

impl EncodeLabelSet for WebhookLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("webhook", self.webhook.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the webhook server
pub struct Metrics {
    /// Admission decisions by webhook, verdict and deciding rule
    pub decisions_total: Family<DecisionLabels, Counter>,
    /// Requests rejected before a verdict (malformed or out of scope)
    pub errors_total: Family<WebhookLabels, Counter>,
    /// Request handling duration histogram
    pub duration_seconds: Family<WebhookLabels, Histogram>,
    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let decisions_total = Family::<DecisionLabels, Counter>::default();
        registry.register(
            "node_label_guard_admission_decisions",
            "Total number of admission decisions",
            decisions_total.clone(),
        );

        let errors_total = Family::<WebhookLabels, Counter>::default();
        registry.register(
            "node_label_guard_admission_errors",
            "Total number of admission requests rejected as invalid",
            errors_total.clone(),
        );

        // handling is sub-millisecond; the webhook timeout caps it at seconds
        let duration_seconds = Family::<WebhookLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.0001, 2.0, 15))
        });
        registry.register(
            "node_label_guard_admission_duration_seconds",
            "Duration of admission request handling in seconds",
            duration_seconds.clone(),
        );

        Self {
            decisions_total,
            errors_total,
            duration_seconds,
            registry,
        }
    }

    /// Record a policy decision
    pub fn record_decision(&self, webhook: &str, allowed: bool, rule: &str, duration_secs: f64) {
        let labels = DecisionLabels {
            webhook: webhook.to_string(),
            allowed,
            rule: rule.to_string(),
        };
        self.decisions_total.get_or_create(&labels).inc();
        self.observe(webhook, duration_secs);
    }

    /// Record a request that never reached the policy
    pub fn record_error(&self, webhook: &str, duration_secs: f64) {
        let labels = WebhookLabels {
            webhook: webhook.to_string(),
        };
        self.errors_total.get_or_create(&labels).inc();
        self.observe(webhook, duration_secs);
    }

    fn observe(&self, webhook: &str, duration_secs: f64) {
        let labels = WebhookLabels {
            webhook: webhook.to_string(),
        };
        self.duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether the webhook server is accepting requests
    ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    /// Mark the service as ready or not ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the service is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

/// Liveness probe handler
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 503 Service Unavailable until the webhook server is listening
/// and again once shutdown starts.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the health server
///
/// Binds to 0.0.0.0:`port` and serves health/metrics endpoints.
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
