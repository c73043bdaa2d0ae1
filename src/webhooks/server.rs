//! Admission webhook server.
//!
//! Serves one POST route per enabled webhook. TLS is used when the
//! certificate and key are present (mounted from a cert-manager or
//! service-ca secret at /etc/webhook/certs/); otherwise the server falls back
//! to plain HTTP, which is only useful behind a TLS-terminating proxy or in
//! local testing.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use tracing::{info, warn};

use crate::health::HealthState;
use crate::webhooks::error::WebhookError;
use crate::webhooks::webhook::Webhook;

/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "/etc/webhook/certs/tls.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "/etc/webhook/certs/tls.key";
/// Default webhook server port
pub const WEBHOOK_PORT: u16 = 9443;

/// Shared state for one webhook route
#[derive(Clone)]
struct WebhookState {
    webhook: Arc<dyn Webhook>,
    health_state: Option<Arc<HealthState>>,
}

/// Create the webhook router with a route per webhook
pub fn create_webhook_router(
    webhooks: &[Arc<dyn Webhook>],
    health_state: Option<Arc<HealthState>>,
) -> Router {
    webhooks.iter().fold(Router::new(), |router, webhook| {
        let state = WebhookState {
            webhook: Arc::clone(webhook),
            health_state: health_state.clone(),
        };
        router.route(webhook.uri(), post(admit).with_state(state))
    })
}

/// Admission handler shared by all webhook routes
async fn admit(State(state): State<WebhookState>, body: Bytes) -> impl IntoResponse {
    let started = Instant::now();
    let outcome = state.webhook.handle_request(&body);

    if let Some(health) = &state.health_state {
        let elapsed = started.elapsed().as_secs_f64();
        match outcome.rule {
            Some(rule) => health.metrics.record_decision(
                state.webhook.name(),
                outcome.allowed(),
                rule,
                elapsed,
            ),
            None => health.metrics.record_error(state.webhook.name(), elapsed),
        }
    }

    (outcome.status, Json(outcome.response.into_review()))
}

/// Run the webhook server
///
/// Binds to 0.0.0.0:`port` and serves every webhook's URI. Readiness is
/// reported once the listener is configured.
///
/// # Arguments
/// * `webhooks` - Enabled webhooks
/// * `health_state` - Readiness flag and metrics, if the health server runs
/// * `port` - Listen port
/// * `cert_path` - Path to TLS certificate file (PEM format)
/// * `key_path` - Path to TLS private key file (PEM format)
pub async fn run_webhook_server(
    webhooks: Vec<Arc<dyn Webhook>>,
    health_state: Option<Arc<HealthState>>,
    port: u16,
    cert_path: &Path,
    key_path: &Path,
) -> Result<(), WebhookError> {
    use axum_server::tls_rustls::RustlsConfig;

    if webhooks.is_empty() {
        return Err(WebhookError::NoWebhooks);
    }

    for webhook in &webhooks {
        info!(
            webhook = webhook.name(),
            uri = webhook.uri(),
            timeout_seconds = webhook.timeout_seconds(),
            "Registered webhook route"
        );
    }

    let app = create_webhook_router(&webhooks, health_state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    if cert_path.exists() && key_path.exists() {
        let config = RustlsConfig::from_pem_file(cert_path, key_path)
            .await
            .map_err(WebhookError::TlsConfig)?;

        info!(port, "Webhook server listening with TLS");
        if let Some(health) = &health_state {
            health.set_ready(true).await;
        }

        axum_server::bind_rustls(addr, config)
            .serve(app.into_make_service())
            .await?;
    } else {
        warn!(
            cert_path = %cert_path.display(),
            key_path = %key_path.display(),
            "TLS certificates not found, serving plain HTTP"
        );

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(port, "Webhook server listening");
        if let Some(health) = &health_state {
            health.set_ready(true).await;
        }

        axum::serve(listener, app).await?;
    }

    Ok(())
}
