//! Router harness shared by the functional tests.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use node_label_guard::config::{PolicyArgs, Variant};
use node_label_guard::health::HealthState;
use node_label_guard::webhooks::create_webhook_router;

pub const NODE_VALIDATION_URI: &str = "/node-validation";
pub const LABELS_VALIDATION_URI: &str = "/regularuser-validation";

/// Router serving every variant, with metrics recorded into `health`
pub struct Harness {
    pub router: Router,
    pub health: Arc<HealthState>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_variants(Variant::ALL.to_vec())
    }

    pub fn with_variants(variants: Vec<Variant>) -> Self {
        let args = PolicyArgs {
            webhooks: variants,
            ..Default::default()
        };
        let health = Arc::new(HealthState::new());
        let router = create_webhook_router(&args.build_webhooks(), Some(health.clone()));
        Self { router, health }
    }

    /// POST a body and return status plus decoded JSON response
    pub async fn post(&self, uri: &str, body: Vec<u8>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }
}

/// Assert a 200 response with the given verdict and return the status message
pub fn expect_verdict(status: StatusCode, body: &Value, allowed: bool) -> String {
    assert_eq!(status, StatusCode::OK, "unexpected HTTP status: {body}");
    assert_eq!(body["apiVersion"], "admission.k8s.io/v1");
    assert_eq!(body["kind"], "AdmissionReview");
    assert_eq!(body["response"]["allowed"], allowed, "unexpected verdict: {body}");
    let code = if allowed { 200 } else { 403 };
    assert_eq!(body["response"]["status"]["code"], code);
    body["response"]["status"]["message"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}
