//! Error types for the webhook server.

use axum::http::StatusCode;
use thiserror::Error;

use crate::webhooks::review::Operation;

/// A request that cannot be answered with a policy verdict
#[derive(Error, Debug)]
pub enum TransportError {
    /// Body is not a valid AdmissionReview
    #[error("Invalid AdmissionReview: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Envelope carries no request
    #[error("AdmissionReview has no request")]
    MissingRequest,

    /// Request names no requesting user
    #[error("AdmissionReview request has no userInfo.username")]
    MissingUser,

    /// Resource is not a core/v1 Node
    #[error("Unrecognized resource kind: {0}")]
    UnrecognizedKind(String),

    /// Operation outside the webhook's registered scope
    #[error("Operation {operation} is not handled by webhook {webhook}")]
    UnsupportedOperation {
        operation: Operation,
        webhook: String,
    },
}

impl TransportError {
    /// HTTP status returned to the caller
    pub fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}

/// Errors that can occur when running the webhook server
#[derive(Error, Debug)]
pub enum WebhookError {
    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsConfig(#[source] std::io::Error),

    /// Server error
    #[error("Webhook server error: {0}")]
    Server(#[from] std::io::Error),

    /// No webhook was enabled
    #[error("No webhooks enabled")]
    NoWebhooks,
}
