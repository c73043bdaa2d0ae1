//! Validating admission webhooks for node resources.
//!
//! Request path:
//! - `review`: AdmissionReview envelope parsing and response serialization
//! - `gate`: one request at a time per webhook instance
//! - `labels`: old/new node labels and their role classification
//! - `policies`: ordered label-transition rules

mod error;
mod gate;
pub mod labels;
pub mod policies;
pub mod review;
mod server;
mod webhook;

pub use error::{TransportError, WebhookError};
pub use gate::RequestGate;
pub use policies::{PolicyConfig, ValidationContext, ValidationResult};
pub use server::{
    WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, create_webhook_router, run_webhook_server,
};
pub use webhook::{
    AdmissionOutcome, MatchPolicy, NodeLabelWebhook, WEBHOOK_DOMAIN, Webhook, WebhookSpec,
};
