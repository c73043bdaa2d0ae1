//! node-label-guard library crate
//!
//! Validating admission webhooks that protect node role labels, plus the
//! health server and webhook registration used by the binary.

pub mod config;
pub mod health;
pub mod registration;
pub mod webhooks;

pub use health::HealthState;
pub use webhooks::{
    NodeLabelWebhook, WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, Webhook, WebhookError,
    run_webhook_server,
};
