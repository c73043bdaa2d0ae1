//! ValidatingWebhookConfiguration for the enabled webhooks.
//!
//! The configuration points every webhook at the in-cluster Service fronting
//! this process and is applied with server-side apply, so re-running the
//! command converges instead of failing on conflicts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use k8s_openapi::ByteString;
use k8s_openapi::api::admissionregistration::v1::{
    ServiceReference, ValidatingWebhookConfiguration, WebhookClientConfig,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, Patch, PatchParams};
use thiserror::Error;
use tracing::info;

use crate::webhooks::Webhook;

/// Field manager name for server-side apply
pub const FIELD_MANAGER: &str = "node-label-guard";

/// Errors raised while registering webhooks
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// CA bundle could not be read
    #[error("Failed to read CA bundle {}: {source}", path.display())]
    CaBundle {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No webhook was enabled
    #[error("No webhooks enabled")]
    NoWebhooks,
}

/// In-cluster Service the API server calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    pub name: String,
    pub namespace: String,
    pub port: i32,
    /// PEM bundle that verifies the serving certificate
    pub ca_bundle: Option<Vec<u8>>,
}

impl ServiceTarget {
    /// Read the CA bundle from disk, if a path was given
    pub fn load_ca_bundle(&mut self, path: Option<&Path>) -> Result<(), RegistrationError> {
        if let Some(path) = path {
            let bundle = std::fs::read(path).map_err(|source| RegistrationError::CaBundle {
                path: path.to_path_buf(),
                source,
            })?;
            self.ca_bundle = Some(bundle);
        }
        Ok(())
    }

    fn client_config(&self, uri: &str) -> WebhookClientConfig {
        WebhookClientConfig {
            ca_bundle: self.ca_bundle.clone().map(ByteString),
            service: Some(ServiceReference {
                name: self.name.clone(),
                namespace: self.namespace.clone(),
                path: Some(uri.to_string()),
                port: Some(self.port),
            }),
            url: None,
        }
    }
}

/// Build the configuration object with one entry per webhook
pub fn build_configuration(
    name: &str,
    webhooks: &[Arc<dyn Webhook>],
    target: &ServiceTarget,
) -> ValidatingWebhookConfiguration {
    ValidatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([(
                "app.kubernetes.io/managed-by".to_string(),
                FIELD_MANAGER.to_string(),
            )])),
            ..Default::default()
        },
        webhooks: Some(
            webhooks
                .iter()
                .map(|webhook| webhook.validating_webhook(target.client_config(webhook.uri())))
                .collect(),
        ),
    }
}

/// Server-side apply the configuration
pub async fn apply_configuration(
    client: Client,
    configuration: &ValidatingWebhookConfiguration,
) -> Result<ValidatingWebhookConfiguration, RegistrationError> {
    let name = configuration.metadata.name.clone().unwrap_or_default();
    let api: Api<ValidatingWebhookConfiguration> = Api::all(client);
    let params = PatchParams::apply(FIELD_MANAGER).force();

    let applied = api.patch(&name, &params, &Patch::Apply(configuration)).await?;
    info!(
        name = %name,
        webhooks = configuration.webhooks.as_ref().map_or(0, Vec::len),
        "Applied ValidatingWebhookConfiguration"
    );
    Ok(applied)
}

/// Build the configuration and either print it or apply it
pub async fn register(
    name: &str,
    webhooks: &[Arc<dyn Webhook>],
    target: &ServiceTarget,
    dry_run: bool,
) -> Result<(), RegistrationError> {
    if webhooks.is_empty() {
        return Err(RegistrationError::NoWebhooks);
    }

    let configuration = build_configuration(name, webhooks, target);
    if dry_run {
        println!("{}", serde_json::to_string_pretty(&configuration)?);
        return Ok(());
    }

    let client = Client::try_default().await?;
    apply_configuration(client, &configuration).await?;
    Ok(())
}
