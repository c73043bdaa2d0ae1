//! Command-line and environment configuration.
//!
//! Each policy variant is a preset of registration metadata plus policy
//! configuration. The set of served variants is chosen at startup.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::webhooks::labels::RoleScheme;
use crate::webhooks::policies::PolicyConfig;
use crate::webhooks::review::Operation;
use crate::webhooks::{
    MatchPolicy, NodeLabelWebhook, WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, Webhook,
    WebhookSpec,
};

/// Default health server port
pub const HEALTH_PORT: u16 = 8080;

/// Node label admission webhook
#[derive(Parser, Debug)]
#[command(name = "node-label-guard", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the admission webhooks
    Serve(ServeArgs),
    /// Create or update the ValidatingWebhookConfiguration
    Register(RegisterArgs),
}

/// Policy variants served by this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum Variant {
    /// `node-role.kubernetes.io/<role>` labels, UPDATE and DELETE
    NodeValidation,
    /// `type=<role>` labels, UPDATE only
    NodeLabelsValidation,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::NodeValidation, Variant::NodeLabelsValidation];

    /// Registration metadata for this variant
    pub fn spec(self) -> WebhookSpec {
        match self {
            Variant::NodeValidation => WebhookSpec {
                name: "node-validation".to_string(),
                uri: "/node-validation".to_string(),
                timeout_seconds: 1,
                operations: vec![Operation::Update, Operation::Delete],
                api_groups: vec!["*".to_string()],
                match_policy: MatchPolicy::Exact,
            },
            Variant::NodeLabelsValidation => WebhookSpec {
                name: "node-labels-validation".to_string(),
                uri: "/regularuser-validation".to_string(),
                timeout_seconds: 2,
                operations: vec![Operation::Update],
                api_groups: vec![String::new()],
                match_policy: MatchPolicy::Equivalent,
            },
        }
    }

    /// Default policy for this variant
    pub fn policy(self) -> PolicyConfig {
        match self {
            Variant::NodeValidation => {
                PolicyConfig::new(["dedicated-admins"], RoleScheme::node_role_labels())
            }
            Variant::NodeLabelsValidation => {
                PolicyConfig::new(["dedicated-admin"], RoleScheme::type_label())
            }
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::NodeValidation => write!(f, "node-validation"),
            Variant::NodeLabelsValidation => write!(f, "node-labels-validation"),
        }
    }
}

/// Which webhooks to build and how
#[derive(Args, Debug, Clone)]
pub struct PolicyArgs {
    /// Webhook variants to enable
    #[arg(
        long,
        env = "WEBHOOKS",
        value_enum,
        value_delimiter = ',',
        default_values_t = Variant::ALL
    )]
    pub webhooks: Vec<Variant>,

    /// Privileged groups, replacing each variant's default. Empty entries
    /// are ignored.
    #[arg(long, env = "PRIVILEGED_GROUPS", value_delimiter = ',')]
    pub privileged_groups: Vec<String>,
}

impl Default for PolicyArgs {
    fn default() -> Self {
        Self {
            webhooks: Variant::ALL.to_vec(),
            privileged_groups: Vec::new(),
        }
    }
}

impl PolicyArgs {
    /// Policy for one variant, with the group override applied
    pub fn policy(&self, variant: Variant) -> PolicyConfig {
        let mut policy = variant.policy();
        let groups: BTreeSet<String> = self
            .privileged_groups
            .iter()
            .map(|group| group.trim())
            .filter(|group| !group.is_empty())
            .map(ToString::to_string)
            .collect();
        if !groups.is_empty() {
            policy.privileged_groups = groups;
        }
        policy
    }

    /// Build the enabled webhooks, one instance per distinct variant
    pub fn build_webhooks(&self) -> Vec<Arc<dyn Webhook>> {
        let mut variants = self.webhooks.clone();
        variants.sort();
        variants.dedup();

        variants
            .into_iter()
            .map(|variant| {
                let webhook = NodeLabelWebhook::new(variant.spec(), self.policy(variant));
                Arc::new(webhook) as Arc<dyn Webhook>
            })
            .collect()
    }
}

/// Arguments for `serve`
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Port for the admission webhook server
    #[arg(long, env = "WEBHOOK_PORT", default_value_t = WEBHOOK_PORT)]
    pub webhook_port: u16,

    /// Port for health probes and metrics
    #[arg(long, env = "HEALTH_PORT", default_value_t = HEALTH_PORT)]
    pub health_port: u16,

    /// TLS certificate (PEM); plain HTTP is served when missing
    #[arg(long, env = "WEBHOOK_CERT_PATH", default_value = WEBHOOK_CERT_PATH)]
    pub cert_path: PathBuf,

    /// TLS private key (PEM)
    #[arg(long, env = "WEBHOOK_KEY_PATH", default_value = WEBHOOK_KEY_PATH)]
    pub key_path: PathBuf,
}

/// Arguments for `register`
#[derive(Args, Debug, Clone)]
pub struct RegisterArgs {
    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Name of the ValidatingWebhookConfiguration
    #[arg(long, default_value = "node-label-guard")]
    pub configuration_name: String,

    /// Service fronting the webhook server
    #[arg(long, env = "SERVICE_NAME", default_value = "node-label-guard")]
    pub service_name: String,

    /// Namespace of the service
    #[arg(long, env = "POD_NAMESPACE", default_value = "node-label-guard")]
    pub service_namespace: String,

    /// Service port
    #[arg(long, default_value_t = 443)]
    pub service_port: i32,

    /// CA bundle (PEM) that signed the serving certificate
    #[arg(long, env = "CA_BUNDLE_PATH")]
    pub ca_bundle_path: Option<PathBuf>,

    /// Print the configuration instead of applying it
    #[arg(long)]
    pub dry_run: bool,
}
