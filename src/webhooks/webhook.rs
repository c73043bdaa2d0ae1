//! Webhook contract and the node label policy service.
//!
//! Every served webhook implements [`Webhook`]: registration metadata for the
//! `ValidatingWebhookConfiguration` plus request handling. The server and the
//! registration command only see `Arc<dyn Webhook>`.

use axum::http::StatusCode;
use kube::core::admission::AdmissionResponse;
use k8s_openapi::api::admissionregistration::v1::{
    RuleWithOperations, ValidatingWebhook, WebhookClientConfig,
};
use tracing::{Span, debug, error, info, info_span, warn};

use crate::webhooks::error::TransportError;
use crate::webhooks::gate::RequestGate;
use crate::webhooks::labels;
use crate::webhooks::policies::{self, PolicyConfig, principal};
use crate::webhooks::review::{self, AdmissionRequest, Decision, Operation};

/// Suffix appended to webhook names in the registration object
pub const WEBHOOK_DOMAIN: &str = "nodes.label-guard.io";

/// How the API server matches requests against the registered rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    Exact,
    Equivalent,
}

impl MatchPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchPolicy::Exact => "Exact",
            MatchPolicy::Equivalent => "Equivalent",
        }
    }
}

/// Result of handling one HTTP request
#[derive(Debug, Clone)]
pub struct AdmissionOutcome {
    /// HTTP status for the response
    pub status: StatusCode,
    pub response: AdmissionResponse,
    /// Rule that decided; `None` for transport errors
    pub rule: Option<&'static str>,
}

impl AdmissionOutcome {
    fn decided(decision: Decision) -> Self {
        Self {
            status: StatusCode::OK,
            rule: Some(decision.rule),
            response: decision.into_response(),
        }
    }

    fn errored(uid: Option<String>, error: &TransportError) -> Self {
        Self {
            status: error.status_code(),
            response: review::errored(uid, error),
            rule: None,
        }
    }

    pub fn allowed(&self) -> bool {
        self.response.allowed
    }
}

/// A validating admission webhook served by this process
pub trait Webhook: Send + Sync {
    /// Short name, unique within the process
    fn name(&self) -> &str;

    /// HTTP path the webhook is served on
    fn uri(&self) -> &str;

    fn timeout_seconds(&self) -> i32;

    fn rules(&self) -> Vec<RuleWithOperations>;

    fn match_policy(&self) -> MatchPolicy;

    /// An unreachable webhook must not block node updates
    fn failure_policy(&self) -> &'static str {
        "Ignore"
    }

    fn side_effects(&self) -> &'static str {
        "None"
    }

    /// Handle a raw AdmissionReview body
    fn handle_request(&self, body: &[u8]) -> AdmissionOutcome;

    /// Registration entry for this webhook
    fn validating_webhook(&self, client_config: WebhookClientConfig) -> ValidatingWebhook {
        ValidatingWebhook {
            name: format!("{}.{}", self.name(), WEBHOOK_DOMAIN),
            admission_review_versions: vec!["v1".to_string()],
            client_config,
            failure_policy: Some(self.failure_policy().to_string()),
            match_policy: Some(self.match_policy().as_str().to_string()),
            rules: Some(self.rules()),
            side_effects: self.side_effects().to_string(),
            timeout_seconds: Some(self.timeout_seconds()),
            ..Default::default()
        }
    }
}

/// Registration metadata of one node webhook variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSpec {
    pub name: String,
    pub uri: String,
    pub timeout_seconds: i32,
    /// Operations intercepted; anything else is rejected as a bad request
    pub operations: Vec<Operation>,
    pub api_groups: Vec<String>,
    pub match_policy: MatchPolicy,
}

impl WebhookSpec {
    pub fn handles(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }
}

/// Node label policy service.
///
/// Owns its request gate and log span; holds no other state.
pub struct NodeLabelWebhook {
    spec: WebhookSpec,
    policy: PolicyConfig,
    gate: RequestGate,
    span: Span,
}

impl NodeLabelWebhook {
    pub fn new(spec: WebhookSpec, policy: PolicyConfig) -> Self {
        let span = info_span!("webhook", webhook = %spec.name);
        Self {
            spec,
            policy,
            gate: RequestGate::new(),
            span,
        }
    }

    pub fn spec(&self) -> &WebhookSpec {
        &self.spec
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    /// Reject requests this webhook was not registered for
    fn check_scope(&self, request: &AdmissionRequest) -> Result<(), TransportError> {
        if request.username().is_empty() {
            return Err(TransportError::MissingUser);
        }
        if !request.kind.group.is_empty() || request.kind.kind != "Node" {
            return Err(TransportError::UnrecognizedKind(request.kind.to_string()));
        }
        if !self.spec.handles(request.operation) {
            return Err(TransportError::UnsupportedOperation {
                operation: request.operation,
                webhook: self.spec.name.clone(),
            });
        }
        Ok(())
    }

    /// Decode, evaluate and serialize one request
    fn review(&self, body: &[u8]) -> AdmissionOutcome {
        let request = match review::parse_request(body) {
            Ok(request) => request,
            Err((e, uid)) => {
                error!(uid = ?uid, error = %e, "Failed to parse admission request");
                return AdmissionOutcome::errored(uid, &e);
            }
        };

        let uid = request.uid.as_str();
        if let Err(e) = self.check_scope(&request) {
            error!(uid = %uid, error = %e, "Rejected admission request");
            return AdmissionOutcome::errored(Some(request.uid.clone()), &e);
        }

        debug!(
            uid = %uid,
            operation = %request.operation,
            name = ?request.name,
            username = %request.username(),
            dry_run = ?request.dry_run,
            "Processing admission request"
        );

        let node_labels = labels::extract(
            request.operation,
            request.old_object.as_ref(),
            request.object.as_ref(),
        );
        match &node_labels {
            Ok(node_labels) => debug!(
                uid = %uid,
                old = ?node_labels.old,
                new = ?node_labels.new,
                "Extracted node labels"
            ),
            Err(e) => error!(uid = %uid, error = %e, "Failed to decode node object"),
        }

        let result = policies::evaluate(
            &self.policy,
            request.username(),
            request.groups(),
            node_labels.as_ref(),
        );

        if result.rule == principal::UNAUTHENTICATED.name {
            warn!(
                uid = %uid,
                "system:unauthenticated made a webhook request. Check RBAC rules"
            );
        } else if result.allowed {
            info!(uid = %uid, rule = result.rule, "Admission request allowed");
        } else {
            info!(
                uid = %uid,
                username = %request.username(),
                rule = result.rule,
                reason = %result.reason,
                "Admission request denied"
            );
        }

        AdmissionOutcome::decided(Decision::new(request.uid, result))
    }
}

impl Webhook for NodeLabelWebhook {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn uri(&self) -> &str {
        &self.spec.uri
    }

    fn timeout_seconds(&self) -> i32 {
        self.spec.timeout_seconds
    }

    fn rules(&self) -> Vec<RuleWithOperations> {
        vec![RuleWithOperations {
            api_groups: Some(self.spec.api_groups.clone()),
            api_versions: Some(vec!["*".to_string()]),
            operations: Some(
                self.spec
                    .operations
                    .iter()
                    .map(|op| op.as_str().to_string())
                    .collect(),
            ),
            resources: Some(vec!["nodes".to_string(), "nodes/*".to_string()]),
            scope: Some("*".to_string()),
        }]
    }

    fn match_policy(&self) -> MatchPolicy {
        self.spec.match_policy
    }

    fn handle_request(&self, body: &[u8]) -> AdmissionOutcome {
        let _entered = self.span.enter();
        self.gate.admit(|| self.review(body))
    }
}
