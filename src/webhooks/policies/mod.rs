//! Label-transition policy for node admission requests.
//!
//! Rules are evaluated in order and the first match decides:
//! - Principal rules: anonymous requests are denied, principals outside the
//!   privileged groups are out of scope and allowed
//! - Role-transition rules: privileged principals may not touch protected
//!   nodes, strip a worker role, or promote a node into a protected role
//!
//! A request that matches no rule is allowed.

pub mod principal;
pub mod role_transition;

use std::collections::BTreeSet;

use crate::webhooks::labels::{
    DecodeError, LabelSnapshot, NodeLabels, NodeRole, RoleError, RoleScheme,
};

/// Reason attached to allowed requests
pub const ALLOWED_REASON: &str = "New label does not infringe on node properties";
/// Reason for denials caused by the anonymous identity
pub const UNAUTHENTICATED_REASON: &str = "Unauthenticated";
/// Reason for role-transition denials
pub const UNAUTHORIZED_REASON: &str = "UnauthorizedAction";
/// Reason for denials caused by unreadable role labels
pub const UNCLASSIFIABLE_REASON: &str = "UnclassifiableRole";

/// Rule name reported when no rule matched
pub const DEFAULT_RULE: &str = "default";
/// Rule name reported when a payload could not be decoded
pub const DECODE_RULE: &str = "decode";

/// Static configuration of one policy variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Groups whose members are subject to the role-transition rules
    pub privileged_groups: BTreeSet<String>,
    /// How role labels are read
    pub roles: RoleScheme,
}

impl PolicyConfig {
    pub fn new<I, S>(privileged_groups: I, roles: RoleScheme) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            privileged_groups: privileged_groups.into_iter().map(Into::into).collect(),
            roles,
        }
    }
}

/// Whether a matched rule admits or rejects the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny,
}

/// A named predicate paired with the verdict it produces
pub struct PolicyRule {
    pub name: &'static str,
    pub verdict: Verdict,
    pub reason: &'static str,
    pub matches: fn(&ValidationContext<'_>) -> bool,
}

impl PolicyRule {
    fn result(&self) -> ValidationResult {
        ValidationResult {
            allowed: self.verdict == Verdict::Allow,
            reason: self.reason.to_string(),
            rule: self.name,
        }
    }
}

impl std::fmt::Debug for PolicyRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyRule")
            .field("name", &self.name)
            .field("verdict", &self.verdict)
            .field("reason", &self.reason)
            .finish()
    }
}

/// Ordered rule table
pub static RULES: [PolicyRule; 6] = [
    principal::UNAUTHENTICATED,
    principal::UNPRIVILEGED,
    role_transition::UNCLASSIFIABLE,
    role_transition::PROTECTED_ROLE,
    role_transition::ROLE_DOWNGRADE,
    role_transition::ROLE_ESCALATION,
];

/// Result of a validation check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// Whether the request is admitted
    pub allowed: bool,
    /// Stable, human-readable reason for audit logs
    pub reason: String,
    /// Name of the rule that decided
    pub rule: &'static str,
}

impl ValidationResult {
    /// Result of a request no rule objected to
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: ALLOWED_REASON.to_string(),
            rule: DEFAULT_RULE,
        }
    }

    /// Result of a request whose payloads could not be decoded
    pub fn decode_failed(error: &DecodeError) -> Self {
        Self {
            allowed: false,
            reason: error.to_string(),
            rule: DECODE_RULE,
        }
    }
}

/// Everything the rules look at for one request
pub struct ValidationContext<'a> {
    pub config: &'a PolicyConfig,
    pub username: &'a str,
    pub groups: &'a [String],
    pub old_labels: &'a LabelSnapshot,
    pub new_labels: &'a LabelSnapshot,
    pub old_role: Result<NodeRole, RoleError>,
    pub new_role: Result<NodeRole, RoleError>,
}

impl<'a> ValidationContext<'a> {
    /// Build a context, classifying both label snapshots
    pub fn new(
        config: &'a PolicyConfig,
        username: &'a str,
        groups: &'a [String],
        labels: &'a NodeLabels,
    ) -> Self {
        Self {
            config,
            username,
            groups,
            old_labels: &labels.old,
            new_labels: &labels.new,
            old_role: config.roles.classify(&labels.old),
            new_role: config.roles.classify(&labels.new),
        }
    }

    /// Check if the requester belongs to a privileged group
    pub fn is_privileged(&self) -> bool {
        self.groups
            .iter()
            .any(|group| self.config.privileged_groups.contains(group))
    }

    /// Both role states, if both could be classified
    pub fn roles(&self) -> Option<(NodeRole, NodeRole)> {
        match (&self.old_role, &self.new_role) {
            (Ok(old), Ok(new)) => Some((*old, *new)),
            _ => None,
        }
    }
}

/// Run the rule table; the first matching rule decides
pub fn validate_all(ctx: &ValidationContext<'_>) -> ValidationResult {
    RULES
        .iter()
        .find(|rule| (rule.matches)(ctx))
        .map(PolicyRule::result)
        .unwrap_or_else(ValidationResult::allowed)
}

/// Evaluate a request from its extracted labels.
///
/// A decode failure on either payload denies the request before any rule runs.
pub fn evaluate(
    config: &PolicyConfig,
    username: &str,
    groups: &[String],
    labels: Result<&NodeLabels, &DecodeError>,
) -> ValidationResult {
    match labels {
        Ok(labels) => validate_all(&ValidationContext::new(config, username, groups, labels)),
        Err(error) => ValidationResult::decode_failed(error),
    }
}
