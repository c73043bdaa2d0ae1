//! Principal rules.
//!
//! Decided from the requester's identity alone; labels are not consulted.

use super::{ALLOWED_REASON, PolicyRule, UNAUTHENTICATED_REASON, ValidationContext, Verdict};

/// Username the API server assigns to anonymous requests
pub const ANONYMOUS_USER: &str = "system:unauthenticated";

/// An anonymous identity reaching this webhook means RBAC is misconfigured
pub const UNAUTHENTICATED: PolicyRule = PolicyRule {
    name: "unauthenticated",
    verdict: Verdict::Deny,
    reason: UNAUTHENTICATED_REASON,
    matches: is_anonymous,
};

/// Principals outside the privileged groups are authorized elsewhere
pub const UNPRIVILEGED: PolicyRule = PolicyRule {
    name: "unprivileged",
    verdict: Verdict::Allow,
    reason: ALLOWED_REASON,
    matches: is_unprivileged,
};

fn is_anonymous(ctx: &ValidationContext<'_>) -> bool {
    ctx.username == ANONYMOUS_USER
}

fn is_unprivileged(ctx: &ValidationContext<'_>) -> bool {
    !ctx.is_privileged()
}
