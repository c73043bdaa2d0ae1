//! Role-transition rules.
//!
//! Only reached by privileged principals. Validates:
//! - Role labels on both versions can be classified
//! - Master and infra nodes are not modified
//! - Worker nodes keep their worker role
//! - No node is promoted into master or infra

use super::{PolicyRule, UNAUTHORIZED_REASON, UNCLASSIFIABLE_REASON, ValidationContext, Verdict};
use crate::webhooks::labels::NodeRole;

/// Conflicting or unknown role labels are rejected rather than guessed
pub const UNCLASSIFIABLE: PolicyRule = PolicyRule {
    name: "unclassifiable-role",
    verdict: Verdict::Deny,
    reason: UNCLASSIFIABLE_REASON,
    matches: is_unclassifiable,
};

pub const PROTECTED_ROLE: PolicyRule = PolicyRule {
    name: "protected-role",
    verdict: Verdict::Deny,
    reason: UNAUTHORIZED_REASON,
    matches: touches_protected_node,
};

pub const ROLE_DOWNGRADE: PolicyRule = PolicyRule {
    name: "role-downgrade",
    verdict: Verdict::Deny,
    reason: UNAUTHORIZED_REASON,
    matches: strips_worker_role,
};

pub const ROLE_ESCALATION: PolicyRule = PolicyRule {
    name: "role-escalation",
    verdict: Verdict::Deny,
    reason: UNAUTHORIZED_REASON,
    matches: promotes_to_protected_role,
};

fn is_unclassifiable(ctx: &ValidationContext<'_>) -> bool {
    ctx.old_role.is_err() || ctx.new_role.is_err()
}

fn touches_protected_node(ctx: &ValidationContext<'_>) -> bool {
    matches!(ctx.roles(), Some((old, _)) if old.is_protected())
}

fn strips_worker_role(ctx: &ValidationContext<'_>) -> bool {
    matches!(ctx.roles(), Some((NodeRole::Worker, new)) if new != NodeRole::Worker)
}

fn promotes_to_protected_role(ctx: &ValidationContext<'_>) -> bool {
    matches!(ctx.roles(), Some((old, new)) if !old.is_protected() && new.is_protected())
}
