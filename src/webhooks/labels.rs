//! Node label extraction and role classification.
//!
//! Decodes the old and new `Node` payloads carried by an admission request
//! into [`LabelSnapshot`]s and projects each snapshot onto a [`NodeRole`]
//! using a configurable [`RoleScheme`].
//!
//! Two label layouts are understood:
//! - Key suffix: `node-role.kubernetes.io/worker=""` (or the bare
//!   `node-role.kubernetes.io=infra` form)
//! - Key value: `type=worker`

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::Node;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::webhooks::review::Operation;

/// Label prefix used by kubelet and OpenShift to advertise node roles
pub const NODE_ROLE_PREFIX: &str = "node-role.kubernetes.io";

/// Label key used by clusters that tag nodes with a plain `type` label
pub const NODE_TYPE_LABEL: &str = "type";

/// Label key to label value, as found on one version of the node
pub type LabelSnapshot = BTreeMap<String, String>;

/// Role of a node, derived from its labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeRole {
    /// Control-plane node
    Master,
    /// Infrastructure node (routers, registry, monitoring)
    Infra,
    /// General-purpose node
    Worker,
    /// No role label present
    Unlabeled,
}

impl NodeRole {
    /// Master and infra nodes may not be touched through this webhook
    pub fn is_protected(self) -> bool {
        matches!(self, NodeRole::Master | NodeRole::Infra)
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Master => write!(f, "master"),
            NodeRole::Infra => write!(f, "infra"),
            NodeRole::Worker => write!(f, "worker"),
            NodeRole::Unlabeled => write!(f, "unlabeled"),
        }
    }
}

/// Which version of the object a payload belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectVersion {
    Old,
    New,
}

impl std::fmt::Display for ObjectVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectVersion::Old => write!(f, "old node object"),
            ObjectVersion::New => write!(f, "node object"),
        }
    }
}

/// A payload could not be decoded as a `Node`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to decode {version}: {detail}")]
pub struct DecodeError {
    pub version: ObjectVersion,
    pub detail: String,
}

impl DecodeError {
    fn missing(version: ObjectVersion) -> Self {
        Self {
            version,
            detail: "object is missing from the request".to_string(),
        }
    }
}

/// Role labels that cannot be mapped onto a single [`NodeRole`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleError {
    /// More than one distinct role is advertised
    #[error("conflicting role labels: {}", join_roles(.0))]
    Conflicting(Vec<NodeRole>),

    /// A role label carries a value outside the known set
    #[error("unrecognized role '{value}' in label '{key}'")]
    Unrecognized { key: String, value: String },
}

fn join_roles(roles: &[NodeRole]) -> String {
    roles
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Where a role is read from in a label map
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleSelector {
    /// The role is the value of `key`, e.g. `type=worker`
    Value { key: String },
    /// The role is the suffix of `prefix/<role>`, or the value of the bare
    /// `prefix` key
    KeySuffix { prefix: String },
}

/// Role label layout plus the closed set of recognised role values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleScheme {
    pub selectors: Vec<RoleSelector>,
    pub values: BTreeMap<String, NodeRole>,
}

impl RoleScheme {
    /// `node-role.kubernetes.io/<role>` layout
    pub fn node_role_labels() -> Self {
        Self {
            selectors: vec![RoleSelector::KeySuffix {
                prefix: NODE_ROLE_PREFIX.to_string(),
            }],
            values: default_role_values(),
        }
    }

    /// `type=<role>` layout
    pub fn type_label() -> Self {
        Self {
            selectors: vec![RoleSelector::Value {
                key: NODE_TYPE_LABEL.to_string(),
            }],
            values: default_role_values(),
        }
    }

    /// Classify a label snapshot.
    ///
    /// Every selector is applied; zero roles found means `Unlabeled`, more
    /// than one distinct role is a conflict.
    pub fn classify(&self, labels: &LabelSnapshot) -> Result<NodeRole, RoleError> {
        let mut found = BTreeSet::new();

        for selector in &self.selectors {
            match selector {
                RoleSelector::Value { key } => {
                    if let Some(value) = labels.get(key) {
                        found.insert(self.lookup(key, value)?);
                    }
                }
                RoleSelector::KeySuffix { prefix } => {
                    for (key, value) in labels {
                        if key == prefix {
                            found.insert(self.lookup(key, value)?);
                        } else if let Some(role) = key
                            .strip_prefix(prefix.as_str())
                            .and_then(|rest| rest.strip_prefix('/'))
                        {
                            found.insert(self.lookup(key, role)?);
                        }
                    }
                }
            }
        }

        let mut roles = found.into_iter();
        match (roles.next(), roles.next()) {
            (None, _) => Ok(NodeRole::Unlabeled),
            (Some(role), None) => Ok(role),
            (Some(first), Some(second)) => {
                let mut all = vec![first, second];
                all.extend(roles);
                Err(RoleError::Conflicting(all))
            }
        }
    }

    fn lookup(&self, key: &str, value: &str) -> Result<NodeRole, RoleError> {
        self.values
            .get(value)
            .copied()
            .ok_or_else(|| RoleError::Unrecognized {
                key: key.to_string(),
                value: value.to_string(),
            })
    }
}

fn default_role_values() -> BTreeMap<String, NodeRole> {
    BTreeMap::from([
        ("master".to_string(), NodeRole::Master),
        ("control-plane".to_string(), NodeRole::Master),
        ("infra".to_string(), NodeRole::Infra),
        ("worker".to_string(), NodeRole::Worker),
    ])
}

/// Labels of both versions of the node under admission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeLabels {
    pub old: LabelSnapshot,
    pub new: LabelSnapshot,
}

/// Decode one payload into the node's labels
pub fn decode_labels(
    version: ObjectVersion,
    raw: Option<&Value>,
) -> Result<LabelSnapshot, DecodeError> {
    let raw = raw.ok_or_else(|| DecodeError::missing(version))?;
    let node = Node::deserialize(raw).map_err(|e| DecodeError {
        version,
        detail: e.to_string(),
    })?;
    Ok(node.metadata.labels.unwrap_or_default())
}

/// Extract label snapshots for both versions of the node.
///
/// The old object is always required. On DELETE the new snapshot is empty
/// and any `object` payload is ignored.
pub fn extract(
    operation: Operation,
    old_object: Option<&Value>,
    object: Option<&Value>,
) -> Result<NodeLabels, DecodeError> {
    let old = decode_labels(ObjectVersion::Old, old_object)?;
    let new = match operation {
        Operation::Delete => LabelSnapshot::new(),
        _ => decode_labels(ObjectVersion::New, object)?,
    };
    Ok(NodeLabels { old, new })
}
