//! Test fixtures and builder patterns for AdmissionReview bodies.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::{Value, json};

/// Privileged group of the `node-labels-validation` variant
pub const LABELS_ADMIN_GROUP: &str = "dedicated-admin";
/// Privileged group of the `node-validation` variant
pub const NODE_ADMIN_GROUP: &str = "dedicated-admins";

/// Build a Node payload with the given labels.
pub fn node(name: &str, labels: &[(&str, &str)]) -> Value {
    let labels: BTreeMap<String, String> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let node = Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        ..Default::default()
    };
    serde_json::to_value(node).unwrap_or(Value::Null)
}

/// Builder for creating AdmissionReview request bodies.
///
/// # Example
/// ```
/// let body = AdmissionReviewBuilder::update("uid-1")
///     .user("jane", &["dedicated-admin"])
///     .old_labels(&[("type", "worker")])
///     .new_labels(&[])
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct AdmissionReviewBuilder {
    uid: String,
    operation: String,
    kind: Value,
    username: String,
    groups: Vec<String>,
    with_user: bool,
    object: Option<Value>,
    old_object: Option<Value>,
}

impl AdmissionReviewBuilder {
    fn new(uid: impl Into<String>, operation: &str) -> Self {
        Self {
            uid: uid.into(),
            operation: operation.to_string(),
            kind: json!({ "group": "", "version": "v1", "kind": "Node" }),
            username: "jane".to_string(),
            groups: vec!["system:authenticated".to_string()],
            with_user: true,
            object: None,
            old_object: None,
        }
    }

    /// Start an UPDATE request.
    pub fn update(uid: impl Into<String>) -> Self {
        Self::new(uid, "UPDATE")
    }

    /// Start a DELETE request.
    pub fn delete(uid: impl Into<String>) -> Self {
        Self::new(uid, "DELETE")
    }

    /// Set the requesting user and groups.
    pub fn user(mut self, username: &str, groups: &[&str]) -> Self {
        self.username = username.to_string();
        self.groups = groups.iter().map(|g| g.to_string()).collect();
        self
    }

    /// Leave `userInfo` out of the request.
    pub fn without_user(mut self) -> Self {
        self.with_user = false;
        self
    }

    /// Set the labels of the old node.
    pub fn old_labels(mut self, labels: &[(&str, &str)]) -> Self {
        self.old_object = Some(node("worker-1", labels));
        self
    }

    /// Set the labels of the new node.
    pub fn new_labels(mut self, labels: &[(&str, &str)]) -> Self {
        self.object = Some(node("worker-1", labels));
        self
    }

    /// Replace the new object with an arbitrary payload.
    pub fn raw_object(mut self, object: Value) -> Self {
        self.object = Some(object);
        self
    }

    /// Replace the resource kind.
    pub fn kind(mut self, group: &str, version: &str, kind: &str) -> Self {
        self.kind = json!({ "group": group, "version": version, "kind": kind });
        self
    }

    /// Build the AdmissionReview as JSON.
    pub fn build_value(self) -> Value {
        let mut review = json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": self.uid,
                "kind": self.kind,
                "resource": { "group": "", "version": "v1", "resource": "nodes" },
                "name": "worker-1",
                "operation": self.operation,
                "userInfo": { "username": self.username, "groups": self.groups },
                "object": self.object,
                "oldObject": self.old_object,
                "dryRun": false
            }
        });
        if !self.with_user
            && let Some(request) = review["request"].as_object_mut()
        {
            request.remove("userInfo");
        }
        review
    }

    /// Build the AdmissionReview body bytes.
    pub fn build(self) -> Vec<u8> {
        serde_json::to_vec(&self.build_value()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let value = AdmissionReviewBuilder::update("uid-1").build_value();
        assert_eq!(value["request"]["uid"], "uid-1");
        assert_eq!(value["request"]["operation"], "UPDATE");
        assert!(value["request"]["object"].is_null());
    }

    #[test]
    fn test_builder_without_user() {
        let value = AdmissionReviewBuilder::update("uid-1").without_user().build_value();
        assert!(value["request"].get("userInfo").is_none());
    }

    #[test]
    fn test_node_payload_has_type_meta() {
        let value = node("n1", &[("type", "worker")]);
        assert_eq!(value["kind"], "Node");
        assert_eq!(value["metadata"]["labels"]["type"], "worker");
    }
}
