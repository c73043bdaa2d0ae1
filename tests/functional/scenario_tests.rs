//! Label transitions end to end through the router.

use crate::common::fixtures::{AdmissionReviewBuilder, LABELS_ADMIN_GROUP, NODE_ADMIN_GROUP};
use crate::{Harness, LABELS_VALIDATION_URI, NODE_VALIDATION_URI, expect_verdict};

const ALLOWED: &str = "New label does not infringe on node properties";
const UNAUTHORIZED: &str = "UnauthorizedAction";

fn admin_update(uid: &str) -> AdmissionReviewBuilder {
    AdmissionReviewBuilder::update(uid).user("jane", &["system:authenticated", LABELS_ADMIN_GROUP])
}

#[tokio::test]
async fn test_worker_role_removed_by_admin() {
    let harness = Harness::new();
    let body = admin_update("uid-a")
        .old_labels(&[("type", "worker")])
        .new_labels(&[])
        .build();

    let (status, response) = harness.post(LABELS_VALIDATION_URI, body).await;
    let message = expect_verdict(status, &response, false);
    assert_eq!(message, UNAUTHORIZED);
    assert_eq!(response["response"]["uid"], "uid-a");
    assert_eq!(response["response"]["status"]["reason"], "Forbidden");
}

#[tokio::test]
async fn test_unrelated_label_added_to_worker() {
    let harness = Harness::new();
    let body = admin_update("uid-b")
        .old_labels(&[("type", "worker")])
        .new_labels(&[("type", "worker"), ("zone", "us-east")])
        .build();

    let (status, response) = harness.post(LABELS_VALIDATION_URI, body).await;
    assert_eq!(expect_verdict(status, &response, true), ALLOWED);
}

#[tokio::test]
async fn test_unprivileged_user_is_not_restricted() {
    let harness = Harness::new();
    let body = AdmissionReviewBuilder::update("uid-c")
        .user("bob", &["system:authenticated"])
        .old_labels(&[("type", "worker")])
        .new_labels(&[("type", "master")])
        .build();

    let (status, response) = harness.post(LABELS_VALIDATION_URI, body).await;
    assert_eq!(expect_verdict(status, &response, true), ALLOWED);
}

#[tokio::test]
async fn test_infra_node_is_frozen_for_admins() {
    let harness = Harness::new();
    let body = admin_update("uid-d")
        .old_labels(&[("type", "infra")])
        .new_labels(&[("type", "infra"), ("extra", "x")])
        .build();

    let (status, response) = harness.post(LABELS_VALIDATION_URI, body).await;
    assert_eq!(expect_verdict(status, &response, false), UNAUTHORIZED);
}

#[tokio::test]
async fn test_promotion_to_master_denied() {
    let harness = Harness::new();
    let body = admin_update("uid-e")
        .old_labels(&[])
        .new_labels(&[("type", "master")])
        .build();

    let (status, response) = harness.post(LABELS_VALIDATION_URI, body).await;
    assert_eq!(expect_verdict(status, &response, false), UNAUTHORIZED);
}

#[tokio::test]
async fn test_unlabeled_node_becomes_worker() {
    let harness = Harness::new();
    let body = admin_update("uid-f")
        .old_labels(&[])
        .new_labels(&[("type", "worker")])
        .build();

    let (status, response) = harness.post(LABELS_VALIDATION_URI, body).await;
    expect_verdict(status, &response, true);
}

#[tokio::test]
async fn test_anonymous_user_denied() {
    let harness = Harness::new();
    let body = AdmissionReviewBuilder::update("uid-g")
        .user("system:unauthenticated", &["system:unauthenticated"])
        .old_labels(&[])
        .new_labels(&[("zone", "us-east")])
        .build();

    let (status, response) = harness.post(LABELS_VALIDATION_URI, body).await;
    assert_eq!(expect_verdict(status, &response, false), "Unauthenticated");
}

#[tokio::test]
async fn test_conflicting_role_labels_denied() {
    let harness = Harness::new();
    let body = AdmissionReviewBuilder::update("uid-h")
        .user("jane", &[NODE_ADMIN_GROUP])
        .old_labels(&[("node-role.kubernetes.io/worker", "")])
        .new_labels(&[
            ("node-role.kubernetes.io/worker", ""),
            ("node-role.kubernetes.io/infra", ""),
        ])
        .build();

    let (status, response) = harness.post(NODE_VALIDATION_URI, body).await;
    assert_eq!(expect_verdict(status, &response, false), "UnclassifiableRole");
}

#[tokio::test]
async fn test_node_role_layout_downgrade_denied() {
    let harness = Harness::new();
    let body = AdmissionReviewBuilder::update("uid-i")
        .user("jane", &[NODE_ADMIN_GROUP])
        .old_labels(&[("node-role.kubernetes.io/worker", ""), ("zone", "a")])
        .new_labels(&[("zone", "a")])
        .build();

    let (status, response) = harness.post(NODE_VALIDATION_URI, body).await;
    assert_eq!(expect_verdict(status, &response, false), UNAUTHORIZED);
}

#[tokio::test]
async fn test_groups_are_per_variant() {
    let harness = Harness::new();

    // dedicated-admin is privileged only on the type-label variant
    let body = admin_update("uid-j")
        .old_labels(&[("node-role.kubernetes.io/worker", "")])
        .new_labels(&[])
        .build();

    let (status, response) = harness.post(NODE_VALIDATION_URI, body).await;
    expect_verdict(status, &response, true);
}

#[tokio::test]
async fn test_delete_worker_node_denied() {
    let harness = Harness::new();
    let body = AdmissionReviewBuilder::delete("uid-k")
        .user("jane", &[NODE_ADMIN_GROUP])
        .old_labels(&[("node-role.kubernetes.io/worker", "")])
        .build();

    let (status, response) = harness.post(NODE_VALIDATION_URI, body).await;
    assert_eq!(expect_verdict(status, &response, false), UNAUTHORIZED);
}

#[tokio::test]
async fn test_delete_unlabeled_node_allowed() {
    let harness = Harness::new();
    let body = AdmissionReviewBuilder::delete("uid-l")
        .user("jane", &[NODE_ADMIN_GROUP])
        .old_labels(&[("zone", "a")])
        .build();

    let (status, response) = harness.post(NODE_VALIDATION_URI, body).await;
    expect_verdict(status, &response, true);
}

#[tokio::test]
async fn test_decisions_are_recorded() {
    let harness = Harness::new();
    let body = admin_update("uid-m")
        .old_labels(&[("type", "worker")])
        .new_labels(&[])
        .build();
    harness.post(LABELS_VALIDATION_URI, body).await;

    let metrics = harness.health.metrics.encode();
    assert!(metrics.contains(
        r#"node_label_guard_admission_decisions_total{webhook="node-labels-validation",allowed="false",rule="role-downgrade"} 1"#
    ));
}
