// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Functional tests for the admission webhooks.
//!
//! These tests drive the full HTTP router WITHOUT a Kubernetes cluster or
//! TLS: AdmissionReview bodies go in, AdmissionReview responses come out.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_worker_role_removed_by_admin
//! ```
//!
//! ## Test Categories
//!
//! - **Scenario tests**: label transitions end to end on both variants
//! - **Envelope tests**: malformed payloads, bad requests, uid handling
//! - **Concurrency tests**: parallel requests through one webhook instance

#[path = "../common/mod.rs"]
mod common;

mod harness;
mod scenario_tests;

pub use harness::*;
