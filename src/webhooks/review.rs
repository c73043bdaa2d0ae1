//! `admission.k8s.io/v1` AdmissionReview envelope.
//!
//! The inbound request keeps `object` / `oldObject` as raw JSON so that a
//! malformed node payload becomes a policy denial instead of failing the
//! whole envelope. Responses are kube's `AdmissionResponse`.

use k8s_openapi::api::authentication::v1::UserInfo;
use kube::core::Status;
use kube::core::admission::AdmissionResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::webhooks::error::TransportError;
use crate::webhooks::policies::ValidationResult;

/// Operation being admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
    Connect,
}

impl Operation {
    /// Name used in webhook registration rules
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "CREATE",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Connect => "CONNECT",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Group/version/kind of the resource under admission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupVersionKind {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
}

impl std::fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.kind)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.kind)
        }
    }
}

/// Inbound AdmissionReview
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    pub request: Option<AdmissionRequest>,
}

/// Request half of an AdmissionReview
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    /// Correlation token; echoed in the response
    pub uid: String,
    pub kind: GroupVersionKind,
    #[serde(default)]
    pub sub_resource: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub operation: Operation,
    #[serde(default)]
    pub user_info: UserInfo,
    #[serde(default)]
    pub object: Option<Value>,
    #[serde(default)]
    pub old_object: Option<Value>,
    #[serde(default)]
    pub dry_run: Option<bool>,
}

impl AdmissionRequest {
    pub fn username(&self) -> &str {
        self.user_info.username.as_deref().unwrap_or_default()
    }

    pub fn groups(&self) -> &[String] {
        self.user_info.groups.as_deref().unwrap_or_default()
    }
}

/// Parse a request body into its AdmissionRequest.
///
/// On failure the uid is salvaged from the raw JSON when possible so the
/// error response can still be correlated.
pub fn parse_request(body: &[u8]) -> Result<AdmissionRequest, (TransportError, Option<String>)> {
    let review: AdmissionReview = match serde_json::from_slice(body) {
        Ok(review) => review,
        Err(e) => return Err((TransportError::Malformed(e), salvage_uid(body))),
    };
    review.request.ok_or((TransportError::MissingRequest, None))
}

fn salvage_uid(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value
        .get("request")?
        .get("uid")?
        .as_str()
        .map(ToString::to_string)
}

/// Final verdict for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub uid: String,
    pub allowed: bool,
    pub reason: String,
    /// Rule that produced the verdict
    pub rule: &'static str,
}

impl Decision {
    pub fn new(uid: impl Into<String>, result: ValidationResult) -> Self {
        Self {
            uid: uid.into(),
            allowed: result.allowed,
            reason: result.reason,
            rule: result.rule,
        }
    }

    /// Build the admission response.
    ///
    /// Denials carry code 403 / `Forbidden`; the decision reason is the
    /// status message either way.
    pub fn into_response(self) -> AdmissionResponse {
        let result = if self.allowed {
            let mut status = Status::success().with_code(200);
            status.message = self.reason;
            status
        } else {
            Status::failure(&self.reason, "Forbidden").with_code(403)
        };
        respond(self.uid, self.allowed, result)
    }
}

/// Error response for a request that could not be processed
pub fn errored(uid: Option<String>, error: &TransportError) -> AdmissionResponse {
    let result = Status::failure(&error.to_string(), "BadRequest")
        .with_code(error.status_code().as_u16());
    respond(uid.unwrap_or_default(), false, result)
}

/// Response with an explicit uid, verdict and status
fn respond(uid: String, allowed: bool, result: Status) -> AdmissionResponse {
    let mut response = AdmissionResponse::invalid(&result.message);
    response.uid = uid;
    response.allowed = allowed;
    response.result = result;
    response
}
