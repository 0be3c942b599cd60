//! Tool results and the error taxonomy.
//!
//! Every tool invocation resolves to a [`ToolResult`]; errors are tagged
//! kinds on the result, never unhandled exceptions crossing the transport.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checks::CheckResult;
use crate::session::WorkflowState;

/// Tagged error kinds surfaced on a [`ToolResult`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    schemars::JsonSchema,
    strum::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    NotInitialized,
    PreFlightFailed,
    MissingParameter,
    InvalidStateTransition,
    GitFailure,
    PlatformUnreachable,
    PlatformForbidden,
    DuplicateOpenPr,
    BranchReuseForbidden,
    CiFailed,
    CiTimeout,
    Cancelled,
    LockHeld,
    Internal,
    UnknownTool,
}

/// The uniform shape every tool returns over the transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<WorkflowState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_flight_checks: Vec<CheckResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_flight_verifications: Vec<CheckResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_steps: Vec<String>,
}

impl ToolResult {
    pub fn ok() -> Self {
        Self { success: true, ..Self::default() }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_kind: Some(kind),
            errors: vec![message.into()],
            ..Self::default()
        }
    }

    pub fn with_next_steps(mut self, steps: Vec<String>) -> Self {
        self.next_steps = steps;
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A business-logic failure with an explicit kind, raised inside
/// `execute` and converted to a [`ToolResult`] by the driver.
#[derive(Debug)]
pub struct ToolError {
    pub kind: ErrorKind,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub next_steps: Vec<String>,
}

impl ToolError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
            next_steps: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_next_steps(mut self, steps: Vec<String>) -> Self {
        self.next_steps = steps;
        self
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ToolError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_wire_form() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::PreFlightFailed).unwrap(),
            "\"pre-flight-failed\""
        );
        assert_eq!(ErrorKind::DuplicateOpenPr.to_string(), "duplicate-open-pr");
        assert_eq!(ErrorKind::CiTimeout.to_string(), "ci-timeout");
    }

    #[test]
    fn test_result_serialization_skips_empty() {
        let result = ToolResult::ok();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json, serde_json::json!({ "success": true }));
    }

    #[test]
    fn test_error_result_shape() {
        let result = ToolResult::error(ErrorKind::GitFailure, "git push failed")
            .with_next_steps(vec!["check the remote".into()]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["errorKind"], "git-failure");
        assert_eq!(json["errors"][0], "git push failed");
        assert_eq!(json["nextSteps"][0], "check the remote");
    }
}
