//! Pre/post-flight check engine.
//!
//! A check is a named predicate producing a structured [`CheckResult`].
//! Tools declare by id which checks run; the engine evaluates them in
//! declaration order without short-circuiting, so the caller always sees
//! the complete picture. Prompt-level results suspend the tool and surface
//! numbered options; `auto` mode selects the recommended option without a
//! round trip. Post-flight verifications share the same shape but are
//! always advisory.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::git::Repository;
use crate::platform::PullRequest;
use crate::session::{SessionStore, WorkflowSession, WorkflowState};

pub mod engine;
pub mod postflight;
pub mod preflight;

pub use engine::{CheckDef, run_checks};

/// Severity of a check result.
///
/// `all_passed` is true iff every result is info, pass, or warn.
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CheckLevel {
    Info,
    Pass,
    Warn,
    Fail,
    Prompt,
}

impl CheckLevel {
    /// Does this level count toward `all_passed`?
    pub fn is_passing(self) -> bool {
        matches!(self, CheckLevel::Info | CheckLevel::Pass | CheckLevel::Warn)
    }
}

/// Risk attached to a prompt option.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// One numbered remediation option on a prompt-level result.
///
/// Exactly one option per prompt carries `auto_recommended = true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckOption {
    pub id: String,
    pub label: String,
    pub description: String,
    /// What choosing this option makes the tool do.
    pub action: String,
    pub risk: RiskLevel,
    pub auto_recommended: bool,
}

/// Structured outcome of one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub id: String,
    pub name: String,
    pub level: CheckLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CheckOption>,
}

impl CheckResult {
    fn leveled(id: &str, name: &str, level: CheckLevel, message: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            level,
            message: message.into(),
            suggestions: Vec::new(),
            options: Vec::new(),
        }
    }

    pub fn pass(id: &str, name: &str, message: impl Into<String>) -> Self {
        Self::leveled(id, name, CheckLevel::Pass, message)
    }

    pub fn info(id: &str, name: &str, message: impl Into<String>) -> Self {
        Self::leveled(id, name, CheckLevel::Info, message)
    }

    pub fn warn(id: &str, name: &str, message: impl Into<String>) -> Self {
        Self::leveled(id, name, CheckLevel::Warn, message)
    }

    pub fn fail(id: &str, name: &str, message: impl Into<String>) -> Self {
        Self::leveled(id, name, CheckLevel::Fail, message)
    }

    pub fn prompt(
        id: &str,
        name: &str,
        message: impl Into<String>,
        options: Vec<CheckOption>,
    ) -> Self {
        debug_assert_eq!(
            options.iter().filter(|o| o.auto_recommended).count(),
            1,
            "exactly one option per prompt must be auto-recommended"
        );
        Self {
            options,
            ..Self::leveled(id, name, CheckLevel::Prompt, message)
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn passed(&self) -> bool {
        self.level.is_passing()
    }
}

/// Aggregate verdict over an ordered list of results.
#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub results: Vec<CheckResult>,
    pub all_passed: bool,
}

impl CheckReport {
    pub fn new(results: Vec<CheckResult>) -> Self {
        let all_passed = results.iter().all(CheckResult::passed);
        Self { results, all_passed }
    }

    /// Results at prompt level, in order.
    pub fn prompts(&self) -> Vec<&CheckResult> {
        self.results
            .iter()
            .filter(|r| r.level == CheckLevel::Prompt)
            .collect()
    }

    pub fn failures(&self) -> Vec<&CheckResult> {
        self.results
            .iter()
            .filter(|r| r.level == CheckLevel::Fail)
            .collect()
    }
}

/// Readiness of the platform client at check time.
#[derive(Debug, Clone, Default)]
pub enum PlatformReadiness {
    /// The tool did not attempt to initialize the client.
    #[default]
    Untested,
    Ready,
    Failed(String),
}

/// Everything a check may consult. Checks are pure: they read this context
/// and the repository, and never mutate session, repository, or platform
/// state.
pub struct CheckContext<'a> {
    pub repo: &'a Repository,
    pub store: &'a SessionStore,
    /// The trunk branch name (`main` or `master`).
    pub trunk: &'a str,
    pub current_branch: Option<&'a str>,
    /// The branch the operation targets (proposed, existing, or current).
    pub branch: Option<&'a str>,
    /// The session in scope, when one exists.
    pub session: Option<&'a WorkflowSession>,
    /// Acceptable states for `sessionStateIs`.
    pub expected_states: &'a [WorkflowState],
    /// The tool was invoked with `stagedOnly`.
    pub staged_only: bool,
    /// Auto mode: prompt checks resolve to their recommended option.
    pub auto: bool,
    /// Chosen option ids from a follow-up invocation, keyed by check id.
    pub choices: &'a BTreeMap<String, String>,
    /// Check ids whose failures are downgraded to warnings for this tool.
    pub advisory: &'a [&'static str],
    /// Open PRs for `branch`, when the tool fetched them. `None` means the
    /// platform was not consulted.
    pub open_prs: Option<&'a [PullRequest]>,
    pub platform: PlatformReadiness,
    /// Whether the repository has check-suite history, when known.
    pub ci_configured: Option<bool>,
}

impl<'a> CheckContext<'a> {
    /// The option id a prompt check should act on, if the caller already
    /// decided: an explicit choice wins, else auto mode picks the
    /// recommended option.
    pub fn effective_choice(&self, check_id: &str, options: &[CheckOption]) -> Option<String> {
        if let Some(choice) = self.choices.get(check_id) {
            return Some(choice.clone());
        }
        if self.auto {
            return options
                .iter()
                .find(|o| o.auto_recommended)
                .map(|o| o.id.clone());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_passing() {
        assert!(CheckLevel::Info.is_passing());
        assert!(CheckLevel::Pass.is_passing());
        assert!(CheckLevel::Warn.is_passing());
        assert!(!CheckLevel::Fail.is_passing());
        assert!(!CheckLevel::Prompt.is_passing());
    }

    #[test]
    fn test_report_verdict() {
        let report = CheckReport::new(vec![
            CheckResult::pass("a", "A", "ok"),
            CheckResult::warn("b", "B", "meh"),
        ]);
        assert!(report.all_passed);

        let report = CheckReport::new(vec![
            CheckResult::pass("a", "A", "ok"),
            CheckResult::fail("b", "B", "bad"),
        ]);
        assert!(!report.all_passed);
        assert_eq!(report.failures().len(), 1);
    }

    #[test]
    fn test_result_wire_form() {
        let result = CheckResult::fail("branchNameAvailable", "Branch name available", "burned")
            .with_suggestions(vec!["feature/x-v2".into()]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["id"], "branchNameAvailable");
        assert_eq!(json["level"], "fail");
        assert_eq!(json["suggestions"][0], "feature/x-v2");
        assert!(json.get("options").is_none());
    }
}
