//! Hosted Git platform client (GitHub first).
//!
//! The client speaks the platform's REST surface over blocking HTTP with a
//! per-call timeout, retrying transient failures (5xx, 429, transport
//! errors) under a bounded backoff budget. Auth/permission failures are
//! never retried.

use serde::{Deserialize, Serialize};

mod error;
mod github;
mod retry;

pub use error::PlatformError;
pub use github::{CreatePullRequest, GithubClient};
pub use retry::RetryConfig;

/// Result alias for platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Merge strategy for [`GithubClient::merge_pull_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MergeMethod {
    Merge,
    Squash,
    Rebase,
}

/// A pull request as seen on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
    /// `open` or `closed`.
    pub state: String,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub merged_at: Option<chrono::DateTime<chrono::Utc>>,
    pub head: PullRequestRef,
    pub base: PullRequestRef,
}

impl PullRequest {
    pub fn is_open(&self) -> bool {
        self.state == "open"
    }
}

/// One side of a pull request (head or base).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestRef {
    #[serde(rename = "ref")]
    pub branch: String,
    pub sha: String,
}

/// Result of a merge call.
#[derive(Debug, Clone, Deserialize)]
pub struct MergeResult {
    pub merged: bool,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A review on a pull request.
#[derive(Debug, Clone, Deserialize)]
pub struct Review {
    pub state: String,
    #[serde(default)]
    pub user: Option<ReviewUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewUser {
    pub login: String,
}

/// Aggregated review status for a pull request.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummary {
    pub approvals: usize,
    pub changes_requested: usize,
    pub total: usize,
}

impl ReviewSummary {
    pub fn from_reviews(reviews: &[Review]) -> Self {
        let mut summary = Self { total: reviews.len(), ..Self::default() };
        for review in reviews {
            match review.state.as_str() {
                "APPROVED" => summary.approvals += 1,
                "CHANGES_REQUESTED" => summary.changes_requested += 1,
                _ => {}
            }
        }
        summary
    }
}

/// A single CI check run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRun {
    pub name: String,
    /// `queued`, `in_progress`, or `completed`.
    pub status: String,
    /// Set once completed: `success`, `failure`, `neutral`, `cancelled`,
    /// `skipped`, `timed_out`, `action_required`.
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl CheckRun {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }

    /// Completed with a conclusion that counts as passing.
    pub fn passed(&self) -> bool {
        self.is_completed()
            && matches!(
                self.conclusion.as_deref(),
                Some("success") | Some("neutral") | Some("skipped")
            )
    }

    /// Completed with a failing conclusion.
    pub fn failed(&self) -> bool {
        self.is_completed() && !self.passed()
    }
}

/// Check-run totals for one ref.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRunSummary {
    pub passed: usize,
    pub failed: usize,
    pub pending: usize,
    pub total: usize,
    pub runs: Vec<CheckRun>,
}

impl CheckRunSummary {
    pub fn from_runs(runs: Vec<CheckRun>) -> Self {
        let mut summary = Self { total: runs.len(), ..Self::default() };
        for run in &runs {
            if run.passed() {
                summary.passed += 1;
            } else if run.failed() {
                summary.failed += 1;
            } else {
                summary.pending += 1;
            }
        }
        summary.runs = runs;
        summary
    }

    /// All runs completed (possibly zero runs).
    pub fn all_completed(&self) -> bool {
        self.pending == 0
    }

    /// Names and URLs of failing runs, for error reporting.
    pub fn failing_runs(&self) -> Vec<&CheckRun> {
        self.runs.iter().filter(|r| r.failed()).collect()
    }
}

/// A created release.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub id: u64,
    pub html_url: String,
    pub tag_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(status: &str, conclusion: Option<&str>) -> CheckRun {
        CheckRun {
            name: "build".into(),
            status: status.into(),
            conclusion: conclusion.map(str::to_string),
            html_url: None,
        }
    }

    #[test]
    fn test_check_run_classification() {
        assert!(run("completed", Some("success")).passed());
        assert!(run("completed", Some("neutral")).passed());
        assert!(run("completed", Some("skipped")).passed());
        assert!(run("completed", Some("failure")).failed());
        assert!(run("completed", Some("timed_out")).failed());
        assert!(!run("in_progress", None).is_completed());
        assert!(!run("queued", None).failed());
    }

    #[test]
    fn test_check_run_summary() {
        let summary = CheckRunSummary::from_runs(vec![
            run("completed", Some("success")),
            run("completed", Some("failure")),
            run("in_progress", None),
        ]);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.total, 3);
        assert!(!summary.all_completed());
        assert_eq!(summary.failing_runs().len(), 1);
    }

    #[test]
    fn test_review_summary() {
        let reviews = vec![
            Review { state: "APPROVED".into(), user: None },
            Review { state: "APPROVED".into(), user: None },
            Review { state: "CHANGES_REQUESTED".into(), user: None },
            Review { state: "COMMENTED".into(), user: None },
        ];
        let summary = ReviewSummary::from_reviews(&reviews);
        assert_eq!(summary.approvals, 2);
        assert_eq!(summary.changes_requested, 1);
        assert_eq!(summary.total, 4);
    }
}
