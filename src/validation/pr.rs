//! Pull-request lifecycle validation.
//!
//! Enforces "at most one live PR per branch lifecycle" and classifies the
//! correct create/update action for a ship step.

use crate::platform::PullRequest;
use crate::session::WorkflowSession;

/// What the PR step of a ship should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrAction {
    /// No open PR and no prior merged PR in this lifecycle.
    CreateNew,
    /// Exactly one open PR exists with this head; update it.
    UpdateExisting { number: u64 },
    /// More than one open PR shares this head. Fatal; requires a manual
    /// close before the workflow may continue.
    DuplicateOpen { numbers: Vec<u64> },
    /// No open PR, but this lifecycle already merged one. A new PR will be
    /// created; allowed only in continued-work.
    ResurrectAfterMerge { previous: u64 },
}

impl PrAction {
    pub fn is_fatal(&self) -> bool {
        matches!(self, PrAction::DuplicateOpen { .. })
    }
}

/// Classify the PR action for `session` given the open PRs whose head is
/// the session branch.
pub fn classify_pr_action(open_prs: &[PullRequest], session: &WorkflowSession) -> PrAction {
    match open_prs.len() {
        0 => match &session.metadata.pr {
            Some(pr) if pr.merged => PrAction::ResurrectAfterMerge { previous: pr.number },
            _ => PrAction::CreateNew,
        },
        1 => PrAction::UpdateExisting { number: open_prs[0].number },
        _ => PrAction::DuplicateOpen {
            numbers: open_prs.iter().map(|pr| pr.number).collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PullRequestRef;
    use crate::session::{PrMetadata, WorkflowType};

    fn open_pr(number: u64, branch: &str) -> PullRequest {
        PullRequest {
            number,
            html_url: format!("https://github.com/acme/widgets/pull/{number}"),
            state: "open".into(),
            title: "change".into(),
            body: None,
            draft: false,
            merged: false,
            merged_at: None,
            head: PullRequestRef { branch: branch.into(), sha: "a".repeat(40) },
            base: PullRequestRef { branch: "main".into(), sha: "b".repeat(40) },
        }
    }

    fn session() -> WorkflowSession {
        WorkflowSession::new("feature/x", WorkflowType::Launch)
    }

    #[test]
    fn test_create_new() {
        assert_eq!(classify_pr_action(&[], &session()), PrAction::CreateNew);
    }

    #[test]
    fn test_update_existing() {
        let prs = vec![open_pr(7, "feature/x")];
        assert_eq!(
            classify_pr_action(&prs, &session()),
            PrAction::UpdateExisting { number: 7 }
        );
    }

    #[test]
    fn test_duplicate_open_is_fatal() {
        let prs = vec![open_pr(7, "feature/x"), open_pr(9, "feature/x")];
        let action = classify_pr_action(&prs, &session());
        assert_eq!(action, PrAction::DuplicateOpen { numbers: vec![7, 9] });
        assert!(action.is_fatal());
    }

    #[test]
    fn test_resurrect_after_merge() {
        let mut s = session();
        s.metadata.pr = Some(PrMetadata {
            number: 12,
            url: String::new(),
            merged: true,
            merged_at: None,
        });
        assert_eq!(
            classify_pr_action(&[], &s),
            PrAction::ResurrectAfterMerge { previous: 12 }
        );
    }

    #[test]
    fn test_unmerged_prior_pr_means_create_new() {
        let mut s = session();
        s.metadata.pr = Some(PrMetadata {
            number: 12,
            url: String::new(),
            merged: false,
            merged_at: None,
        });
        // A recorded-but-unmerged PR that is no longer open was closed; a
        // fresh PR is the right move.
        assert_eq!(classify_pr_action(&[], &s), PrAction::CreateNew);
    }
}
