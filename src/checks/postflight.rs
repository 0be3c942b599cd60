//! Post-flight verifications.
//!
//! Run after a tool's business logic; identical shape to pre-flight but
//! always advisory. Failures are reported and never unwind state.

use anyhow::Result;

use crate::validation::{BranchAvailability, BranchValidator};

use super::engine::CheckDef;
use super::{CheckContext, CheckResult};

/// The post-flight verification registry.
pub static POSTFLIGHT_CHECKS: &[CheckDef] = &[
    CheckDef { id: "sessionCreated", name: "Session created", category: "session", run: session_created },
    CheckDef { id: "branchCheckedOut", name: "Branch checked out", category: "branch", run: branch_checked_out },
    CheckDef { id: "sessionStateCorrect", name: "Session state correct", category: "session", run: session_state_correct },
    CheckDef { id: "branchAvailable", name: "Branch claimed", category: "branch", run: branch_claimed },
    CheckDef { id: "prMerged", name: "PR merged", category: "pr", run: pr_merged },
    CheckDef { id: "featureBranchesDeleted", name: "Feature branches deleted", category: "branch", run: feature_branches_deleted },
    CheckDef { id: "mainSyncedWithOrigin", name: "Trunk synced with origin", category: "branch", run: main_synced_with_origin },
    CheckDef { id: "noUncommittedChanges", name: "No uncommitted changes", category: "changes", run: no_uncommitted_changes },
    CheckDef { id: "onTargetBranch", name: "On target branch", category: "branch", run: on_target_branch },
    CheckDef { id: "targetSessionActive", name: "Target session active", category: "session", run: target_session_active },
];

fn session_created(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "sessionCreated";
    const NAME: &str = "Session created";
    match ctx.session {
        Some(session) => Ok(CheckResult::pass(ID, NAME, format!("session {}", session.id))),
        None => Ok(CheckResult::fail(ID, NAME, "no session was recorded")),
    }
}

fn branch_checked_out(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "branchCheckedOut";
    const NAME: &str = "Branch checked out";
    match (ctx.branch, ctx.current_branch) {
        (Some(expected), Some(actual)) if expected == actual => {
            Ok(CheckResult::pass(ID, NAME, format!("on {actual}")))
        }
        (Some(expected), actual) => Ok(CheckResult::fail(
            ID,
            NAME,
            format!("expected to be on {expected}, currently on {}", actual.unwrap_or("<detached>")),
        )),
        (None, _) => Ok(CheckResult::info(ID, NAME, "no branch expectation")),
    }
}

fn session_state_correct(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "sessionStateCorrect";
    const NAME: &str = "Session state correct";
    let Some(session) = ctx.session else {
        return Ok(CheckResult::fail(ID, NAME, "no session in scope"));
    };
    if ctx.expected_states.is_empty() || ctx.expected_states.contains(&session.current_state) {
        Ok(CheckResult::pass(ID, NAME, format!("session is in {}", session.current_state)))
    } else {
        let expected = ctx
            .expected_states
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" | ");
        Ok(CheckResult::fail(
            ID,
            NAME,
            format!("session is in {}, expected {expected}", session.current_state),
        ))
    }
}

/// After a launch, the branch name must no longer be claimable: it exists
/// and is owned by the new active session.
fn branch_claimed(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "branchAvailable";
    const NAME: &str = "Branch claimed";
    let Some(branch) = ctx.branch else {
        return Ok(CheckResult::info(ID, NAME, "no branch in scope"));
    };
    let validator = BranchValidator::new(ctx.repo, ctx.store);
    match validator.check_branch_name_availability(branch)? {
        BranchAvailability::ActiveSessionExists { .. } => {
            Ok(CheckResult::pass(ID, NAME, format!("{branch} is owned by its session")))
        }
        other => Ok(CheckResult::fail(
            ID,
            NAME,
            format!("{branch} is not held by an active session ({other:?})"),
        )),
    }
}

fn pr_merged(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "prMerged";
    const NAME: &str = "PR merged";
    let merged = ctx
        .session
        .and_then(|s| s.metadata.pr.as_ref())
        .is_some_and(|pr| pr.merged);
    if merged {
        Ok(CheckResult::pass(ID, NAME, "pull request recorded as merged"))
    } else {
        Ok(CheckResult::fail(ID, NAME, "pull request is not recorded as merged"))
    }
}

fn feature_branches_deleted(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "featureBranchesDeleted";
    const NAME: &str = "Feature branches deleted";
    let Some(branch) = ctx.branch else {
        return Ok(CheckResult::info(ID, NAME, "no branch in scope"));
    };
    let local = ctx.repo.branch_exists(branch)?;
    let remote = ctx.repo.remote_branch_exists(branch)?;
    match (local, remote) {
        (false, false) => Ok(CheckResult::pass(ID, NAME, format!("{branch} deleted locally and remotely"))),
        (true, _) => Ok(CheckResult::fail(ID, NAME, format!("local branch {branch} still exists"))),
        (false, true) => Ok(CheckResult::fail(
            ID,
            NAME,
            format!("remote branch origin/{branch} still exists"),
        )),
    }
}

fn main_synced_with_origin(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "mainSyncedWithOrigin";
    const NAME: &str = "Trunk synced with origin";
    let trunk = ctx.trunk;
    if !ctx.repo.remote_branch_exists(trunk)? {
        return Ok(CheckResult::info(ID, NAME, format!("no origin/{trunk} to compare against")));
    }
    let (ahead, behind) = ctx.repo.ahead_behind(trunk, &format!("origin/{trunk}"))?;
    if ahead == 0 && behind == 0 {
        Ok(CheckResult::pass(ID, NAME, format!("{trunk} matches origin/{trunk}")))
    } else {
        Ok(CheckResult::fail(
            ID,
            NAME,
            format!("{trunk} is {ahead} ahead / {behind} behind origin/{trunk}"),
        ))
    }
}

fn no_uncommitted_changes(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "noUncommittedChanges";
    const NAME: &str = "No uncommitted changes";
    if ctx.repo.status()?.is_clean() {
        Ok(CheckResult::pass(ID, NAME, "working tree clean"))
    } else {
        Ok(CheckResult::fail(ID, NAME, "working tree has uncommitted changes"))
    }
}

fn on_target_branch(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "onTargetBranch";
    const NAME: &str = "On target branch";
    match (ctx.branch, ctx.current_branch) {
        (Some(target), Some(actual)) if target == actual => {
            Ok(CheckResult::pass(ID, NAME, format!("on {target}")))
        }
        (Some(target), actual) => Ok(CheckResult::fail(
            ID,
            NAME,
            format!("expected {target}, on {}", actual.unwrap_or("<detached>")),
        )),
        (None, _) => Ok(CheckResult::info(ID, NAME, "no target branch")),
    }
}

fn target_session_active(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "targetSessionActive";
    const NAME: &str = "Target session active";
    match ctx.session {
        Some(session) if session.is_active() => Ok(CheckResult::pass(
            ID,
            NAME,
            format!("session {} active in {}", session.id, session.current_state),
        )),
        Some(_) => Ok(CheckResult::fail(ID, NAME, "target session is terminal")),
        None => Ok(CheckResult::fail(ID, NAME, "no target session")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::checks::PlatformReadiness;
    use crate::git::Repository;
    use crate::session::{PrMetadata, SessionStore, WorkflowSession, WorkflowType};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, Repository, SessionStore) {
        let dir = TempDir::new().unwrap();
        let run = |args: &[&str]| {
            let out = std::process::Command::new("git")
                .args(args)
                .current_dir(dir.path())
                .output()
                .unwrap();
            assert!(out.status.success(), "git {args:?}");
        };
        run(&["init", "-b", "main"]);
        run(&["config", "user.email", "dev@example.com"]);
        run(&["config", "user.name", "Dev"]);
        std::fs::write(dir.path().join("README.md"), "x\n").unwrap();
        run(&["add", "-A"]);
        run(&["commit", "-m", "init"]);
        let repo = Repository::discover(dir.path()).unwrap();
        let base = dir.path().join(".devsolo");
        let store = SessionStore::open(&base, AuditLog::new(base.join("audit"))).unwrap();
        (dir, repo, store)
    }

    #[test]
    fn test_pr_merged_and_session_created() {
        let (_dir, repo, store) = fixture();
        let choices = BTreeMap::new();
        let mut session = WorkflowSession::new("feature/x", WorkflowType::Launch);

        let mut ctx = CheckContext {
            repo: &repo,
            store: &store,
            trunk: "main",
            current_branch: Some("main"),
            branch: Some("feature/x"),
            session: None,
            expected_states: &[],
            staged_only: false,
            auto: false,
            choices: &choices,
            advisory: &[],
            open_prs: None,
            platform: PlatformReadiness::Untested,
            ci_configured: None,
        };
        assert!(!session_created(&ctx).unwrap().passed());
        assert!(!pr_merged(&ctx).unwrap().passed());

        session.metadata.pr = Some(PrMetadata {
            number: 3,
            url: String::new(),
            merged: true,
            merged_at: None,
        });
        ctx.session = Some(&session);
        assert!(session_created(&ctx).unwrap().passed());
        assert!(pr_merged(&ctx).unwrap().passed());
    }

    #[test]
    fn test_branch_verifications() {
        let (_dir, repo, store) = fixture();
        let choices = BTreeMap::new();
        let ctx = CheckContext {
            repo: &repo,
            store: &store,
            trunk: "main",
            current_branch: Some("main"),
            branch: Some("feature/x"),
            session: None,
            expected_states: &[],
            staged_only: false,
            auto: false,
            choices: &choices,
            advisory: &[],
            open_prs: None,
            platform: PlatformReadiness::Untested,
            ci_configured: None,
        };
        // feature/x never existed: deleted-check passes, checked-out fails
        assert!(feature_branches_deleted(&ctx).unwrap().passed());
        assert!(!branch_checked_out(&ctx).unwrap().passed());
        assert!(!on_target_branch(&ctx).unwrap().passed());
        assert!(no_uncommitted_changes(&ctx).unwrap().passed());
    }
}
