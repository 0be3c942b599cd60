//! Catalogued pre-flight checks.
//!
//! Pre-flight checks gate every mutating operation. They are pure reads:
//! nothing here mutates session, repository, or platform state.

use anyhow::Result;

use crate::validation::{BranchAvailability, BranchReuse, BranchValidator, classify_pr_action};

use super::engine::CheckDef;
use super::{CheckContext, CheckOption, CheckResult, PlatformReadiness, RiskLevel};

/// Option id: stash the dirty working tree and continue.
pub const OPT_STASH_CHANGES: &str = "stash-changes";
/// Option id: proceed with the dirty working tree.
pub const OPT_PROCEED_DIRTY: &str = "proceed-dirty";

/// The pre-flight check registry. Tools declare subsets of these by id.
pub static PREFLIGHT_CHECKS: &[CheckDef] = &[
    CheckDef { id: "onMainBranch", name: "On trunk branch", category: "branch", run: on_main_branch },
    CheckDef { id: "notOnMainBranch", name: "Not on trunk branch", category: "branch", run: not_on_main_branch },
    CheckDef { id: "branchNameAvailable", name: "Branch name available", category: "branch", run: branch_name_available },
    CheckDef { id: "workingDirectoryClean", name: "Working directory clean", category: "branch", run: working_directory_clean },
    CheckDef { id: "mainUpToDate", name: "Trunk up to date", category: "branch", run: main_up_to_date },
    CheckDef { id: "noExistingSession", name: "No existing session", category: "session", run: no_existing_session },
    CheckDef { id: "sessionExists", name: "Session exists", category: "session", run: session_exists },
    CheckDef { id: "sessionIsActive", name: "Session is active", category: "session", run: session_is_active },
    CheckDef { id: "sessionStateIs", name: "Session state", category: "session", run: session_state_is },
    CheckDef { id: "hasChangesToCommit", name: "Changes to commit", category: "changes", run: has_changes_to_commit },
    CheckDef { id: "hasStagedFiles", name: "Staged files present", category: "changes", run: has_staged_files },
    CheckDef { id: "githubConfigured", name: "Platform configured", category: "pr", run: github_configured },
    CheckDef { id: "noPrConflicts", name: "No PR conflicts", category: "pr", run: no_pr_conflicts },
    CheckDef { id: "noBranchReuse", name: "No branch reuse", category: "pr", run: no_branch_reuse },
    CheckDef { id: "ciConfigured", name: "CI configured", category: "ci", run: ci_configured },
    CheckDef { id: "targetBranchExists", name: "Target branch exists", category: "branch", run: target_branch_exists },
];

fn on_main_branch(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "onMainBranch";
    const NAME: &str = "On trunk branch";
    match ctx.current_branch {
        Some(branch) if branch == ctx.trunk => {
            Ok(CheckResult::pass(ID, NAME, format!("on {branch}")))
        }
        Some(branch) => Ok(CheckResult::fail(
            ID,
            NAME,
            format!("current branch is {branch}, not {}", ctx.trunk),
        )
        .with_suggestions(vec![format!("git checkout {}", ctx.trunk)])),
        None => Ok(CheckResult::fail(ID, NAME, "detached HEAD")
            .with_suggestions(vec![format!("git checkout {}", ctx.trunk)])),
    }
}

fn not_on_main_branch(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "notOnMainBranch";
    const NAME: &str = "Not on trunk branch";
    match ctx.current_branch {
        Some(branch) if branch == ctx.trunk => Ok(CheckResult::fail(
            ID,
            NAME,
            format!("direct work on {branch} is not allowed"),
        )
        .with_suggestions(vec!["run workflow.launch to start a feature branch".into()])),
        Some(branch) => Ok(CheckResult::pass(ID, NAME, format!("on {branch}"))),
        None => Ok(CheckResult::fail(ID, NAME, "detached HEAD")),
    }
}

fn branch_name_available(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "branchNameAvailable";
    const NAME: &str = "Branch name available";
    let Some(branch) = ctx.branch else {
        return Ok(CheckResult::fail(ID, NAME, "no branch name derived"));
    };
    let validator = BranchValidator::new(ctx.repo, ctx.store);
    let result = match validator.check_branch_name_availability(branch)? {
        BranchAvailability::Available => {
            CheckResult::pass(ID, NAME, format!("{branch} is available"))
        }
        BranchAvailability::TakenLocal => {
            CheckResult::fail(ID, NAME, format!("local branch {branch} already exists"))
                .with_suggestions(vec![format!("git branch -D {branch}"), "choose another name".into()])
        }
        BranchAvailability::TakenRemote => {
            CheckResult::fail(ID, NAME, format!("remote branch origin/{branch} already exists"))
                .with_suggestions(vec!["choose another name".into()])
        }
        BranchAvailability::ActiveSessionExists { session_id } => CheckResult::fail(
            ID,
            NAME,
            format!("an active session ({session_id}) already owns {branch}"),
        )
        .with_suggestions(vec![format!("workflow.swap {{\"branchName\": \"{branch}\"}}")]),
        BranchAvailability::Burned { suggestions } => CheckResult::fail(
            ID,
            NAME,
            format!("{branch} was merged and deleted; the name is permanently retired"),
        )
        .with_suggestions(suggestions.to_vec()),
    };
    Ok(result)
}

fn working_directory_clean(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "workingDirectoryClean";
    const NAME: &str = "Working directory clean";
    let status = ctx.repo.status()?;
    if status.is_clean() {
        return Ok(CheckResult::pass(ID, NAME, "working tree clean"));
    }
    let dirty = status.all_paths();
    let summary = format!("{} file(s) with uncommitted changes", dirty.len());

    let options = vec![
        CheckOption {
            id: OPT_STASH_CHANGES.into(),
            label: "Stash changes".into(),
            description: "Stash the dirty files and restore them afterwards".into(),
            action: "stash".into(),
            risk: RiskLevel::Low,
            auto_recommended: true,
        },
        CheckOption {
            id: OPT_PROCEED_DIRTY.into(),
            label: "Proceed anyway".into(),
            description: "Carry the dirty files onto the new branch".into(),
            action: "proceed".into(),
            risk: RiskLevel::Medium,
            auto_recommended: false,
        },
    ];

    match ctx.effective_choice(ID, &options).as_deref() {
        Some(OPT_STASH_CHANGES) => Ok(CheckResult::warn(
            ID,
            NAME,
            format!("{summary}; they will be stashed"),
        )),
        Some(OPT_PROCEED_DIRTY) => Ok(CheckResult::warn(
            ID,
            NAME,
            format!("{summary}; proceeding with a dirty tree"),
        )),
        Some(other) => Ok(CheckResult::fail(
            ID,
            NAME,
            format!("unknown option {other:?} for {ID}"),
        )),
        None => Ok(CheckResult::prompt(ID, NAME, summary, options)
            .with_suggestions(dirty.into_iter().take(10).collect())),
    }
}

fn main_up_to_date(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "mainUpToDate";
    const NAME: &str = "Trunk up to date";
    let trunk = ctx.trunk;
    if !ctx.repo.remote_branch_exists(trunk)? {
        return Ok(CheckResult::info(ID, NAME, format!("no origin/{trunk} to compare against")));
    }
    let (_, behind) = ctx.repo.ahead_behind(trunk, &format!("origin/{trunk}"))?;
    if behind > 0 {
        Ok(CheckResult::fail(
            ID,
            NAME,
            format!("{trunk} is {behind} commit(s) behind origin/{trunk}"),
        )
        .with_suggestions(vec![format!("git checkout {trunk} && git pull --ff-only")]))
    } else {
        Ok(CheckResult::pass(ID, NAME, format!("{trunk} is up to date")))
    }
}

fn no_existing_session(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "noExistingSession";
    const NAME: &str = "No existing session";
    let Some(current) = ctx.current_branch else {
        return Ok(CheckResult::pass(ID, NAME, "detached HEAD has no session"));
    };
    match ctx.store.get_session_by_branch(current)? {
        Some(session) if session.is_active() => Ok(CheckResult::fail(
            ID,
            NAME,
            format!("an active session ({}) exists on {current}", session.id),
        )
        .with_suggestions(vec![
            "workflow.abort to end it".into(),
            "workflow.swap to another branch".into(),
        ])),
        _ => Ok(CheckResult::pass(ID, NAME, format!("no active session on {current}"))),
    }
}

fn session_exists(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "sessionExists";
    const NAME: &str = "Session exists";
    match (ctx.session, ctx.branch.or(ctx.current_branch)) {
        (Some(session), _) => Ok(CheckResult::pass(
            ID,
            NAME,
            format!("session {} on {}", session.id, session.branch_name),
        )),
        (None, Some(branch)) => Ok(CheckResult::fail(
            ID,
            NAME,
            format!("no workflow session for {branch}"),
        )
        .with_suggestions(vec!["workflow.launch to start one".into()])),
        (None, None) => Ok(CheckResult::fail(ID, NAME, "no workflow session")),
    }
}

fn session_is_active(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "sessionIsActive";
    const NAME: &str = "Session is active";
    match ctx.session {
        Some(session) if session.is_active() => Ok(CheckResult::pass(
            ID,
            NAME,
            format!("session is in {}", session.current_state),
        )),
        Some(session) => Ok(CheckResult::fail(
            ID,
            NAME,
            format!("session is terminal ({})", session.current_state),
        )
        .with_suggestions(vec!["workflow.launch to start a new session".into()])),
        None => Ok(CheckResult::fail(ID, NAME, "no session in scope")),
    }
}

fn session_state_is(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "sessionStateIs";
    const NAME: &str = "Session state";
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

fn has_changes_to_commit(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "hasChangesToCommit";
    const NAME: &str = "Changes to commit";
    if ctx.repo.status()?.has_changes() {
        Ok(CheckResult::pass(ID, NAME, "working tree has changes"))
    } else {
        Ok(CheckResult::fail(ID, NAME, "nothing to commit"))
    }
}

fn has_staged_files(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "hasStagedFiles";
    const NAME: &str = "Staged files present";
    if !ctx.staged_only {
        return Ok(CheckResult::info(ID, NAME, "stagedOnly not requested"));
    }
    let staged = ctx.repo.staged_files()?;
    if staged.is_empty() {
        Ok(CheckResult::fail(ID, NAME, "stagedOnly is set but the index is empty")
            .with_suggestions(vec!["git add <files>".into()]))
    } else {
        Ok(CheckResult::pass(ID, NAME, format!("{} file(s) staged", staged.len())))
    }
}

fn github_configured(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "githubConfigured";
    const NAME: &str = "Platform configured";
    match &ctx.platform {
        PlatformReadiness::Ready => Ok(CheckResult::pass(ID, NAME, "platform client ready")),
        PlatformReadiness::Failed(reason) => Ok(CheckResult::fail(ID, NAME, reason.clone())
            .with_suggestions(vec![
                "set GITHUB_TOKEN or GH_TOKEN".into(),
                "set git-platform.token in the devsolo config".into(),
            ])),
        PlatformReadiness::Untested => {
            Ok(CheckResult::fail(ID, NAME, "platform client was not initialized"))
        }
    }
}

fn no_pr_conflicts(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "noPrConflicts";
    const NAME: &str = "No PR conflicts";
    let Some(open_prs) = ctx.open_prs else {
        return Ok(CheckResult::info(ID, NAME, "open PRs not checked (platform unavailable)"));
    };
    let Some(session) = ctx.session else {
        return Ok(CheckResult::info(ID, NAME, "no session in scope"));
    };
    let action = classify_pr_action(open_prs, session);
    if action.is_fatal() {
        let numbers: Vec<String> = open_prs.iter().map(|pr| format!("#{}", pr.number)).collect();
        Ok(CheckResult::fail(
            ID,
            NAME,
            format!("multiple open PRs share this head: {}", numbers.join(", ")),
        )
        .with_suggestions(vec!["close the duplicates and retry".into()]))
    } else {
        Ok(CheckResult::pass(ID, NAME, "at most one open PR for this branch"))
    }
}

fn no_branch_reuse(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "noBranchReuse";
    const NAME: &str = "No branch reuse";
    let Some(branch) = ctx.branch.or(ctx.current_branch) else {
        return Ok(CheckResult::info(ID, NAME, "no branch in scope"));
    };
    if !ctx.repo.remote_branch_exists(branch)? {
        return Ok(CheckResult::pass(ID, NAME, "remote branch does not exist yet"));
    }
    let validator = BranchValidator::new(ctx.repo, ctx.store);
    match validator.detect_branch_reuse(ctx.session, branch)? {
        BranchReuse::MergedAndRecreated => Ok(CheckResult::fail(
            ID,
            NAME,
            format!("{branch} was merged and its remote deleted; pushing it again is forbidden"),
        )
        .with_suggestions(vec!["rename the branch and relaunch".into()])),
        BranchReuse::ContinuedWork => Ok(CheckResult::info(
            ID,
            NAME,
            format!("{branch} continues work after a merge; a new PR will be created"),
        )),
        BranchReuse::Clean => Ok(CheckResult::pass(ID, NAME, "no prior merge for this name")),
    }
}

fn ci_configured(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "ciConfigured";
    const NAME: &str = "CI configured";
    match ctx.ci_configured {
        Some(true) => Ok(CheckResult::pass(ID, NAME, "check-suite history found")),
        Some(false) => Ok(CheckResult::warn(
            ID,
            NAME,
            "repository has no check-suite history; the CI gate will pass vacuously",
        )),
        None => Ok(CheckResult::info(ID, NAME, "CI history unknown")),
    }
}

fn target_branch_exists(ctx: &CheckContext) -> Result<CheckResult> {
    const ID: &str = "targetBranchExists";
    const NAME: &str = "Target branch exists";
    let Some(branch) = ctx.branch else {
        return Ok(CheckResult::fail(ID, NAME, "no target branch named"));
    };
    if ctx.repo.branch_exists(branch)? {
        Ok(CheckResult::pass(ID, NAME, format!("{branch} exists locally")))
    } else {
        Ok(CheckResult::fail(ID, NAME, format!("no local branch {branch}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::git::Repository;
    use crate::session::{SessionStore, TransitionFacts, WorkflowSession, WorkflowState, WorkflowType};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        repo: Repository,
        store: SessionStore,
    }

    impl Fixture {
        fn new() -> Self {
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
            Self { _dir: dir, repo, store }
        }

        fn dirty(&self) {
            std::fs::write(self.repo.root().join("dirty.txt"), "wip\n").unwrap();
        }
    }

    fn ctx_on<'a>(
        fx: &'a Fixture,
        current: &'a str,
        choices: &'a BTreeMap<String, String>,
        auto: bool,
    ) -> CheckContext<'a> {
        CheckContext {
            repo: &fx.repo,
            store: &fx.store,
            trunk: "main",
            current_branch: Some(current),
            branch: None,
            session: None,
            expected_states: &[],
            staged_only: false,
            auto,
            choices,
            advisory: &[],
            open_prs: None,
            platform: PlatformReadiness::Untested,
            ci_configured: None,
        }
    }

    #[test]
    fn test_on_main_branch() {
        let fx = Fixture::new();
        let choices = BTreeMap::new();
        let ctx = ctx_on(&fx, "main", &choices, false);
        assert!(on_main_branch(&ctx).unwrap().passed());
        assert!(!not_on_main_branch(&ctx).unwrap().passed());

        let ctx = ctx_on(&fx, "feature/x", &choices, false);
        assert!(!on_main_branch(&ctx).unwrap().passed());
        assert!(not_on_main_branch(&ctx).unwrap().passed());
    }

    #[test]
    fn test_working_directory_clean_prompts_when_dirty() {
        let fx = Fixture::new();
        let choices = BTreeMap::new();
        let ctx = ctx_on(&fx, "main", &choices, false);
        assert!(working_directory_clean(&ctx).unwrap().passed());

        fx.dirty();
        let result = working_directory_clean(&ctx).unwrap();
        assert_eq!(result.level, super::super::CheckLevel::Prompt);
        assert_eq!(result.options.len(), 2);
        assert_eq!(
            result.options.iter().filter(|o| o.auto_recommended).count(),
            1
        );
    }

    #[test]
    fn test_working_directory_clean_auto_resolves() {
        let fx = Fixture::new();
        fx.dirty();
        let choices = BTreeMap::new();
        let ctx = ctx_on(&fx, "main", &choices, true);
        let result = working_directory_clean(&ctx).unwrap();
        assert_eq!(result.level, super::super::CheckLevel::Warn);
        assert!(result.message.contains("stashed"));
    }

    #[test]
    fn test_working_directory_clean_honors_choice() {
        let fx = Fixture::new();
        fx.dirty();
        let mut choices = BTreeMap::new();
        choices.insert("workingDirectoryClean".to_string(), OPT_PROCEED_DIRTY.to_string());
        let ctx = ctx_on(&fx, "main", &choices, false);
        let result = working_directory_clean(&ctx).unwrap();
        assert_eq!(result.level, super::super::CheckLevel::Warn);
        assert!(result.message.contains("dirty tree"));
    }

    #[test]
    fn test_session_checks() {
        let fx = Fixture::new();
        let choices = BTreeMap::new();

        let mut session = WorkflowSession::new("feature/x", WorkflowType::Launch);
        session
            .transition_to(WorkflowState::BranchReady, "launch", &TransitionFacts::default())
            .unwrap();

        let mut ctx = ctx_on(&fx, "feature/x", &choices, false);
        assert!(!session_exists(&ctx).unwrap().passed());

        ctx.session = Some(&session);
        assert!(session_exists(&ctx).unwrap().passed());
        assert!(session_is_active(&ctx).unwrap().passed());

        let expected = [WorkflowState::BranchReady];
        ctx.expected_states = &expected;
        assert!(session_state_is(&ctx).unwrap().passed());

        let expected = [WorkflowState::ChangesCommitted, WorkflowState::Pushed];
        ctx.expected_states = &expected;
        let result = session_state_is(&ctx).unwrap();
        assert!(!result.passed());
        assert!(result.message.contains("CHANGES_COMMITTED | PUSHED"));
    }

    #[test]
    fn test_no_existing_session() {
        let fx = Fixture::new();
        let choices = BTreeMap::new();
        let session = WorkflowSession::new("main", WorkflowType::Launch);
        fx.store.save_session(&session).unwrap();

        let ctx = ctx_on(&fx, "main", &choices, false);
        assert!(!no_existing_session(&ctx).unwrap().passed());

        let ctx = ctx_on(&fx, "feature/other", &choices, false);
        assert!(no_existing_session(&ctx).unwrap().passed());
    }

    #[test]
    fn test_has_changes_and_staged() {
        let fx = Fixture::new();
        let choices = BTreeMap::new();
        let mut ctx = ctx_on(&fx, "main", &choices, false);
        assert!(!has_changes_to_commit(&ctx).unwrap().passed());

        fx.dirty();
        assert!(has_changes_to_commit(&ctx).unwrap().passed());

        ctx.staged_only = true;
        assert!(!has_staged_files(&ctx).unwrap().passed());
        fx.repo.add(&["dirty.txt"]).unwrap();
        assert!(has_staged_files(&ctx).unwrap().passed());
    }

    #[test]
    fn test_branch_name_available_check() {
        let fx = Fixture::new();
        let choices = BTreeMap::new();
        let mut ctx = ctx_on(&fx, "main", &choices, false);
        ctx.branch = Some("feature/new");
        assert!(branch_name_available(&ctx).unwrap().passed());

        ctx.branch = Some("main");
        let result = branch_name_available(&ctx).unwrap();
        assert!(!result.passed());
    }

    #[test]
    fn test_github_configured_levels() {
        let fx = Fixture::new();
        let choices = BTreeMap::new();
        let mut ctx = ctx_on(&fx, "main", &choices, false);

        ctx.platform = PlatformReadiness::Ready;
        assert!(github_configured(&ctx).unwrap().passed());

        ctx.platform = PlatformReadiness::Failed("no token".into());
        let result = github_configured(&ctx).unwrap();
        assert!(!result.passed());
        assert!(!result.suggestions.is_empty());
    }

    #[test]
    fn test_ci_configured_is_advisory_shaped() {
        let fx = Fixture::new();
        let choices = BTreeMap::new();
        let mut ctx = ctx_on(&fx, "main", &choices, false);
        assert!(ci_configured(&ctx).unwrap().passed());
        ctx.ci_configured = Some(false);
        // Warn, not fail
        assert!(ci_configured(&ctx).unwrap().passed());
    }
}
