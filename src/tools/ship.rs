//! `workflow.ship` - push, open the PR, wait for CI, squash-merge, sync
//! trunk, and delete the feature branch.
//!
//! Every step is a checkpoint: progress is recorded in the session's state
//! history before an error propagates, so a retry resumes instead of
//! restarting. Every step is idempotent on retry: an already-pushed branch
//! is not re-pushed, "create PR" becomes "update PR", an already-merged PR
//! is detected, and branch deletion tolerates "already deleted".

use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

use crate::audit::{AuditEntry, AuditResult};
use crate::checks::PlatformReadiness;
use crate::git::{CommitOptions, PushOptions};
use crate::platform::{CreatePullRequest, GithubClient, MergeMethod};
use crate::session::{
    PrMetadata, TransitionFacts, WorkflowSession, WorkflowState, WorkflowType,
};
use crate::utils;
use crate::validation::branch::track_branch_deletion;
use crate::validation::{PrAction, classify_pr_action};

use super::{
    Collection, ErrorKind, Execution, MissingParameter, ToolContext, ToolError, ToolRuntime,
    WorkflowTool, advance_session_if_valid, parse_params,
};

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", default)]
struct ShipParams {
    /// Commit message for a dirty tree; also seeds the PR title.
    message: Option<String>,
    /// Body of the pull request.
    pr_description: Option<String>,
    /// Commit only the index instead of staging everything first.
    staged_only: bool,
    /// Proceed despite failed pre-flight checks.
    force: bool,
    /// Push the branch (default true).
    push: Option<bool>,
    /// Create or update the pull request (default true).
    #[serde(rename = "createPR")]
    create_pr: Option<bool>,
    /// Wait for CI and squash-merge (default true).
    merge: Option<bool>,
    /// Accept the recommended option of every prompt check.
    auto: bool,
    /// Chosen prompt options from a previous invocation, by check id.
    choices: BTreeMap<String, String>,
}

/// Per-workflow-kind state for each ship checkpoint. Kinds whose table
/// does not declare a checkpoint simply skip it.
fn checkpoint_state(kind: WorkflowType, stage: &str) -> WorkflowState {
    use WorkflowState::*;
    match (kind, stage) {
        (WorkflowType::Hotfix, "committed") => HotfixCommitted,
        (WorkflowType::Hotfix, "pushed") => HotfixPushed,
        (WorkflowType::Hotfix, "approved") => HotfixValidated,
        (WorkflowType::Hotfix, "merging") => HotfixDeployed,
        (WorkflowType::Hotfix, "cleanup") => HotfixCleanup,
        (WorkflowType::Hotfix, "complete") => HotfixComplete,
        (_, "committed") => ChangesCommitted,
        (_, "pushed") => Pushed,
        (_, "pr-created") => PrCreated,
        (_, "approved") => WaitingApproval,
        (_, "rebasing") => Rebasing,
        (_, "merging") => Merging,
        (_, "cleanup") => Cleanup,
        _ => Complete,
    }
}

pub struct ShipTool;

impl ShipTool {
    fn derive_title(
        rt: &ToolRuntime,
        params: &ShipParams,
        session: &WorkflowSession,
    ) -> Result<String> {
        if let Some(message) = &params.message {
            return Ok(message.lines().next().unwrap_or(message).to_string());
        }
        if let Some(subject) = rt.repo().last_commit_subject()? {
            return Ok(subject);
        }
        Ok(session
            .metadata
            .description
            .clone()
            .unwrap_or_else(|| session.branch_name.clone()))
    }

    /// Poll check runs until every run completes, a run fails, the budget
    /// is exhausted, or cancellation is requested.
    fn wait_for_ci(rt: &ToolRuntime, client: &GithubClient, sha: &str) -> Result<usize> {
        let prefs = &rt.config().preferences;
        let gap = Duration::from_secs(prefs.ci_poll_interval_secs.max(1));
        let deadline = Instant::now() + Duration::from_secs(prefs.ci_timeout_secs);

        loop {
            if rt.is_cancelled() {
                return Err(ToolError::new(
                    ErrorKind::Cancelled,
                    "CI wait interrupted; the session can be resumed with another ship",
                )
                .into());
            }

            let summary = client.check_runs(sha)?;
            if summary.total == 0 {
                log::info!("no check runs for {sha}; treating the CI gate as vacuously green");
                return Ok(0);
            }
            if summary.failed > 0 {
                let failing: Vec<Value> = summary
                    .failing_runs()
                    .iter()
                    .map(|run| {
                        json!({
                            "name": run.name,
                            "status": run.conclusion.as_deref().unwrap_or(&run.status),
                            "url": run.html_url,
                        })
                    })
                    .collect();
                let names: Vec<&str> = summary
                    .failing_runs()
                    .iter()
                    .map(|run| run.name.as_str())
                    .collect();
                return Err(ToolError::new(
                    ErrorKind::CiFailed,
                    format!("CI failed: {}", names.join(", ")),
                )
                .with_data(json!({ "failedRuns": failing }))
                .with_next_steps(vec![
                    "fix the failures, push again, and re-run workflow.ship".to_string(),
                ])
                .into());
            }
            if summary.all_completed() {
                log::debug!("all {} check runs green for {sha}", summary.total);
                return Ok(summary.total);
            }

            if Instant::now() + gap > deadline {
                return Err(ToolError::new(
                    ErrorKind::CiTimeout,
                    format!(
                        "CI did not finish within {}s ({} run(s) still pending)",
                        prefs.ci_timeout_secs, summary.pending
                    ),
                )
                .with_next_steps(vec![
                    "re-run workflow.ship once CI settles".to_string(),
                ])
                .into());
            }
            log::debug!(
                "CI pending ({}/{} complete); sleeping {gap:?}",
                summary.passed + summary.failed,
                summary.total
            );
            std::thread::sleep(gap);
        }
    }
}

impl WorkflowTool for ShipTool {
    fn name(&self) -> &'static str {
        "workflow.ship"
    }

    fn description(&self) -> &'static str {
        "Push the session branch, open the PR, wait for CI, squash-merge, and clean up"
    }

    fn input_schema(&self) -> schemars::Schema {
        schemars::schema_for!(ShipParams)
    }

    fn collect_parameters(&self, rt: &ToolRuntime, params: &Map<String, Value>) -> Result<Collection> {
        let params: ShipParams = parse_params(params)?;
        // A dirty tree will be committed in step 1, and there is no silent
        // default for the message.
        if params.message.is_none() && rt.repo().has_uncommitted_changes()? {
            return Ok(Collection::NeedsInput {
                missing: vec![MissingParameter::required(
                    "message",
                    "commit message for the uncommitted changes",
                )],
            });
        }
        Ok(Collection::Ready)
    }

    fn create_context(&self, rt: &ToolRuntime, params: &Map<String, Value>) -> Result<ToolContext> {
        let params: ShipParams = parse_params(params)?;
        let mut ctx = ToolContext::for_runtime(rt)?;

        if let Some(current) = &ctx.current_branch {
            ctx.session = rt.store().get_session_by_branch(current)?;
            ctx.branch = Some(current.clone());

            // A finished lifecycle cannot ship again; this is the
            // idempotent-ship guarantee, surfaced as the state machine
            // rejecting the move.
            if ctx.session.is_none() {
                if let Some(terminal) = rt
                    .store()
                    .sessions_for_branch(current)?
                    .into_iter()
                    .find(|s| s.is_terminal())
                {
                    return Err(ToolError::new(
                        ErrorKind::InvalidStateTransition,
                        format!(
                            "session for {current} is {}; launch a new session to ship again",
                            terminal.current_state
                        ),
                    )
                    .into());
                }
            }
        }
        if let Some(session) = &ctx.session {
            if session.is_terminal() {
                return Err(ToolError::new(
                    ErrorKind::InvalidStateTransition,
                    format!("session is {}; nothing left to ship", session.current_state),
                )
                .into());
            }
        }

        ctx.expected_states = match ctx.session.as_ref().map(|s| s.workflow_type) {
            Some(WorkflowType::Hotfix) => vec![
                WorkflowState::HotfixReady,
                WorkflowState::HotfixCommitted,
                WorkflowState::HotfixPushed,
            ],
            _ => vec![
                WorkflowState::BranchReady,
                WorkflowState::ChangesCommitted,
                WorkflowState::Pushed,
                WorkflowState::PrCreated,
            ],
        };
        ctx.staged_only = params.staged_only;
        ctx.auto = params.auto;
        ctx.force = params.force;
        ctx.choices = params.choices;
        ctx.advisory = vec!["githubConfigured", "ciConfigured"];

        let create_pr = params.create_pr.unwrap_or(true);
        let merge = params.merge.unwrap_or(true);
        ctx.extras.insert("createPr".into(), Value::Bool(create_pr));
        ctx.extras.insert("merge".into(), Value::Bool(merge));

        // Read-only platform probes; business logic re-creates the client.
        match rt.platform_client() {
            Ok(client) => {
                ctx.platform = PlatformReadiness::Ready;
                if let Some(branch) = &ctx.branch {
                    match client.open_pull_requests(branch) {
                        Ok(prs) => {
                            // Fatal before any side effect: a duplicate PR
                            // pair means no push, no merge, state unchanged.
                            if prs.len() > 1 {
                                let numbers: Vec<u64> = prs.iter().map(|p| p.number).collect();
                                return Err(ToolError::new(
                                    ErrorKind::DuplicateOpenPr,
                                    format!(
                                        "{} open PRs share head {branch}: {numbers:?}",
                                        prs.len()
                                    ),
                                )
                                .with_data(json!({ "openPrNumbers": numbers }))
                                .with_next_steps(vec![
                                    "close the duplicate PRs manually, then re-run workflow.ship"
                                        .to_string(),
                                ])
                                .into());
                            }
                            ctx.open_prs = Some(prs);
                        }
                        Err(e) => log::warn!("could not list open PRs: {e}"),
                    }
                }
                if let Ok(sha) = rt.repo().head_sha() {
                    ctx.ci_configured = client.has_check_history(&sha).ok();
                }
            }
            Err(e) => {
                ctx.platform = PlatformReadiness::Failed(e.to_string());
            }
        }
        Ok(ctx)
    }

    fn preflight_ids(&self, _ctx: &ToolContext) -> Vec<&'static str> {
        vec![
            "sessionExists",
            "notOnMainBranch",
            "sessionStateIs",
            "noBranchReuse",
            "noPrConflicts",
            "githubConfigured",
            "ciConfigured",
        ]
    }

    fn execute(
        &self,
        rt: &ToolRuntime,
        ctx: &mut ToolContext,
        params: &Map<String, Value>,
    ) -> Result<Execution> {
        let params: ShipParams = parse_params(params)?;
        let do_push = params.push.unwrap_or(true);
        let do_create_pr = params.create_pr.unwrap_or(true);
        let do_merge = params.merge.unwrap_or(true);

        let mut session = ctx.session.clone().expect("pre-flight guarantees a session");
        let branch = session.branch_name.clone();
        let trunk = ctx.trunk.clone();
        let kind = session.workflow_type;
        let _lock = rt.store().acquire_lock(session.id)?;

        let mut steps: Vec<&str> = Vec::new();

        // Step 1: commit a dirty tree.
        if rt.repo().has_uncommitted_changes()? {
            let message = params
                .message
                .clone()
                .expect("collector guarantees a message for a dirty tree");
            let sha = rt.repo().commit(
                &message,
                CommitOptions { staged_only: params.staged_only, no_verify: false },
            )?;
            rt.audit().append_best_effort(
                &AuditEntry::new(self.name(), rt.actor(), AuditResult::Success)
                    .with_session(session.id)
                    .with_git_operation(format!("commit {sha}")),
            );
            steps.push("commit");
        }
        let commits_ahead = rt.repo().commits_since_fork(&branch)?;
        advance_session_if_valid(
            rt,
            self.name(),
            &mut session,
            checkpoint_state(kind, "committed"),
            "commit",
            &TransitionFacts { commits_ahead: Some(commits_ahead), ..Default::default() },
        )?;

        // Step 2: push with upstream; skipped when the remote already has
        // this exact commit.
        let head = rt.repo().head_sha()?;
        if do_push {
            let remote_sha = rt.repo().ref_sha(&format!("origin/{branch}"))?;
            if remote_sha.as_deref() == Some(head.as_str()) {
                log::info!("origin/{branch} is already at {head}; skipping push");
            } else {
                rt.repo().push(
                    &branch,
                    PushOptions { set_upstream: true, force: false },
                )?;
                rt.audit().append_best_effort(
                    &AuditEntry::new(self.name(), rt.actor(), AuditResult::Success)
                        .with_session(session.id)
                        .with_git_operation(format!("push origin {branch}")),
                );
                steps.push("push");
            }
            advance_session_if_valid(
                rt,
                self.name(),
                &mut session,
                checkpoint_state(kind, "pushed"),
                "push",
                &TransitionFacts {
                    has_upstream: Some(rt.repo().has_upstream(&branch)?),
                    ..Default::default()
                },
            )?;
        }

        if !do_create_pr {
            let exec = Execution {
                session_id: Some(session.id),
                branch_name: Some(branch),
                state: Some(session.current_state),
                data: Some(json!({ "steps": steps })),
            };
            ctx.session = Some(session);
            return Ok(exec);
        }

        // Step 3: create-or-update the PR.
        let client = rt.platform_client().map_err(anyhow::Error::new)?;
        let open_prs = client.open_pull_requests(&branch)?;
        let pr = match classify_pr_action(&open_prs, &session) {
            PrAction::DuplicateOpen { numbers } => {
                return Err(ToolError::new(
                    ErrorKind::DuplicateOpenPr,
                    format!("multiple open PRs share head {branch}: {numbers:?}"),
                )
                .with_next_steps(vec!["close the duplicates and retry".to_string()])
                .into());
            }
            PrAction::UpdateExisting { number } => {
                log::info!("updating existing PR #{number} for {branch}");
                steps.push("update-pr");
                client.update_pull_request(
                    number,
                    params.message.as_deref().map(|m| m.lines().next().unwrap_or(m)),
                    params.pr_description.as_deref(),
                )?
            }
            action @ (PrAction::CreateNew | PrAction::ResurrectAfterMerge { .. }) => {
                if let PrAction::ResurrectAfterMerge { previous } = action {
                    log::info!("continuing work after merged PR #{previous}; creating a new PR");
                }
                let title = Self::derive_title(rt, &params, &session)?;
                let body = params
                    .pr_description
                    .clone()
                    .or_else(|| session.metadata.description.clone())
                    .unwrap_or_default();
                steps.push("create-pr");
                client.create_pull_request(&CreatePullRequest {
                    title,
                    body,
                    head: branch.clone(),
                    base: trunk.clone(),
                    draft: false,
                    maintainer_can_modify: true,
                })?
            }
        };

        session = rt.store().update_session(session.id, |s| {
            s.metadata.pr = Some(PrMetadata {
                number: pr.number,
                url: pr.html_url.clone(),
                merged: pr.merged,
                merged_at: pr.merged_at,
            });
        })?;
        advance_session_if_valid(
            rt,
            self.name(),
            &mut session,
            checkpoint_state(kind, "pr-created"),
            "pr-created",
            &TransitionFacts::default(),
        )?;

        if !do_merge {
            let exec = Execution {
                session_id: Some(session.id),
                branch_name: Some(branch),
                state: Some(session.current_state),
                data: Some(json!({ "steps": steps, "prNumber": pr.number, "prUrl": pr.html_url })),
            };
            ctx.session = Some(session);
            return Ok(exec);
        }

        // Step 4: the CI gate. On failure the session stays at the PR
        // checkpoint and the PR is left open.
        let green_runs = Self::wait_for_ci(rt, &client, &head)?;
        steps.push("ci");
        advance_session_if_valid(
            rt,
            self.name(),
            &mut session,
            checkpoint_state(kind, "approved"),
            "ci-passed",
            &TransitionFacts::default(),
        )?;

        // Step 5: squash-merge. Trunk is refreshed first so the local
        // fast-forward below cannot surprise us.
        advance_session_if_valid(
            rt,
            self.name(),
            &mut session,
            checkpoint_state(kind, "rebasing"),
            "sync-trunk",
            &TransitionFacts {
                rebase_in_progress: Some(rt.repo().is_rebase_in_progress()?),
                ..Default::default()
            },
        )?;
        rt.repo().fetch(None)?;
        advance_session_if_valid(
            rt,
            self.name(),
            &mut session,
            checkpoint_state(kind, "merging"),
            "merge",
            &TransitionFacts::default(),
        )?;

        let title = Self::derive_title(rt, &params, &session)?;
        let merge_result = client.merge_pull_request(pr.number, MergeMethod::Squash, Some(title.as_str()))?;
        session = rt.store().update_session(session.id, |s| {
            if let Some(meta) = s.metadata.pr.as_mut() {
                meta.merged = true;
                meta.merged_at = Some(utils::now());
            }
        })?;
        rt.audit().append_best_effort(
            &AuditEntry::new(self.name(), rt.actor(), AuditResult::Success)
                .with_session(session.id)
                .with_git_operation(format!("squash-merge PR #{}", pr.number)),
        );
        steps.push("merge");

        // Step 6: sync trunk and delete the branch on both sides.
        rt.repo().checkout(&trunk)?;
        rt.repo().pull_ff()?;
        if rt.repo().branch_exists(&branch)? {
            rt.repo().delete_local_branch(&branch, true)?;
        }
        rt.repo().delete_remote_branch(&branch)?;
        session = rt.store().update_session(session.id, |s| {
            track_branch_deletion(s, utils::now());
        })?;
        advance_session_if_valid(
            rt,
            self.name(),
            &mut session,
            checkpoint_state(kind, "cleanup"),
            "cleanup",
            &TransitionFacts::default(),
        )?;
        advance_session_if_valid(
            rt,
            self.name(),
            &mut session,
            checkpoint_state(kind, "complete"),
            "complete",
            &TransitionFacts::default(),
        )?;
        if rt.store().current_session_id()? == Some(session.id) {
            rt.store().set_current(None)?;
        }
        steps.push("cleanup");

        ctx.expected_states = vec![checkpoint_state(kind, "complete")];
        ctx.branch = Some(branch.clone());
        let exec = Execution {
            session_id: Some(session.id),
            branch_name: Some(branch),
            state: Some(session.current_state),
            data: Some(json!({
                "steps": steps,
                "prNumber": pr.number,
                "prUrl": pr.html_url,
                "mergeSha": merge_result.sha,
                "greenRuns": green_runs,
            })),
        };
        ctx.session = Some(session);
        Ok(exec)
    }

    fn postflight_ids(&self, ctx: &ToolContext) -> Vec<&'static str> {
        let merged = ctx.extras.get("merge").and_then(Value::as_bool).unwrap_or(true)
            && ctx.extras.get("createPr").and_then(Value::as_bool).unwrap_or(true);
        if merged {
            vec![
                "prMerged",
                "featureBranchesDeleted",
                "mainSyncedWithOrigin",
                "noUncommittedChanges",
            ]
        } else {
            vec!["noUncommittedChanges"]
        }
    }

    fn next_steps(&self, _ctx: &ToolContext, exec: &Execution) -> Vec<String> {
        let merged = exec
            .data
            .as_ref()
            .and_then(|d| d.get("steps"))
            .and_then(Value::as_array)
            .is_some_and(|steps| steps.iter().any(|s| s == "cleanup"));
        if merged {
            vec!["workflow.launch to start the next unit of work".to_string()]
        } else {
            vec!["workflow.ship again to continue from the recorded checkpoint".to_string()]
        }
    }
}
