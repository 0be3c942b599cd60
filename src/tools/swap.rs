//! `workflow.swap` - switch to another session's branch.

use anyhow::Result;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::audit::{AuditEntry, AuditResult};
use crate::git::GitError;
use crate::session::{StashMetadata, StashReason};
use crate::stash::StashManager;
use crate::utils;

use super::{
    Collection, Execution, MissingParameter, ToolContext, ToolRuntime, WorkflowTool, parse_params,
};

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", default)]
struct SwapParams {
    /// Branch of the session to activate. Required.
    branch_name: Option<String>,
    /// Stash a dirty working tree on the way out.
    stash: bool,
    /// Accept the recommended option of every prompt check.
    auto: bool,
    /// Proceed despite failed pre-flight checks.
    force: bool,
}

pub struct SwapTool;

impl WorkflowTool for SwapTool {
    fn name(&self) -> &'static str {
        "workflow.swap"
    }

    fn description(&self) -> &'static str {
        "Switch to another session's branch, stashing and restoring work in progress"
    }

    fn input_schema(&self) -> schemars::Schema {
        schemars::schema_for!(SwapParams)
    }

    fn collect_parameters(&self, _rt: &ToolRuntime, params: &Map<String, Value>) -> Result<Collection> {
        let params: SwapParams = parse_params(params)?;
        match params.branch_name.as_deref().map(str::trim) {
            Some(branch) if !branch.is_empty() => Ok(Collection::Ready),
            _ => Ok(Collection::NeedsInput {
                missing: vec![MissingParameter::required(
                    "branchName",
                    "branch of the session to swap to",
                )],
            }),
        }
    }

    fn create_context(&self, rt: &ToolRuntime, params: &Map<String, Value>) -> Result<ToolContext> {
        let params: SwapParams = parse_params(params)?;
        let target = params.branch_name.expect("collector guarantees a branch");
        let mut ctx = ToolContext::for_runtime(rt)?;
        ctx.session = rt.store().get_session_by_branch(&target)?;
        ctx.branch = Some(target);
        ctx.auto = params.auto;
        ctx.force = params.force;
        Ok(ctx)
    }

    fn preflight_ids(&self, _ctx: &ToolContext) -> Vec<&'static str> {
        vec!["sessionExists", "targetBranchExists"]
    }

    fn execute(
        &self,
        rt: &ToolRuntime,
        ctx: &mut ToolContext,
        params: &Map<String, Value>,
    ) -> Result<Execution> {
        let params: SwapParams = parse_params(params)?;
        let target_branch = ctx.branch.clone().expect("collector guarantees a branch");
        let target = ctx.session.clone().expect("pre-flight guarantees a session");
        let stasher = StashManager::new(rt.repo());

        if ctx.current_branch.as_deref() == Some(target_branch.as_str()) {
            log::info!("already on {target_branch}");
        }

        // Park work in progress on the session we are leaving.
        let mut stashed_out = None;
        if params.stash && stasher.has_uncommitted_changes()? {
            let current_branch = ctx.current_branch.clone();
            let handle = stasher.stash_changes(StashReason::Swap, current_branch.as_deref())?;
            if let Some(current) = &current_branch {
                if let Some(leaving) = rt.store().get_session_by_branch(current)? {
                    rt.store().update_session(leaving.id, |s| {
                        s.metadata.stash = Some(StashMetadata {
                            stash_ref: handle.stash_ref.clone(),
                            reason: StashReason::Swap,
                            created_at: utils::now(),
                        });
                    })?;
                }
            }
            stashed_out = Some(handle.stash_ref);
        } else if stasher.has_uncommitted_changes()? {
            return Err(GitError::CommandFailed {
                command: "checkout".into(),
                output: "working tree is dirty; pass stash: true or commit first".into(),
            }
            .into());
        }

        rt.repo().checkout(&target_branch)?;
        rt.store().set_current(Some(target.id))?;

        // Restore the target session's parked swap stash, if any.
        let mut restored = None;
        if let Some(stash) = &target.metadata.stash {
            if stash.reason == StashReason::Swap {
                match stasher.pop_stash(&stash.stash_ref) {
                    Ok(()) => {
                        restored = Some(stash.stash_ref.clone());
                        rt.store().update_session(target.id, |s| {
                            s.metadata.stash = None;
                        })?;
                    }
                    Err(GitError::StashNotFound { stash_ref }) => {
                        // Weak handle: the stash evaporated; clear it.
                        log::warn!("swap stash {stash_ref} is gone; clearing the reference");
                        rt.store().update_session(target.id, |s| {
                            s.metadata.stash = None;
                        })?;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        rt.audit().append_best_effort(
            &AuditEntry::new(self.name(), rt.actor(), AuditResult::Success)
                .with_session(target.id)
                .with_git_operation(format!("checkout {target_branch}")),
        );

        let session = rt.store().get_session(target.id)?.unwrap_or(target);
        let exec = Execution {
            session_id: Some(session.id),
            branch_name: Some(target_branch),
            state: Some(session.current_state),
            data: Some(json!({
                "stashedOutgoing": stashed_out,
                "restoredStash": restored,
            })),
        };
        ctx.session = Some(session);
        Ok(exec)
    }

    fn postflight_ids(&self, _ctx: &ToolContext) -> Vec<&'static str> {
        vec!["onTargetBranch", "targetSessionActive"]
    }

    fn next_steps(&self, ctx: &ToolContext, _exec: &Execution) -> Vec<String> {
        vec![format!(
            "continue working on {}; workflow.commit when ready",
            ctx.branch.as_deref().unwrap_or("the branch")
        )]
    }
}
