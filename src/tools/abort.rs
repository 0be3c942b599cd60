//! `workflow.abort` - end a session without merging.

use anyhow::Result;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::audit::{AuditEntry, AuditResult};
use crate::session::{StashMetadata, StashReason, TransitionFacts, WorkflowState};
use crate::stash::StashManager;
use crate::utils;
use crate::validation::branch::track_branch_deletion;

use super::{Execution, ToolContext, ToolRuntime, WorkflowTool, parse_params};

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", default)]
struct AbortParams {
    /// Branch whose session to abort; defaults to the current branch.
    branch_name: Option<String>,
    /// Also delete the feature branch (force local, best-effort remote).
    delete_branch: bool,
    /// Accept the recommended option of every prompt check.
    auto: bool,
    /// Proceed despite failed pre-flight checks.
    force: bool,
}

pub struct AbortTool;

impl WorkflowTool for AbortTool {
    fn name(&self) -> &'static str {
        "workflow.abort"
    }

    fn description(&self) -> &'static str {
        "Abort a workflow session, optionally deleting its branch; trunk is never touched"
    }

    fn input_schema(&self) -> schemars::Schema {
        schemars::schema_for!(AbortParams)
    }

    fn create_context(&self, rt: &ToolRuntime, params: &Map<String, Value>) -> Result<ToolContext> {
        let params: AbortParams = parse_params(params)?;
        let mut ctx = ToolContext::for_runtime(rt)?;
        let branch = params
            .branch_name
            .or_else(|| ctx.current_branch.clone());
        if let Some(branch) = &branch {
            ctx.session = rt.store().get_session_by_branch(branch)?;
        }
        ctx.branch = branch;
        ctx.auto = params.auto;
        ctx.force = params.force;
        Ok(ctx)
    }

    fn preflight_ids(&self, _ctx: &ToolContext) -> Vec<&'static str> {
        vec!["sessionExists", "sessionIsActive"]
    }

    fn execute(
        &self,
        rt: &ToolRuntime,
        ctx: &mut ToolContext,
        params: &Map<String, Value>,
    ) -> Result<Execution> {
        let params: AbortParams = parse_params(params)?;
        let mut session = ctx.session.clone().expect("pre-flight guarantees a session");
        let branch = session.branch_name.clone();
        let stasher = StashManager::new(rt.repo());

        let _lock = rt.store().acquire_lock(session.id)?;

        // Park uncommitted work before leaving the branch; the stash ref
        // stays on the aborted session for manual recovery.
        let mut stashed = None;
        let on_session_branch = ctx.current_branch.as_deref() == Some(branch.as_str());
        if on_session_branch && stasher.has_uncommitted_changes()? {
            let handle = stasher.stash_changes(StashReason::Abort, Some(branch.as_str()))?;
            session.metadata.stash = Some(StashMetadata {
                stash_ref: handle.stash_ref.clone(),
                reason: StashReason::Abort,
                created_at: utils::now(),
            });
            stashed = Some(handle.stash_ref);
        }

        let transition =
            session.transition_to(WorkflowState::Aborted, "abort", &TransitionFacts::default())?;
        let (from, to) = (transition.from, transition.to);
        rt.store().save_session(&session)?;
        rt.audit().append_best_effort(
            &AuditEntry::new(self.name(), rt.actor(), AuditResult::Aborted)
                .with_session(session.id)
                .with_transition(from, to),
        );

        if rt.store().current_session_id()? == Some(session.id) {
            rt.store().set_current(None)?;
        }

        // Branch deletion never touches trunk's commit graph.
        let mut deleted_local = false;
        let mut deleted_remote = false;
        if params.delete_branch {
            if on_session_branch {
                rt.repo().checkout(&ctx.trunk)?;
            }
            if rt.repo().branch_exists(&branch)? {
                rt.repo().delete_local_branch(&branch, true)?;
                deleted_local = true;
            }
            if rt.repo().remote_branch_exists(&branch)? {
                match rt.repo().delete_remote_branch(&branch) {
                    Ok(()) => {
                        deleted_remote = true;
                        let updated = rt.store().update_session(session.id, |s| {
                            track_branch_deletion(s, utils::now());
                        })?;
                        session = updated;
                    }
                    Err(e) => log::warn!("remote deletion of {branch} failed: {e}"),
                }
            }
        }

        let exec = Execution {
            session_id: Some(session.id),
            branch_name: Some(branch),
            state: Some(session.current_state),
            data: Some(json!({
                "stashRef": stashed,
                "deletedLocalBranch": deleted_local,
                "deletedRemoteBranch": deleted_remote,
            })),
        };
        ctx.session = Some(session);
        ctx.expected_states = vec![WorkflowState::Aborted];
        Ok(exec)
    }

    fn postflight_ids(&self, _ctx: &ToolContext) -> Vec<&'static str> {
        vec!["sessionStateCorrect"]
    }

    fn next_steps(&self, _ctx: &ToolContext, exec: &Execution) -> Vec<String> {
        let mut steps = vec!["workflow.launch to start fresh work".to_string()];
        if let Some(data) = &exec.data {
            if data.get("stashRef").is_some_and(|v| !v.is_null()) {
                steps.push("git stash list to find the parked changes".to_string());
            }
        }
        steps
    }
}
