//! `workflow.cleanup` - collect finished sessions and orphaned branches.

use anyhow::Result;
use chrono::Duration;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::audit::{AuditEntry, AuditResult};
use crate::session::{ListFilter, WorkflowSession};
use crate::utils;

use super::{Execution, ToolContext, ToolRuntime, WorkflowTool, parse_params};

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", default)]
struct CleanupParams {
    /// Also delete orphaned local branches (no session, not trunk).
    delete_branches: bool,
    /// Only collect sessions idle for at least this many days.
    older_than: Option<i64>,
    /// Propose only; never delete.
    dry_run: bool,
    /// Skip the confirmation phase.
    auto: bool,
    /// Second-phase confirmation of a previous proposal.
    confirm: bool,
}

impl Default for CleanupParams {
    fn default() -> Self {
        Self {
            delete_branches: false,
            older_than: None,
            dry_run: false,
            auto: false,
            confirm: false,
        }
    }
}

pub struct CleanupTool;

impl CleanupTool {
    /// Sessions eligible for collection: terminal or expired, and idle
    /// longer than the optional threshold.
    fn candidate_sessions(rt: &ToolRuntime, older_than: Option<i64>) -> Result<Vec<WorkflowSession>> {
        let now = utils::now();
        let all = rt
            .store()
            .list_sessions(ListFilter { all: true, include_expired: true })?;
        Ok(all
            .into_iter()
            .filter(|s| s.is_terminal() || s.is_expired(now))
            .filter(|s| match older_than {
                Some(days) => now - s.updated_at >= Duration::days(days),
                None => true,
            })
            .collect())
    }

    /// Local branches with no session record at all, excluding trunk and
    /// the checked-out branch.
    fn orphaned_branches(rt: &ToolRuntime, ctx: &ToolContext) -> Result<Vec<String>> {
        let mut orphans = Vec::new();
        for branch in rt.repo().local_branches()? {
            if branch == ctx.trunk || Some(&branch) == ctx.current_branch.as_ref() {
                continue;
            }
            if rt.store().sessions_for_branch(&branch)?.is_empty() {
                orphans.push(branch);
            }
        }
        Ok(orphans)
    }
}

impl WorkflowTool for CleanupTool {
    fn name(&self) -> &'static str {
        "workflow.cleanup"
    }

    fn description(&self) -> &'static str {
        "Delete terminal and expired sessions, orphaned branches, and stale locks"
    }

    fn input_schema(&self) -> schemars::Schema {
        schemars::schema_for!(CleanupParams)
    }

    fn create_context(&self, rt: &ToolRuntime, params: &Map<String, Value>) -> Result<ToolContext> {
        let params: CleanupParams = parse_params(params)?;
        let mut ctx = ToolContext::for_runtime(rt)?;
        ctx.auto = params.auto;
        Ok(ctx)
    }

    fn execute(
        &self,
        rt: &ToolRuntime,
        ctx: &mut ToolContext,
        params: &Map<String, Value>,
    ) -> Result<Execution> {
        let params: CleanupParams = parse_params(params)?;
        let sessions = Self::candidate_sessions(rt, params.older_than)?;
        let branches = if params.delete_branches {
            Self::orphaned_branches(rt, ctx)?
        } else {
            Vec::new()
        };

        // Auto-stashes parked by finished sessions are part of the mess
        // worth reporting.
        let stasher = crate::stash::StashManager::new(rt.repo());
        let parked: Vec<Value> = stasher
            .devsolo_stashes()?
            .into_iter()
            .map(|s| json!({ "ref": s.stash_ref, "reason": s.reason.to_string(), "branch": s.branch }))
            .collect();

        let proposal = json!({
            "sessions": sessions
                .iter()
                .map(|s| json!({
                    "id": s.id,
                    "branchName": s.branch_name,
                    "state": s.current_state,
                    "updatedAt": s.updated_at,
                }))
                .collect::<Vec<_>>(),
            "branches": branches,
            "parkedStashes": parked,
        });

        // Two-phase: propose, then delete only on confirmation (or auto).
        if params.dry_run || !(params.auto || params.confirm) {
            return Ok(Execution {
                data: Some(json!({
                    "phase": "proposal",
                    "proposed": proposal,
                })),
                ..Execution::default()
            });
        }

        let mut deleted_sessions = 0usize;
        for session in &sessions {
            // Best-effort drop of any stash the session still references;
            // a missing stash is expected, not an error.
            if let Some(stash) = &session.metadata.stash {
                if let Err(e) = rt.repo().stash_drop(&stash.stash_ref) {
                    log::debug!("stash {} already gone: {e}", stash.stash_ref);
                }
            }
            if rt.store().delete_session(session.id)? {
                deleted_sessions += 1;
            }
        }

        let mut deleted_branches = Vec::new();
        for branch in &branches {
            match rt.repo().delete_local_branch(branch, true) {
                Ok(()) => deleted_branches.push(branch.clone()),
                Err(e) => log::warn!("could not delete branch {branch}: {e}"),
            }
        }

        let stale_locks = rt.store().cleanup_orphaned_locks();

        rt.audit().append_best_effort(
            &AuditEntry::new(self.name(), rt.actor(), AuditResult::Success).with_command(format!(
                "cleanup: {deleted_sessions} session(s), {} branch(es), {stale_locks} lock(s)",
                deleted_branches.len()
            )),
        );

        Ok(Execution {
            data: Some(json!({
                "phase": "applied",
                "deletedSessions": deleted_sessions,
                "deletedBranches": deleted_branches,
                "staleLocksRemoved": stale_locks,
            })),
            ..Execution::default()
        })
    }

    fn next_steps(&self, _ctx: &ToolContext, exec: &Execution) -> Vec<String> {
        let proposing = exec
            .data
            .as_ref()
            .and_then(|d| d.get("phase"))
            .is_some_and(|p| p == "proposal");
        if proposing {
            vec!["re-run workflow.cleanup with confirm: true to apply".to_string()]
        } else {
            vec!["devsolo.status to review the remaining sessions".to_string()]
        }
    }
}
