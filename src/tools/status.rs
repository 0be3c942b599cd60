//! `devsolo.status` - read-only session report.

use anyhow::Result;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::session::{ListFilter, WorkflowSession};
use crate::utils;

use super::{Execution, ToolContext, ToolRuntime, WorkflowTool, parse_params};

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", default)]
struct StatusParams {
    /// Report the session on this branch; defaults to the current branch.
    branch_name: Option<String>,
    /// Report all sessions (including terminal and expired) instead.
    all: bool,
}

pub struct StatusTool;

fn session_report(session: &WorkflowSession) -> Value {
    json!({
        "id": session.id,
        "branchName": session.branch_name,
        "workflowType": session.workflow_type,
        "currentState": session.current_state,
        "createdAt": session.created_at,
        "updatedAt": session.updated_at,
        "expiresAt": session.expires_at,
        "expired": session.is_expired(utils::now()),
        "pr": session.metadata.pr,
        "branch": session.metadata.branch,
        "stash": session.metadata.stash,
        "description": session.metadata.description,
        "transitions": session.state_history.len(),
    })
}

impl WorkflowTool for StatusTool {
    fn name(&self) -> &'static str {
        "devsolo.status"
    }

    fn description(&self) -> &'static str {
        "Report the current (or named, or all) workflow session(s); read-only"
    }

    fn input_schema(&self) -> schemars::Schema {
        schemars::schema_for!(StatusParams)
    }

    fn create_context(&self, rt: &ToolRuntime, _params: &Map<String, Value>) -> Result<ToolContext> {
        ToolContext::for_runtime(rt)
    }

    fn execute(
        &self,
        rt: &ToolRuntime,
        ctx: &mut ToolContext,
        params: &Map<String, Value>,
    ) -> Result<Execution> {
        let params: StatusParams = parse_params(params)?;

        if params.all {
            let sessions = rt
                .store()
                .list_sessions(ListFilter { all: true, include_expired: true })?;
            let active = sessions.iter().filter(|s| s.is_active()).count();
            return Ok(Execution {
                data: Some(json!({
                    "trunk": ctx.trunk,
                    "activeCount": active,
                    "sessions": sessions.iter().map(session_report).collect::<Vec<_>>(),
                })),
                ..Execution::default()
            });
        }

        let branch = params
            .branch_name
            .or_else(|| ctx.current_branch.clone());
        let session = match &branch {
            Some(branch) => rt.store().get_session_by_branch(branch)?,
            None => None,
        };

        let exec = Execution {
            session_id: session.as_ref().map(|s| s.id),
            branch_name: branch.clone(),
            state: session.as_ref().map(|s| s.current_state),
            data: Some(json!({
                "trunk": ctx.trunk,
                "currentBranch": ctx.current_branch,
                "session": session.as_ref().map(session_report),
                "branchStatus": rt.repo().branch_status(branch.as_deref()).ok(),
            })),
        };
        ctx.session = session;
        Ok(exec)
    }

    fn next_steps(&self, ctx: &ToolContext, _exec: &Execution) -> Vec<String> {
        match &ctx.session {
            Some(session) => vec![format!(
                "session is in {}; continue with workflow.commit or workflow.ship",
                session.current_state
            )],
            None => vec!["workflow.launch to start a session".to_string()],
        }
    }
}
