//! `workflow.commit` - commit changes on the session branch.

use anyhow::Result;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

use crate::audit::{AuditEntry, AuditResult};
use crate::git::CommitOptions;
use crate::session::{TransitionFacts, WorkflowState, WorkflowType};

use super::{
    Collection, Execution, MissingParameter, ToolContext, ToolRuntime, WorkflowTool,
    advance_session_if_valid, parse_params,
};

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", default)]
struct CommitParams {
    /// Commit message. There is no silent default: a missing message is
    /// collected from the caller.
    message: Option<String>,
    /// Commit only the index instead of staging everything first.
    staged_only: bool,
    /// Proceed despite failed pre-flight checks.
    force: bool,
    /// Accept the recommended option of every prompt check.
    auto: bool,
    /// Chosen prompt options from a previous invocation, by check id.
    choices: BTreeMap<String, String>,
}

pub struct CommitTool;

impl WorkflowTool for CommitTool {
    fn name(&self) -> &'static str {
        "workflow.commit"
    }

    fn description(&self) -> &'static str {
        "Commit the working tree (or the index) on the current session branch"
    }

    fn input_schema(&self) -> schemars::Schema {
        schemars::schema_for!(CommitParams)
    }

    fn collect_parameters(&self, _rt: &ToolRuntime, params: &Map<String, Value>) -> Result<Collection> {
        let params: CommitParams = parse_params(params)?;
        match params.message.as_deref().map(str::trim) {
            Some(message) if !message.is_empty() => Ok(Collection::Ready),
            _ => Ok(Collection::NeedsInput {
                missing: vec![MissingParameter::required(
                    "message",
                    "commit message, e.g. \"feat(auth): add login endpoint\"",
                )],
            }),
        }
    }

    fn create_context(&self, rt: &ToolRuntime, params: &Map<String, Value>) -> Result<ToolContext> {
        let params: CommitParams = parse_params(params)?;
        let mut ctx = ToolContext::for_runtime(rt)?;
        if let Some(current) = &ctx.current_branch {
            ctx.session = rt.store().get_session_by_branch(current)?;
            ctx.branch = Some(current.clone());
        }
        ctx.staged_only = params.staged_only;
        ctx.auto = params.auto;
        ctx.force = params.force;
        ctx.choices = params.choices;
        Ok(ctx)
    }

    fn preflight_ids(&self, ctx: &ToolContext) -> Vec<&'static str> {
        let mut ids = vec!["sessionExists", "sessionIsActive"];
        if ctx.staged_only {
            ids.push("hasStagedFiles");
        } else {
            ids.push("hasChangesToCommit");
        }
        ids
    }

    fn execute(
        &self,
        rt: &ToolRuntime,
        ctx: &mut ToolContext,
        params: &Map<String, Value>,
    ) -> Result<Execution> {
        let params: CommitParams = parse_params(params)?;
        let message = params.message.expect("collector guarantees a message");
        let mut session = ctx.session.clone().expect("pre-flight guarantees a session");

        let _lock = rt.store().acquire_lock(session.id)?;

        let sha = rt.repo().commit(
            &message,
            CommitOptions {
                staged_only: params.staged_only,
                no_verify: false,
            },
        )?;
        rt.audit().append_best_effort(
            &AuditEntry::new(self.name(), rt.actor(), AuditResult::Success)
                .with_session(session.id)
                .with_git_operation(format!("commit {sha}")),
        );

        let committed_state = match session.workflow_type {
            WorkflowType::Hotfix => WorkflowState::HotfixCommitted,
            _ => WorkflowState::ChangesCommitted,
        };
        let facts = TransitionFacts {
            commits_ahead: Some(rt.repo().commits_since_fork(&session.branch_name)?),
            ..Default::default()
        };
        // Subsequent commits on an already-committed session stay put; the
        // transition only fires from the ready state.
        advance_session_if_valid(rt, self.name(), &mut session, committed_state, "commit", &facts)?;

        ctx.expected_states = vec![committed_state];
        let exec = Execution {
            session_id: Some(session.id),
            branch_name: Some(session.branch_name.clone()),
            state: Some(session.current_state),
            data: Some(json!({ "sha": sha, "message": message })),
        };
        ctx.session = Some(session);
        Ok(exec)
    }

    fn postflight_ids(&self, ctx: &ToolContext) -> Vec<&'static str> {
        let mut ids = vec!["sessionStateCorrect"];
        if !ctx.staged_only {
            ids.push("noUncommittedChanges");
        }
        ids
    }

    fn next_steps(&self, _ctx: &ToolContext, _exec: &Execution) -> Vec<String> {
        vec![
            "workflow.commit again for further changes".to_string(),
            "workflow.ship to push, open a PR, and merge".to_string(),
        ]
    }
}
