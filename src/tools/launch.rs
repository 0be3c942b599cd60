//! `workflow.launch` - start a new session on a new feature branch.

use anyhow::Result;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

use crate::audit::{AuditEntry, AuditResult};
use crate::checks::preflight::OPT_STASH_CHANGES;
use crate::naming;
use crate::session::{
    StashMetadata, StashReason, TransitionFacts, WorkflowSession, WorkflowState, WorkflowType,
};
use crate::stash::StashManager;
use crate::utils;

use super::{Execution, ToolContext, ToolRuntime, WorkflowTool, advance_session, parse_params};

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", default)]
struct LaunchParams {
    /// Explicit branch name; derived from the description when absent.
    branch_name: Option<String>,
    /// Free-text description of the work; drives name generation.
    description: Option<String>,
    /// Proceed despite failed pre-flight checks.
    force: bool,
    /// A stash to pop onto the new branch after creation.
    stash_ref: Option<String>,
    /// Set to false to keep `stashRef` unpopped.
    pop_stash: Option<bool>,
    /// Accept the recommended option of every prompt check.
    auto: bool,
    /// Chosen prompt options from a previous invocation, by check id.
    choices: BTreeMap<String, String>,
}

pub struct LaunchTool;

impl LaunchTool {
    fn derive_branch_name(rt: &ToolRuntime, params: &LaunchParams) -> Result<String> {
        if let Some(explicit) = &params.branch_name {
            let explicit = explicit.trim();
            if naming::is_valid_branch_name(explicit) {
                return Ok(explicit.to_string());
            }
            // Normalize free-form input into the convention
            return Ok(naming::generate_branch_name(Some(explicit), &[], utils::now()));
        }
        let changed = rt.repo().changed_files()?;
        Ok(naming::generate_branch_name(
            params.description.as_deref(),
            &changed,
            utils::now(),
        ))
    }
}

impl WorkflowTool for LaunchTool {
    fn name(&self) -> &'static str {
        "workflow.launch"
    }

    fn description(&self) -> &'static str {
        "Create a feature branch off trunk and open a workflow session on it"
    }

    fn input_schema(&self) -> schemars::Schema {
        schemars::schema_for!(LaunchParams)
    }

    fn create_context(&self, rt: &ToolRuntime, params: &Map<String, Value>) -> Result<ToolContext> {
        let params: LaunchParams = parse_params(params)?;
        let mut ctx = ToolContext::for_runtime(rt)?;
        ctx.branch = Some(Self::derive_branch_name(rt, &params)?);
        ctx.auto = params.auto;
        ctx.force = params.force;
        ctx.choices = params.choices;
        ctx.expected_states = vec![WorkflowState::BranchReady];
        Ok(ctx)
    }

    fn preflight_ids(&self, _ctx: &ToolContext) -> Vec<&'static str> {
        vec![
            "onMainBranch",
            "workingDirectoryClean",
            "mainUpToDate",
            "noExistingSession",
            "branchNameAvailable",
        ]
    }

    fn execute(
        &self,
        rt: &ToolRuntime,
        ctx: &mut ToolContext,
        params: &Map<String, Value>,
    ) -> Result<Execution> {
        let params: LaunchParams = parse_params(params)?;
        let branch = ctx.branch.clone().expect("context derived a branch name");
        let trunk = ctx.trunk.clone();
        let stasher = StashManager::new(rt.repo());

        // A sentinel session squatting on trunk blocks everything; abort it.
        if let Some(mut sentinel) = rt.store().get_session_by_branch(&trunk)? {
            if sentinel.is_active() {
                log::info!("aborting sentinel session {} on {trunk}", sentinel.id);
                let transition = sentinel.transition_to(
                    WorkflowState::Aborted,
                    "sentinel-cleanup",
                    &TransitionFacts::default(),
                )?;
                let (from, to) = (transition.from, transition.to);
                rt.store().save_session(&sentinel)?;
                rt.audit().append_best_effort(
                    &AuditEntry::new(self.name(), rt.actor(), AuditResult::Aborted)
                        .with_session(sentinel.id)
                        .with_transition(from, to),
                );
            }
        }

        // Dirty tree resolved to "stash" in pre-flight: park the changes
        // and restore them on the new branch.
        let stash_chosen = ctx.choices.get("workingDirectoryClean").map(String::as_str)
            == Some(OPT_STASH_CHANGES);
        let auto_stash = if stasher.has_uncommitted_changes()? && (ctx.auto || stash_chosen) {
            Some(stasher.stash_changes(StashReason::Launch, Some(trunk.as_str()))?)
        } else {
            None
        };

        rt.repo().create_and_checkout(&branch, Some(trunk.as_str()))?;

        let mut session = WorkflowSession::new(&branch, WorkflowType::Launch);
        session.metadata.description = params.description.clone();
        session.metadata.author = Some(rt.actor());
        if let Some(handle) = &auto_stash {
            session.metadata.stash = Some(StashMetadata {
                stash_ref: handle.stash_ref.clone(),
                reason: StashReason::Launch,
                created_at: utils::now(),
            });
        }

        let _lock = rt.store().acquire_lock(session.id)?;
        rt.store().save_session(&session)?;
        advance_session(
            rt,
            self.name(),
            &mut session,
            WorkflowState::BranchReady,
            "launch",
            &TransitionFacts::default(),
        )?;
        rt.store().set_current(Some(session.id))?;

        // Restore stashed work onto the new branch: the explicit stashRef
        // parameter wins, else our own auto-stash.
        let to_pop = match (&params.stash_ref, params.pop_stash) {
            (Some(explicit), pop) if pop != Some(false) => Some(explicit.clone()),
            _ => auto_stash.as_ref().map(|h| h.stash_ref.clone()),
        };
        if let Some(stash_ref) = to_pop {
            stasher.pop_stash(&stash_ref)?;
            let popped = rt.store().update_session(session.id, |s| {
                s.metadata.stash = None;
            })?;
            session = popped;
        }

        let exec = Execution {
            session_id: Some(session.id),
            branch_name: Some(branch.clone()),
            state: Some(session.current_state),
            data: Some(json!({ "trunk": trunk })),
        };
        ctx.session = Some(session);
        Ok(exec)
    }

    fn postflight_ids(&self, _ctx: &ToolContext) -> Vec<&'static str> {
        vec![
            "sessionCreated",
            "branchCheckedOut",
            "sessionStateCorrect",
            "branchAvailable",
        ]
    }

    fn next_steps(&self, ctx: &ToolContext, _exec: &Execution) -> Vec<String> {
        vec![
            format!(
                "edit files on {}, then workflow.commit",
                ctx.branch.as_deref().unwrap_or("the branch")
            ),
            "workflow.ship when the work is ready to merge".to_string(),
        ]
    }
}
