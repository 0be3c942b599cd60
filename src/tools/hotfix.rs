//! `workflow.hotfix` - start an expedited fix branch off trunk.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

use crate::naming;
use crate::session::{TransitionFacts, WorkflowSession, WorkflowState, WorkflowType};

use super::{
    Collection, Execution, MissingParameter, ToolContext, ToolRuntime, WorkflowTool,
    advance_session, parse_params,
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, schemars::JsonSchema,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", default)]
struct HotfixParams {
    /// What is broken. Required; drives the branch name.
    issue: Option<String>,
    severity: Severity,
    /// Proceed despite failed pre-flight checks.
    force: bool,
    /// Accept the recommended option of every prompt check.
    auto: bool,
    /// Chosen prompt options from a previous invocation, by check id.
    choices: BTreeMap<String, String>,
}

pub struct HotfixTool;

impl WorkflowTool for HotfixTool {
    fn name(&self) -> &'static str {
        "workflow.hotfix"
    }

    fn description(&self) -> &'static str {
        "Create a hotfix branch off trunk with an expedited workflow session"
    }

    fn input_schema(&self) -> schemars::Schema {
        schemars::schema_for!(HotfixParams)
    }

    fn collect_parameters(&self, _rt: &ToolRuntime, params: &Map<String, Value>) -> Result<Collection> {
        let params: HotfixParams = parse_params(params)?;
        match params.issue.as_deref().map(str::trim) {
            Some(issue) if !issue.is_empty() => Ok(Collection::Ready),
            _ => Ok(Collection::NeedsInput {
                missing: vec![MissingParameter::required(
                    "issue",
                    "short description of the problem being fixed",
                )],
            }),
        }
    }

    fn create_context(&self, rt: &ToolRuntime, params: &Map<String, Value>) -> Result<ToolContext> {
        let params: HotfixParams = parse_params(params)?;
        let issue = params.issue.expect("collector guarantees an issue");
        let mut ctx = ToolContext::for_runtime(rt)?;
        ctx.branch = Some(format!("hotfix/{}", naming::kebab_case(&issue)));
        ctx.auto = params.auto;
        ctx.force = params.force;
        ctx.choices = params.choices;
        ctx.expected_states = vec![WorkflowState::HotfixReady];
        Ok(ctx)
    }

    fn preflight_ids(&self, _ctx: &ToolContext) -> Vec<&'static str> {
        vec!["onMainBranch", "workingDirectoryClean"]
    }

    fn execute(
        &self,
        rt: &ToolRuntime,
        ctx: &mut ToolContext,
        params: &Map<String, Value>,
    ) -> Result<Execution> {
        let params: HotfixParams = parse_params(params)?;
        let issue = params.issue.expect("collector guarantees an issue");
        let branch = ctx.branch.clone().expect("context derived a branch name");
        let trunk = ctx.trunk.clone();

        rt.repo().create_and_checkout(&branch, Some(trunk.as_str()))?;

        let mut session = WorkflowSession::new(&branch, WorkflowType::Hotfix);
        session.metadata.description = Some(format!("{issue} (severity: {})", params.severity));
        session.metadata.author = Some(rt.actor());

        let _lock = rt.store().acquire_lock(session.id)?;
        rt.store().save_session(&session)?;
        advance_session(
            rt,
            self.name(),
            &mut session,
            WorkflowState::HotfixReady,
            "hotfix",
            &TransitionFacts::default(),
        )?;
        rt.store().set_current(Some(session.id))?;

        let exec = Execution {
            session_id: Some(session.id),
            branch_name: Some(branch),
            state: Some(session.current_state),
            data: Some(json!({ "severity": params.severity, "issue": issue })),
        };
        ctx.session = Some(session);
        Ok(exec)
    }

    fn postflight_ids(&self, _ctx: &ToolContext) -> Vec<&'static str> {
        vec!["sessionCreated", "branchCheckedOut", "sessionStateCorrect"]
    }

    fn next_steps(&self, ctx: &ToolContext, _exec: &Execution) -> Vec<String> {
        vec![
            format!(
                "fix the issue on {}, then workflow.commit",
                ctx.branch.as_deref().unwrap_or("the hotfix branch")
            ),
            "workflow.ship to push, validate, and deploy the fix".to_string(),
        ]
    }
}
