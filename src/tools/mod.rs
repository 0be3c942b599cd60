//! Workflow tools and the uniform execute pipeline.
//!
//! Every mutating tool implements [`WorkflowTool`] and is driven through
//! the same pipeline: initialization check → parameter collection →
//! read-only context derivation → pre-flight checks → business logic →
//! post-flight verifications → merged [`ToolResult`]. The driver is the
//! error boundary: every failure becomes a tagged result, and a
//! cancellation flag is honored between phases.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditLog, AuditResult};
use crate::checks::{
    CheckContext, CheckReport, PlatformReadiness, postflight::POSTFLIGHT_CHECKS,
    preflight::PREFLIGHT_CHECKS, run_checks,
};
use crate::config::{self, ConfigScope, DevsoloConfig};
use crate::git::{GitError, Repository};
use crate::platform::{GithubClient, PlatformError, PullRequest};
use crate::session::{
    SessionStore, StateError, StoreError, TransitionFacts, WorkflowSession, WorkflowState,
};

mod abort;
mod cleanup;
mod commit;
mod hotfix;
mod init;
mod launch;
pub mod result;
mod ship;
mod status;
mod swap;

pub use result::{ErrorKind, ToolError, ToolResult};

/// Shared environment for one tool invocation.
pub struct ToolRuntime {
    repo: Repository,
    base: PathBuf,
    config: DevsoloConfig,
    store: SessionStore,
    audit: AuditLog,
    cancel: Arc<AtomicBool>,
}

impl ToolRuntime {
    /// Discover the repository from `start` and open the workspace.
    ///
    /// The project-scope base wins when initialized; otherwise an
    /// initialized user-scope base is used; otherwise the (uninitialized)
    /// project base, so `devsolo.init` has somewhere to write.
    pub fn initialize(start: &Path) -> Result<Self> {
        let repo = Repository::discover(start)?;
        let root = repo.root().to_path_buf();
        let project_base = config::resolve_base_path(&root, ConfigScope::Project);
        let base = if config::is_initialized(&project_base) {
            project_base
        } else {
            let user_base = config::resolve_base_path(&root, ConfigScope::User);
            if config::is_initialized(&user_base) {
                user_base
            } else {
                project_base
            }
        };
        Self::at_base(repo, base)
    }

    /// Open the workspace at an explicit base directory.
    pub fn at_base(repo: Repository, base: PathBuf) -> Result<Self> {
        let config = config::load(&base)?;
        let audit = AuditLog::with_limits(
            base.join("audit"),
            config.preferences.audit_max_file_bytes,
            config.preferences.audit_max_rotations,
        );
        let store = SessionStore::open(&base, audit.clone())?;
        Ok(Self {
            repo,
            base,
            config,
            store,
            audit,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn config(&self) -> &DevsoloConfig {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Reload configuration from disk (explicit watch notification only).
    pub fn reload_config(&mut self) -> Result<()> {
        self.config = config::load(&self.base)?;
        Ok(())
    }

    /// The acting user recorded on audit entries.
    pub fn actor(&self) -> String {
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "devsolo".to_string())
    }

    /// Handle for requesting cooperative cancellation.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Attempt to build the platform client.
    pub fn platform_client(&self) -> Result<GithubClient, PlatformError> {
        GithubClient::from_repository(&self.repo, &self.config)
    }
}

/// Outcome of parameter collection.
pub enum Collection {
    Ready,
    /// Required parameters are missing; the structured description lets an
    /// orchestrating client ask the user and call back with filled input.
    NeedsInput { missing: Vec<MissingParameter> },
}

/// One parameter the collector still needs.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingParameter {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl MissingParameter {
    pub fn required(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: true,
        }
    }
}

/// Typed context bundle derived read-only before pre-flight.
///
/// Tools may update `session`, `branch`, and `expected_states` during
/// execution so post-flight verifies the *new* state of the world.
#[derive(Default)]
pub struct ToolContext {
    pub trunk: String,
    pub current_branch: Option<String>,
    pub branch: Option<String>,
    pub session: Option<WorkflowSession>,
    pub expected_states: Vec<WorkflowState>,
    pub staged_only: bool,
    pub auto: bool,
    pub force: bool,
    pub choices: BTreeMap<String, String>,
    pub advisory: Vec<&'static str>,
    pub open_prs: Option<Vec<PullRequest>>,
    pub platform: PlatformReadiness,
    pub ci_configured: Option<bool>,
    /// Tool-private notes threaded between phases (e.g. which ship steps
    /// are enabled, so post-flight only verifies what actually ran).
    pub extras: Map<String, Value>,
}

impl ToolContext {
    fn check_context<'a>(&'a self, rt: &'a ToolRuntime) -> CheckContext<'a> {
        CheckContext {
            repo: &rt.repo,
            store: &rt.store,
            trunk: &self.trunk,
            current_branch: self.current_branch.as_deref(),
            branch: self.branch.as_deref(),
            session: self.session.as_ref(),
            expected_states: &self.expected_states,
            staged_only: self.staged_only,
            auto: self.auto,
            choices: &self.choices,
            advisory: &self.advisory,
            open_prs: self.open_prs.as_deref(),
            platform: self.platform.clone(),
            ci_configured: self.ci_configured,
        }
    }

    /// Base context for the current repository state.
    pub fn for_runtime(rt: &ToolRuntime) -> Result<Self> {
        let trunk = rt.repo.trunk()?.to_string();
        let current_branch = rt.repo.current_branch()?;
        Ok(Self {
            trunk,
            current_branch,
            ..Self::default()
        })
    }
}

/// What a tool's business logic produced.
#[derive(Debug, Default)]
pub struct Execution {
    pub session_id: Option<Uuid>,
    pub branch_name: Option<String>,
    pub state: Option<WorkflowState>,
    pub data: Option<Value>,
}

/// The uniform tool contract.
///
/// Concrete tools override only the phases they need; the driver composes
/// them. `create_context` must be a pure read; side effects belong in
/// `execute`.
pub trait WorkflowTool: Sync {
    /// Dotted transport name, e.g. `workflow.launch`.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON Schema of the parameter object.
    fn input_schema(&self) -> schemars::Schema;

    /// All tools but the initializer require an initialized workspace.
    fn requires_init(&self) -> bool {
        true
    }

    /// Phase 2: decide whether required parameters are present.
    fn collect_parameters(
        &self,
        _rt: &ToolRuntime,
        _params: &Map<String, Value>,
    ) -> Result<Collection> {
        Ok(Collection::Ready)
    }

    /// Phase 3: read-only derivation of the context bundle.
    fn create_context(&self, rt: &ToolRuntime, params: &Map<String, Value>) -> Result<ToolContext>;

    /// Phase 4 configuration: pre-flight check ids, in evaluation order.
    fn preflight_ids(&self, _ctx: &ToolContext) -> Vec<&'static str> {
        Vec::new()
    }

    /// Phase 5: the business logic.
    fn execute(
        &self,
        rt: &ToolRuntime,
        ctx: &mut ToolContext,
        params: &Map<String, Value>,
    ) -> Result<Execution>;

    /// Phase 6 configuration: post-flight verification ids.
    fn postflight_ids(&self, _ctx: &ToolContext) -> Vec<&'static str> {
        Vec::new()
    }

    /// Guidance appended to a successful result.
    fn next_steps(&self, _ctx: &ToolContext, _exec: &Execution) -> Vec<String> {
        Vec::new()
    }
}

/// The registered tools, in listing order.
static TOOLS: &[&dyn WorkflowTool] = &[
    &init::InitTool,
    &launch::LaunchTool,
    &commit::CommitTool,
    &ship::ShipTool,
    &swap::SwapTool,
    &abort::AbortTool,
    &hotfix::HotfixTool,
    &cleanup::CleanupTool,
    &status::StatusTool,
];

pub fn registry() -> &'static [&'static dyn WorkflowTool] {
    TOOLS
}

pub fn find_tool(name: &str) -> Option<&'static dyn WorkflowTool> {
    TOOLS.iter().copied().find(|tool| tool.name() == name)
}

/// Dispatch a tool by dotted name. Unknown tools produce `unknown-tool`.
pub fn dispatch(rt: &ToolRuntime, name: &str, params: Value) -> ToolResult {
    match find_tool(name) {
        Some(tool) => run_tool(tool, rt, params),
        None => {
            let known: Vec<&str> = TOOLS.iter().map(|t| t.name()).collect();
            ToolResult::error(ErrorKind::UnknownTool, format!("unknown tool: {name}"))
                .with_next_steps(vec![format!("known tools: {}", known.join(", "))])
        }
    }
}

/// Drive a tool through the full pipeline, converting every failure into a
/// structured result.
pub fn run_tool(tool: &dyn WorkflowTool, rt: &ToolRuntime, params: Value) -> ToolResult {
    let started = std::time::Instant::now();
    let mut result = run_pipeline(tool, rt, params).unwrap_or_else(failure_result);
    ensure_remediation(&mut result);
    log::debug!(
        "{} finished in {:?} (success: {})",
        tool.name(),
        started.elapsed(),
        result.success
    );
    result
}

fn run_pipeline(tool: &dyn WorkflowTool, rt: &ToolRuntime, params: Value) -> Result<ToolResult> {
    // Phase 1: initialization gate
    if tool.requires_init() && !config::is_initialized(&rt.base) {
        return Ok(ToolResult::error(
            ErrorKind::NotInitialized,
            "workspace is not initialized",
        )
        .with_next_steps(vec!["run devsolo.init".to_string()]));
    }

    let mut params = match params {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Ok(ToolResult::error(
                ErrorKind::Internal,
                format!("parameters must be a JSON object, got {other}"),
            ));
        }
    };
    drop_unknown_fields(tool, &mut params);

    // Phase 2: parameter collection
    if let Collection::NeedsInput { missing } = tool.collect_parameters(rt, &params)? {
        let names: Vec<&str> = missing.iter().map(|m| m.name.as_str()).collect();
        return Ok(ToolResult {
            success: false,
            error_kind: Some(ErrorKind::MissingParameter),
            errors: vec![format!("missing parameter(s): {}", names.join(", "))],
            data: Some(serde_json::json!({ "missingParameters": missing })),
            next_steps: vec![format!(
                "call {} again with the missing parameter(s) filled in",
                tool.name()
            )],
            ..ToolResult::default()
        });
    }

    // Phase 3: read-only context derivation
    let mut ctx = tool.create_context(rt, &params)?;

    if let Some(cancelled) = cancellation_checkpoint(rt, &mut ctx)? {
        return Ok(cancelled);
    }

    // Phase 4: pre-flight
    let pre_report = run_checks(
        PREFLIGHT_CHECKS,
        &tool.preflight_ids(&ctx),
        &ctx.check_context(rt),
    )?;
    let prompts = pre_report.prompts();
    if !prompts.is_empty() {
        let ids: Vec<&str> = prompts.iter().map(|p| p.id.as_str()).collect();
        return Ok(ToolResult {
            success: false,
            error_kind: Some(ErrorKind::PreFlightFailed),
            errors: vec![format!("pre-flight requires a decision: {}", ids.join(", "))],
            pre_flight_checks: pre_report.results,
            next_steps: vec![
                "pick an option and call again with choices: {\"<checkId>\": \"<optionId>\"}"
                    .to_string(),
                "or pass auto: true to accept the recommended options".to_string(),
            ],
            ..ToolResult::default()
        });
    }
    if !pre_report.all_passed && !ctx.force {
        let failed: Vec<String> = pre_report.failures().iter().map(|f| f.message.clone()).collect();
        return Ok(ToolResult {
            success: false,
            error_kind: Some(ErrorKind::PreFlightFailed),
            errors: failed,
            pre_flight_checks: pre_report.results,
            session_id: ctx.session.as_ref().map(|s| s.id),
            branch_name: ctx.branch.clone().or_else(|| ctx.current_branch.clone()),
            next_steps: vec!["resolve the failed checks, or pass force: true".to_string()],
            ..ToolResult::default()
        });
    }
    if !pre_report.all_passed {
        log::warn!("{}: proceeding past failed pre-flight (force)", tool.name());
    }

    if let Some(cancelled) = cancellation_checkpoint(rt, &mut ctx)? {
        return Ok(cancelled);
    }

    // Phase 5: business logic
    let exec = match tool.execute(rt, &mut ctx, &params) {
        Ok(exec) => exec,
        Err(err) => {
            let mut failure = failure_result(err);
            failure.pre_flight_checks = pre_report.results;
            failure.session_id = failure.session_id.or(ctx.session.as_ref().map(|s| s.id));
            failure.branch_name = failure
                .branch_name
                .or_else(|| ctx.branch.clone())
                .or_else(|| ctx.current_branch.clone());
            failure.state = failure.state.or(ctx.session.as_ref().map(|s| s.current_state));
            return Ok(failure);
        }
    };

    // Phase 6: post-flight (always advisory, always after a successful core)
    ctx.current_branch = rt.repo.current_branch().unwrap_or(ctx.current_branch.take());
    if let Some(id) = exec.session_id {
        if let Ok(Some(session)) = rt.store.get_session(id) {
            ctx.session = Some(session);
        }
    }
    let post_report: CheckReport = run_checks(
        POSTFLIGHT_CHECKS,
        &tool.postflight_ids(&ctx),
        &ctx.check_context(rt),
    )?;
    if !post_report.all_passed {
        log::warn!("{}: post-flight verification reported failures", tool.name());
    }

    // Phase 7: merged result
    let next_steps = tool.next_steps(&ctx, &exec);
    Ok(ToolResult {
        success: true,
        error_kind: None,
        session_id: exec.session_id,
        branch_name: exec.branch_name,
        state: exec.state,
        data: exec.data,
        errors: Vec::new(),
        pre_flight_checks: pre_report.results,
        post_flight_verifications: post_report.results,
        next_steps,
    })
}

/// Between phases: honor a pending cancellation by aborting the session in
/// scope and reporting `cancelled`.
fn cancellation_checkpoint(rt: &ToolRuntime, ctx: &mut ToolContext) -> Result<Option<ToolResult>> {
    if !rt.is_cancelled() {
        return Ok(None);
    }
    if let Some(session) = ctx.session.as_mut() {
        if session.is_active() {
            let transition =
                session.transition_to(WorkflowState::Aborted, "cancelled", &TransitionFacts::default())?;
            let (from, to) = (transition.from, transition.to);
            rt.store.save_session(session)?;
            rt.audit.append_best_effort(
                &AuditEntry::new("workflow.cancel", rt.actor(), AuditResult::Aborted)
                    .with_session(session.id)
                    .with_transition(from, to),
            );
        }
    }
    Ok(Some(
        ToolResult::error(ErrorKind::Cancelled, "operation cancelled")
            .with_next_steps(vec!["re-run the tool to start over".to_string()]),
    ))
}

/// Validate and persist a state transition, with its audit entry.
pub(crate) fn advance_session(
    rt: &ToolRuntime,
    action: &str,
    session: &mut WorkflowSession,
    to: WorkflowState,
    trigger: &str,
    facts: &TransitionFacts,
) -> Result<()> {
    let transition = session.transition_to(to, trigger, facts)?;
    let (from, to) = (transition.from, transition.to);
    rt.store.save_session(session)?;
    rt.audit.append_best_effort(
        &AuditEntry::new(action, rt.actor(), AuditResult::Success)
            .with_session(session.id)
            .with_transition(from, to),
    );
    Ok(())
}

/// Advance only when the session's transition table declares the tuple.
///
/// Ship drives sessions of any workflow kind through its checkpoints;
/// kinds whose tables skip an intermediate state simply pass it by.
pub(crate) fn advance_session_if_valid(
    rt: &ToolRuntime,
    action: &str,
    session: &mut WorkflowSession,
    to: WorkflowState,
    trigger: &str,
    facts: &TransitionFacts,
) -> Result<bool> {
    if !crate::session::state::is_valid_transition(session.workflow_type, session.current_state, to)
    {
        log::debug!(
            "skipping {} -> {to} (not in the {} table)",
            session.current_state,
            session.workflow_type
        );
        return Ok(false);
    }
    advance_session(rt, action, session, to, trigger, facts)?;
    Ok(true)
}

/// Deserialize a tool's typed parameter struct from the raw map.
pub(crate) fn parse_params<T: serde::de::DeserializeOwned>(params: &Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(params.clone()))
        .map_err(|e| anyhow::anyhow!("invalid parameters: {e}"))
}

fn drop_unknown_fields(tool: &dyn WorkflowTool, params: &mut Map<String, Value>) {
    let schema = tool.input_schema();
    let Some(properties) = schema
        .as_value()
        .get("properties")
        .and_then(Value::as_object)
    else {
        return;
    };
    params.retain(|key, _| {
        let known = properties.contains_key(key);
        if !known {
            log::debug!("{}: dropping unknown parameter field {key:?}", tool.name());
        }
        known
    });
}

/// Convert an arbitrary error into a tagged failure result.
fn failure_result(err: anyhow::Error) -> ToolResult {
    if let Some(tool_err) = err.downcast_ref::<ToolError>() {
        return ToolResult {
            success: false,
            error_kind: Some(tool_err.kind),
            errors: vec![tool_err.message.clone()],
            data: tool_err.data.clone(),
            next_steps: tool_err.next_steps.clone(),
            ..ToolResult::default()
        };
    }
    let kind = if err.downcast_ref::<GitError>().is_some() {
        ErrorKind::GitFailure
    } else if let Some(platform_err) = err.downcast_ref::<PlatformError>() {
        match platform_err {
            // Missing credentials get the same "fix your auth" guidance as
            // rejected ones.
            PlatformError::Forbidden { .. } | PlatformError::NotConfigured(_) => {
                ErrorKind::PlatformForbidden
            }
            _ => ErrorKind::PlatformUnreachable,
        }
    } else if err.downcast_ref::<StateError>().is_some() {
        ErrorKind::InvalidStateTransition
    } else if let Some(store_err) = err.downcast_ref::<StoreError>() {
        match store_err {
            StoreError::LockHeld { .. } => ErrorKind::LockHeld,
            _ => ErrorKind::Internal,
        }
    } else {
        ErrorKind::Internal
    };

    let message = if kind == ErrorKind::Internal && log::log_enabled!(log::Level::Debug) {
        // Attach the error chain only at debug level
        format!("{err:?}")
    } else {
        err.to_string()
    };
    ToolResult::error(kind, message)
}

/// Every non-success result carries at least one concrete remediation.
fn ensure_remediation(result: &mut ToolResult) {
    if result.success || !result.next_steps.is_empty() {
        return;
    }
    let step = match result.error_kind {
        Some(ErrorKind::NotInitialized) => "run devsolo.init",
        Some(ErrorKind::LockHeld) => "wait for the other operation to finish and retry",
        Some(ErrorKind::PlatformForbidden) => "check GITHUB_TOKEN / GH_TOKEN and repository access",
        Some(ErrorKind::PlatformUnreachable) => "check network connectivity and retry",
        Some(ErrorKind::GitFailure) => "inspect the git error above and retry",
        Some(ErrorKind::InvalidStateTransition) => "run devsolo.status to see the session state",
        Some(ErrorKind::Cancelled) => "re-run the tool to start over",
        _ => "run devsolo.status to inspect the workspace",
    };
    result.next_steps.push(step.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[derive(serde::Deserialize, schemars::JsonSchema, Default)]
    #[serde(rename_all = "camelCase", default)]
    struct EchoParams {
        message: Option<String>,
    }

    impl WorkflowTool for EchoTool {
        fn name(&self) -> &'static str {
            "test.echo"
        }
        fn description(&self) -> &'static str {
            "echo"
        }
        fn input_schema(&self) -> schemars::Schema {
            schemars::schema_for!(EchoParams)
        }
        fn requires_init(&self) -> bool {
            false
        }
        fn create_context(&self, rt: &ToolRuntime, _params: &Map<String, Value>) -> Result<ToolContext> {
            ToolContext::for_runtime(rt)
        }
        fn execute(
            &self,
            _rt: &ToolRuntime,
            _ctx: &mut ToolContext,
            _params: &Map<String, Value>,
        ) -> Result<Execution> {
            Ok(Execution::default())
        }
    }

    fn runtime() -> (tempfile::TempDir, ToolRuntime) {
        let dir = tempfile::TempDir::new().unwrap();
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
        let rt = ToolRuntime::at_base(repo, base).unwrap();
        (dir, rt)
    }

    #[test]
    fn test_dispatch_unknown_tool() {
        let (_dir, rt) = runtime();
        let result = dispatch(&rt, "workflow.nonsense", Value::Null);
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::UnknownTool));
        assert!(!result.next_steps.is_empty());
    }

    #[test]
    fn test_uninitialized_workspace_gate() {
        let (_dir, rt) = runtime();
        let result = dispatch(&rt, "workflow.launch", Value::Null);
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::NotInitialized));
    }

    #[test]
    fn test_unknown_fields_dropped() {
        let (_dir, rt) = runtime();
        let params = serde_json::json!({ "message": "hi", "bogusField": 1 });
        let result = run_tool(&EchoTool, &rt, params);
        assert!(result.success, "errors: {:?}", result.errors);
    }

    #[test]
    fn test_non_object_params_rejected() {
        let (_dir, rt) = runtime();
        let result = run_tool(&EchoTool, &rt, Value::String("nope".into()));
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Internal));
    }

    #[test]
    fn test_cancellation_between_phases() {
        let (_dir, rt) = runtime();
        rt.cancel_handle().store(true, Ordering::Relaxed);
        let result = run_tool(&EchoTool, &rt, Value::Null);
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Cancelled));
    }

    #[test]
    fn test_registry_names_are_dotted_and_unique() {
        let mut names: Vec<&str> = registry().iter().map(|t| t.name()).collect();
        assert!(names.iter().all(|n| n.contains('.')));
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total, "duplicate tool names");
        assert_eq!(total, 9);
    }

    #[test]
    fn test_failure_result_classification() {
        let git_err = anyhow::Error::new(GitError::DetachedHead);
        assert_eq!(failure_result(git_err).error_kind, Some(ErrorKind::GitFailure));

        let tool_err = anyhow::Error::new(ToolError::new(ErrorKind::CiFailed, "lint failed"));
        let result = failure_result(tool_err);
        assert_eq!(result.error_kind, Some(ErrorKind::CiFailed));
        assert_eq!(result.errors, vec!["lint failed"]);

        let platform_err = anyhow::Error::new(PlatformError::Forbidden {
            status: 403,
            message: "bad credentials".into(),
        });
        assert_eq!(
            failure_result(platform_err).error_kind,
            Some(ErrorKind::PlatformForbidden)
        );
    }
}
