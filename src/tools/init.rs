//! `devsolo.init` - initialize the workspace.

use anyhow::Result;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::audit::{AuditEntry, AuditLog, AuditResult};
use crate::config::{self, ConfigScope, DevsoloConfig};
use crate::hooks;

use super::{Execution, ToolContext, ToolRuntime, WorkflowTool, parse_params};

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", default)]
struct InitParams {
    /// Where the workspace lives: `project` (default) or `user`.
    scope: Option<ConfigScope>,
    /// Re-initialize an already-initialized workspace.
    force: bool,
}

/// The only tool exempt from the initialization check.
pub struct InitTool;

impl WorkflowTool for InitTool {
    fn name(&self) -> &'static str {
        "devsolo.init"
    }

    fn description(&self) -> &'static str {
        "Initialize the devsolo workspace: configuration, marker, hook scripts, and templates"
    }

    fn input_schema(&self) -> schemars::Schema {
        schemars::schema_for!(InitParams)
    }

    fn requires_init(&self) -> bool {
        false
    }

    fn create_context(&self, rt: &ToolRuntime, _params: &Map<String, Value>) -> Result<ToolContext> {
        ToolContext::for_runtime(rt)
    }

    fn execute(
        &self,
        rt: &ToolRuntime,
        _ctx: &mut ToolContext,
        params: &Map<String, Value>,
    ) -> Result<Execution> {
        let params: InitParams = parse_params(params)?;
        let scope = params.scope.unwrap_or_default();
        let base = config::resolve_base_path(rt.repo().root(), scope);

        let already = config::is_initialized(&base);
        if already && !params.force {
            log::info!("workspace at {} is already initialized", base.display());
            return Ok(Execution {
                data: Some(json!({
                    "basePath": base,
                    "scope": scope,
                    "alreadyInitialized": true,
                })),
                ..Execution::default()
            });
        }

        std::fs::create_dir_all(&base)?;
        let cfg = DevsoloConfig::initialized_default(scope);
        config::save(&base, &cfg)?;
        let marker = config::write_marker(&base)?;

        let installed = if cfg.components.hooks {
            let materialized = hooks::materialize(&base, rt.repo())?;
            materialized.installed
        } else {
            Vec::new()
        };

        // The runtime may be rooted at a different base (e.g. user-scope
        // init from an uninitialized project); audit where we wrote.
        let audit = AuditLog::with_limits(
            base.join("audit"),
            cfg.preferences.audit_max_file_bytes,
            cfg.preferences.audit_max_rotations,
        );
        audit.append_best_effort(
            &AuditEntry::new(self.name(), rt.actor(), AuditResult::Success)
                .with_command(format!("init --scope {scope}")),
        );

        Ok(Execution {
            data: Some(json!({
                "basePath": base,
                "scope": scope,
                "version": marker.version,
                "hooksInstalled": installed,
                "reinitialized": already,
            })),
            ..Execution::default()
        })
    }

    fn next_steps(&self, _ctx: &ToolContext, _exec: &Execution) -> Vec<String> {
        vec![
            "workflow.launch to start a feature branch".to_string(),
            "devsolo.status to inspect the workspace".to_string(),
        ]
    }
}
