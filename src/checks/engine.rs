//! Check registry and evaluation.

use anyhow::{Result, bail};

use super::{CheckContext, CheckLevel, CheckReport, CheckResult};

/// A registered check: id, human name, category, and the predicate.
pub struct CheckDef {
    pub id: &'static str,
    pub name: &'static str,
    pub category: &'static str,
    pub run: fn(&CheckContext) -> Result<CheckResult>,
}

/// Evaluate `ids` against `registry` in declaration order.
///
/// Unknown ids fail loudly - a tool declaring a check that does not exist
/// is a programming error, not a user-facing failure. The engine never
/// short-circuits: every check runs so the user sees the complete picture.
/// Failures of checks the context marks advisory are downgraded to
/// warnings.
pub fn run_checks(registry: &[CheckDef], ids: &[&str], ctx: &CheckContext) -> Result<CheckReport> {
    let mut results = Vec::with_capacity(ids.len());
    for id in ids {
        let Some(def) = registry.iter().find(|def| def.id == *id) else {
            bail!("unknown check id: {id}");
        };
        let mut result = (def.run)(ctx)?;
        if result.level == CheckLevel::Fail && ctx.advisory.contains(id) {
            log::debug!("downgrading advisory check {id} from fail to warn");
            result.level = CheckLevel::Warn;
        }
        results.push(result);
    }
    Ok(CheckReport::new(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::git::Repository;
    use crate::session::SessionStore;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn passing(_ctx: &CheckContext) -> Result<CheckResult> {
        Ok(CheckResult::pass("alpha", "Alpha", "ok"))
    }

    fn failing(_ctx: &CheckContext) -> Result<CheckResult> {
        Ok(CheckResult::fail("beta", "Beta", "bad"))
    }

    const TEST_REGISTRY: &[CheckDef] = &[
        CheckDef { id: "alpha", name: "Alpha", category: "test", run: passing },
        CheckDef { id: "beta", name: "Beta", category: "test", run: failing },
    ];

    fn with_ctx(advisory: &'static [&'static str], f: impl FnOnce(&CheckContext)) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::at_root(dir.path());
        let base = dir.path().join(".devsolo");
        let store = SessionStore::open(&base, AuditLog::new(base.join("audit"))).unwrap();
        let choices = BTreeMap::new();
        let ctx = CheckContext {
            repo: &repo,
            store: &store,
            trunk: "main",
            current_branch: Some("main"),
            branch: None,
            session: None,
            expected_states: &[],
            staged_only: false,
            auto: false,
            choices: &choices,
            advisory,
            open_prs: None,
            platform: Default::default(),
            ci_configured: None,
        };
        f(&ctx);
    }

    #[test]
    fn test_runs_in_declaration_order_without_short_circuit() {
        with_ctx(&[], |ctx| {
            let report = run_checks(TEST_REGISTRY, &["beta", "alpha"], ctx).unwrap();
            assert_eq!(report.results.len(), 2);
            assert_eq!(report.results[0].id, "beta");
            assert_eq!(report.results[1].id, "alpha");
            assert!(!report.all_passed);
        });
    }

    #[test]
    fn test_unknown_id_fails_loudly() {
        with_ctx(&[], |ctx| {
            let err = run_checks(TEST_REGISTRY, &["missing"], ctx).unwrap_err();
            assert!(err.to_string().contains("unknown check id"));
        });
    }

    #[test]
    fn test_advisory_downgrade() {
        with_ctx(&["beta"], |ctx| {
            let report = run_checks(TEST_REGISTRY, &["beta"], ctx).unwrap();
            assert_eq!(report.results[0].level, CheckLevel::Warn);
            assert!(report.all_passed);
        });
    }
}
