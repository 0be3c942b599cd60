//! Generated hook scripts and templates.
//!
//! Two scripts are materialized under `<base>/hooks/` and symlinked into
//! the repository's hooks directory: `pre-commit` and `pre-push`. Both
//! enforce the same policy: no direct commits or pushes to trunk, and no
//! manual commits on a branch an active session owns. Tool-driven git
//! subprocesses set `DEVSOLO_SESSION_GUARD=1` to pass the guard.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::git::Repository;

/// Files materialized by [`materialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedHooks {
    pub pre_commit: PathBuf,
    pub pre_push: PathBuf,
    pub commit_template: PathBuf,
    /// Hook names that were linked (or copied) into `.git/hooks`.
    pub installed: Vec<String>,
}

fn hook_script(verb: &str, base_dir_name: &str) -> String {
    format!(
        r#"#!/bin/sh
# Generated by devsolo. Do not edit; rerun devsolo.init to regenerate.
[ "$DEVSOLO_SESSION_GUARD" = "1" ] && exit 0

branch="$(git symbolic-ref --short -q HEAD)" || exit 0

case "$branch" in
  main|master)
    echo "devsolo: direct {verb} to $branch is not allowed; use the workflow tools" >&2
    exit 1
    ;;
esac

base="${{DEVSOLO_BASE_PATH:-{base_dir_name}}}"
sessions="$base/sessions"
if [ -d "$sessions" ]; then
  for record in "$sessions"/*.json; do
    [ -e "$record" ] || continue
    case "$(basename "$record")" in
      index.json|current.json) continue ;;
    esac
    if grep -q "\"branchName\": \"$branch\"" "$record" \
      && ! grep -qE "\"currentState\": \"(COMPLETE|HOTFIX_COMPLETE|ABORTED)\"" "$record"; then
      echo "devsolo: an active session owns $branch; {verb} through the workflow tools" >&2
      exit 1
    fi
  done
fi

exit 0
"#
    )
}

const COMMIT_TEMPLATE: &str = "\
# <type>(<scope>): <subject>
#
# type: feat | fix | chore | docs | test | refactor | release
# subject: imperative, lower case, no trailing period
#
# Body: what changed and why, wrapped at 72 columns.
";

/// Write hook scripts and the commit-message template under `base`, then
/// link them into the repository's hooks directory.
///
/// Symlinks are preferred; on filesystems (or platforms) without them the
/// scripts are copied instead.
pub fn materialize(base: &Path, repo: &Repository) -> Result<MaterializedHooks> {
    let hooks_dir = base.join("hooks");
    let templates_dir = base.join("templates");
    fs::create_dir_all(&hooks_dir)
        .with_context(|| format!("creating {}", hooks_dir.display()))?;
    fs::create_dir_all(&templates_dir)
        .with_context(|| format!("creating {}", templates_dir.display()))?;

    let base_dir_name = base
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(crate::config::DEFAULT_BASE_DIR);

    let pre_commit = hooks_dir.join("pre-commit");
    let pre_push = hooks_dir.join("pre-push");
    write_executable(&pre_commit, &hook_script("commit", base_dir_name))?;
    write_executable(&pre_push, &hook_script("push", base_dir_name))?;

    let commit_template = templates_dir.join("commit-message.txt");
    fs::write(&commit_template, COMMIT_TEMPLATE)
        .with_context(|| format!("writing {}", commit_template.display()))?;

    let git_hooks = repo.git_dir()?.join("hooks");
    fs::create_dir_all(&git_hooks)?;
    let mut installed = Vec::new();
    for (name, source) in [("pre-commit", &pre_commit), ("pre-push", &pre_push)] {
        install_hook(source, &git_hooks.join(name))?;
        installed.push(name.to_string());
    }

    Ok(MaterializedHooks {
        pre_commit,
        pre_push,
        commit_template,
        installed,
    })
}

fn write_executable(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

fn install_hook(source: &Path, target: &Path) -> Result<()> {
    match fs::symlink_metadata(target) {
        Ok(_) => {
            fs::remove_file(target)
                .with_context(|| format!("replacing existing hook {}", target.display()))?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    #[cfg(unix)]
    {
        let source = source
            .canonicalize()
            .with_context(|| format!("resolving {}", source.display()))?;
        if std::os::unix::fs::symlink(&source, target).is_ok() {
            return Ok(());
        }
        log::warn!(
            "symlink into {} failed; copying hook instead",
            target.display()
        );
    }

    fs::copy(source, target)
        .with_context(|| format!("copying hook to {}", target.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(target)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(target, perms)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scratch_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
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
        (dir, repo)
    }

    #[test]
    fn test_materialize_writes_and_installs() {
        let (dir, repo) = scratch_repo();
        let base = dir.path().join(".devsolo");
        let hooks = materialize(&base, &repo).unwrap();

        assert!(hooks.pre_commit.exists());
        assert!(hooks.pre_push.exists());
        assert!(hooks.commit_template.exists());
        assert_eq!(hooks.installed, vec!["pre-commit", "pre-push"]);

        let installed = repo.git_dir().unwrap().join("hooks/pre-commit");
        assert!(installed.exists());

        let content = fs::read_to_string(&hooks.pre_commit).unwrap();
        assert!(content.contains("DEVSOLO_SESSION_GUARD"));
        assert!(content.contains("main|master"));
        assert!(content.contains("branchName"));
    }

    #[cfg(unix)]
    #[test]
    fn test_scripts_are_executable() {
        use std::os::unix::fs::PermissionsExt;
        let (dir, repo) = scratch_repo();
        let base = dir.path().join(".devsolo");
        let hooks = materialize(&base, &repo).unwrap();
        let mode = fs::metadata(&hooks.pre_commit).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111, "hook must be executable");
    }

    #[test]
    fn test_materialize_is_idempotent() {
        let (dir, repo) = scratch_repo();
        let base = dir.path().join(".devsolo");
        materialize(&base, &repo).unwrap();
        materialize(&base, &repo).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_hook_blocks_direct_commit_to_trunk() {
        let (dir, repo) = scratch_repo();
        let base = dir.path().join(".devsolo");
        materialize(&base, &repo).unwrap();

        std::fs::write(dir.path().join("change.txt"), "x\n").unwrap();
        let out = std::process::Command::new("git")
            .args(["add", "-A"])
            .current_dir(dir.path())
            .output()
            .unwrap();
        assert!(out.status.success());

        let out = std::process::Command::new("git")
            .args(["commit", "-m", "direct"])
            .current_dir(dir.path())
            .output()
            .unwrap();
        assert!(!out.status.success(), "direct commit to main must be blocked");
        let stderr = String::from_utf8_lossy(&out.stderr);
        assert!(stderr.contains("devsolo"), "stderr: {stderr}");

        // The guard variable lets tool-driven commits through
        let out = std::process::Command::new("git")
            .args(["commit", "-m", "guarded"])
            .env("DEVSOLO_SESSION_GUARD", "1")
            .current_dir(dir.path())
            .output()
            .unwrap();
        assert!(out.status.success(), "guarded commit must pass");
    }
}
