// Helpers are shared across test binaries; not every binary uses all of
// them. Allow dead_code at the module level.
#![allow(dead_code)]

//! Shared fixtures: scratch git repositories with a bare `origin`, and an
//! initialized devsolo workspace driven through the real tool dispatcher.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use devsolo::tools::{self, ToolResult, ToolRuntime};

pub struct Scratch {
    /// Owns both the working repository and the bare remote.
    pub dir: TempDir,
    pub work: PathBuf,
    pub remote: PathBuf,
}

pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("DEVSOLO_SESSION_GUARD", "1")
        .output()
        .unwrap_or_else(|e| panic!("failed to spawn git {args:?}: {e}"));
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// A working repository on `main` with one commit, pushed to a bare
/// `origin` sibling.
pub fn scratch_with_remote() -> Scratch {
    let dir = TempDir::new().unwrap();
    let work = dir.path().join("work");
    let remote = dir.path().join("remote.git");
    std::fs::create_dir_all(&work).unwrap();
    std::fs::create_dir_all(&remote).unwrap();

    git(&remote, &["init", "--bare", "-b", "main"]);
    git(&work, &["init", "-b", "main"]);
    git(&work, &["config", "user.email", "dev@example.com"]);
    git(&work, &["config", "user.name", "Dev"]);
    std::fs::write(work.join("README.md"), "# scratch\n").unwrap();
    git(&work, &["add", "-A"]);
    git(&work, &["commit", "-m", "init"]);
    git(&work, &["remote", "add", "origin", remote.to_str().unwrap()]);
    git(&work, &["push", "-u", "origin", "main"]);

    Scratch { dir, work, remote }
}

/// Build a runtime and run `devsolo.init` through the dispatcher.
pub fn initialized_runtime(scratch: &Scratch) -> ToolRuntime {
    let rt = ToolRuntime::initialize(&scratch.work).unwrap();
    let result = tools::dispatch(&rt, "devsolo.init", serde_json::json!({}));
    assert!(result.success, "init failed: {:?}", result.errors);
    // Reopen so the runtime sees the saved configuration.
    ToolRuntime::initialize(&scratch.work).unwrap()
}

pub fn call(rt: &ToolRuntime, tool: &str, params: serde_json::Value) -> ToolResult {
    tools::dispatch(rt, tool, params)
}

pub fn write_file(scratch: &Scratch, name: &str, content: &str) {
    std::fs::write(scratch.work.join(name), content).unwrap();
}

pub fn current_branch(scratch: &Scratch) -> String {
    git(&scratch.work, &["symbolic-ref", "--short", "HEAD"])
        .trim()
        .to_string()
}

pub fn head_sha(scratch: &Scratch) -> String {
    git(&scratch.work, &["rev-parse", "HEAD"]).trim().to_string()
}
