//! Repository - typed operations over the local git binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use once_cell::sync::OnceCell;

use super::{BranchStatus, GitError, GitResult, LogEntry, StashEntry, WorkingTreeStatus};

/// Environment variable set on git subprocesses spawned by devsolo itself.
///
/// The generated pre-commit/pre-push hooks refuse direct commits on branches
/// with an active session; this variable is their bypass for tool-driven
/// operations.
pub const SESSION_GUARD_ENV: &str = "DEVSOLO_SESSION_GUARD";

/// Options for [`Repository::commit`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitOptions {
    /// Commit only the index; when false, all tracked modifications are
    /// staged first.
    pub staged_only: bool,
    /// Skip commit hooks (`--no-verify`).
    pub no_verify: bool,
}

/// Options for [`Repository::push`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PushOptions {
    /// Pass `--set-upstream origin <branch>`.
    pub set_upstream: bool,
    /// Force-push (`--force-with-lease`).
    pub force: bool,
}

/// Repository state for git operations.
///
/// All operations are synchronous from the caller's perspective; the
/// underlying subprocess blocks. Every command line is logged at debug level.
///
/// # Examples
///
/// ```no_run
/// use devsolo::git::Repository;
///
/// let repo = Repository::discover(".")?;
/// let branch = repo.current_branch()?;
/// let status = repo.branch_status(branch.as_deref())?;
/// # Ok::<(), devsolo::git::GitError>(())
/// ```
#[derive(Debug)]
pub struct Repository {
    root: PathBuf,
    /// Trunk name (`main` or `master`), resolved once.
    trunk: OnceCell<String>,
    /// Primary remote URL, resolved once. Inner None = no remote configured.
    remote_url: OnceCell<Option<String>>,
}

impl Repository {
    /// Discover the repository containing `path`.
    pub fn discover(path: impl AsRef<Path>) -> GitResult<Self> {
        let path = path.as_ref();
        let output = run_git_at(path, &["rev-parse", "--show-toplevel"])?;
        if !output.status.success() {
            return Err(GitError::NotARepository {
                path: path.to_path_buf(),
            });
        }
        let root = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
        Ok(Self {
            root,
            trunk: OnceCell::new(),
            remote_url: OnceCell::new(),
        })
    }

    /// Open a repository rooted exactly at `root` without discovery.
    pub fn at_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            trunk: OnceCell::new(),
            remote_url: OnceCell::new(),
        }
    }

    /// The repository root (main worktree directory).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The shared `.git` directory.
    pub fn git_dir(&self) -> GitResult<PathBuf> {
        let dir = self.run(&["rev-parse", "--git-common-dir"])?;
        let dir = PathBuf::from(dir.trim());
        if dir.is_relative() {
            Ok(self.root.join(dir))
        } else {
            Ok(dir)
        }
    }

    // =========================================================================
    // Command execution
    // =========================================================================

    /// Run a git command in this repository, returning stdout.
    ///
    /// Non-zero exits surface as [`GitError::CommandFailed`] with stderr (and
    /// stdout, for commands that report errors there) preserved.
    pub fn run(&self, args: &[&str]) -> GitResult<String> {
        let output = self.run_output(args)?;
        if !output.status.success() {
            return Err(command_failed(args, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a git command and report only whether it exited zero.
    ///
    /// Useful for commands whose exit code is the answer, like
    /// `git merge-base --is-ancestor` or `git diff --quiet`.
    pub fn run_check(&self, args: &[&str]) -> GitResult<bool> {
        Ok(self.run_output(args)?.status.success())
    }

    /// Run a git command and return the raw output for exit-code inspection.
    pub fn run_output(&self, args: &[&str]) -> GitResult<Output> {
        run_git_at(&self.root, args)
    }

    // =========================================================================
    // Branches
    // =========================================================================

    /// The current branch name, or `None` for detached HEAD.
    pub fn current_branch(&self) -> GitResult<Option<String>> {
        let output = self.run_output(&["symbolic-ref", "--short", "-q", "HEAD"])?;
        if !output.status.success() {
            return Ok(None);
        }
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if name.is_empty() { Ok(None) } else { Ok(Some(name)) }
    }

    /// The current branch name, or an error in detached HEAD state.
    pub fn require_current_branch(&self) -> GitResult<String> {
        self.current_branch()?.ok_or(GitError::DetachedHead)
    }

    /// Trunk detection: `main` if it exists, else `master`, else the
    /// symbolic default. Cached for the lifetime of this value.
    pub fn trunk(&self) -> GitResult<&str> {
        self.trunk
            .get_or_try_init(|| {
                for candidate in ["main", "master"] {
                    if self.branch_exists(candidate)? {
                        return Ok(candidate.to_string());
                    }
                }
                // Fresh clone tracking an unusual default: ask the remote HEAD.
                let output = self.run_output(&["symbolic-ref", "--short", "refs/remotes/origin/HEAD"])?;
                if output.status.success() {
                    let full = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if let Some(name) = full.strip_prefix("origin/") {
                        return Ok(name.to_string());
                    }
                }
                Ok("main".to_string())
            })
            .map(String::as_str)
    }

    /// Whether a local branch exists.
    pub fn branch_exists(&self, name: &str) -> GitResult<bool> {
        self.run_check(&[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/heads/{name}"),
        ])
    }

    /// Whether the remote-tracking ref `origin/<name>` exists.
    pub fn remote_branch_exists(&self, name: &str) -> GitResult<bool> {
        self.run_check(&[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/remotes/origin/{name}"),
        ])
    }

    /// List local branch names.
    pub fn local_branches(&self) -> GitResult<Vec<String>> {
        let out = self.run(&["for-each-ref", "--format=%(refname:short)", "refs/heads"])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    /// Create a branch at `start_point` (HEAD when absent) without switching.
    pub fn create_branch(&self, name: &str, start_point: Option<&str>) -> GitResult<()> {
        let mut args = vec!["branch", name];
        if let Some(start) = start_point {
            args.push(start);
        }
        self.run(&args).map(drop)
    }

    /// Switch to an existing branch.
    pub fn checkout(&self, name: &str) -> GitResult<()> {
        self.run(&["checkout", name]).map(drop)
    }

    /// Create a branch at `start_point` and switch to it.
    pub fn create_and_checkout(&self, name: &str, start_point: Option<&str>) -> GitResult<()> {
        let mut args = vec!["checkout", "-b", name];
        if let Some(start) = start_point {
            args.push(start);
        }
        self.run(&args).map(drop)
    }

    /// Delete a local branch. `force` uses `-D`.
    pub fn delete_local_branch(&self, name: &str, force: bool) -> GitResult<()> {
        let flag = if force { "-D" } else { "-d" };
        self.run(&["branch", flag, name]).map(drop)
    }

    /// Delete `origin/<name>` on the remote. Tolerates an already-deleted
    /// branch (the remote reports it as a non-fatal condition here).
    pub fn delete_remote_branch(&self, name: &str) -> GitResult<()> {
        // Guarded: the generated pre-push hook must not veto the tool's
        // own branch cleanup.
        let output = run_git_guarded(&self.root, &["push", "origin", "--delete", name])?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("remote ref does not exist") {
            log::debug!("remote branch {name} already deleted");
            return Ok(());
        }
        Err(command_failed(&["push", "origin", "--delete", name], &output))
    }

    /// Whether `branch` has an upstream configured.
    pub fn has_upstream(&self, branch: &str) -> GitResult<bool> {
        self.run_check(&[
            "rev-parse",
            "--abbrev-ref",
            "--symbolic-full-name",
            &format!("{branch}@{{upstream}}"),
        ])
    }

    // =========================================================================
    // Working tree
    // =========================================================================

    /// Parse `git status --porcelain` into a change summary.
    pub fn status(&self) -> GitResult<WorkingTreeStatus> {
        let out = self.run(&["status", "--porcelain"])?;
        let mut status = WorkingTreeStatus::default();
        for line in out.lines() {
            if line.len() < 4 {
                continue;
            }
            let (index, worktree) = {
                let mut chars = line.chars();
                (chars.next().unwrap_or(' '), chars.next().unwrap_or(' '))
            };
            let path = line[3..].to_string();
            match (index, worktree) {
                ('?', '?') => status.untracked.push(path),
                ('U', _) | (_, 'U') | ('A', 'A') | ('D', 'D') => status.conflicted.push(path),
                (i, w) => {
                    if i != ' ' {
                        status.staged.push(path.clone());
                    }
                    if w != ' ' {
                        status.unstaged.push(path);
                    }
                }
            }
        }
        Ok(status)
    }

    /// Any unstaged, staged, or untracked files?
    pub fn has_uncommitted_changes(&self) -> GitResult<bool> {
        Ok(self.status()?.has_changes())
    }

    /// Files currently staged in the index.
    pub fn staged_files(&self) -> GitResult<Vec<String>> {
        let out = self.run(&["diff", "--cached", "--name-only"])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    /// Files with unmerged conflict markers.
    pub fn conflicted_files(&self) -> GitResult<Vec<String>> {
        let out = self.run(&["diff", "--name-only", "--diff-filter=U"])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    /// All changed paths (staged, unstaged, and untracked).
    pub fn changed_files(&self) -> GitResult<Vec<String>> {
        Ok(self.status()?.all_paths())
    }

    /// Diff of the working tree (or the index with `staged`).
    pub fn diff(&self, staged: bool) -> GitResult<String> {
        if staged {
            self.run(&["diff", "--cached"])
        } else {
            self.run(&["diff"])
        }
    }

    /// Stage all changes, including untracked files.
    pub fn stage_all(&self) -> GitResult<()> {
        self.run(&["add", "-A"]).map(drop)
    }

    /// Stage specific paths.
    pub fn add(&self, paths: &[&str]) -> GitResult<()> {
        let mut args = vec!["add", "--"];
        args.extend_from_slice(paths);
        self.run(&args).map(drop)
    }

    // =========================================================================
    // Commits, push, pull
    // =========================================================================

    /// Create a commit and return its sha.
    ///
    /// Unless `staged_only`, all tracked modifications and untracked files
    /// are staged first. The session-guard variable is set so generated
    /// hooks recognize a tool-driven commit.
    pub fn commit(&self, message: &str, opts: CommitOptions) -> GitResult<String> {
        if !opts.staged_only {
            self.stage_all()?;
        }
        let mut args = vec!["commit", "-m", message];
        if opts.no_verify {
            args.push("--no-verify");
        }
        let output = run_git_guarded(&self.root, &args)?;
        if !output.status.success() {
            return Err(command_failed(&args, &output));
        }
        self.head_sha()
    }

    /// Sha of HEAD.
    pub fn head_sha(&self) -> GitResult<String> {
        Ok(self.run(&["rev-parse", "HEAD"])?.trim().to_string())
    }

    /// Sha of an arbitrary ref, or `None` if it does not resolve.
    pub fn ref_sha(&self, reference: &str) -> GitResult<Option<String>> {
        let output = self.run_output(&["rev-parse", "--verify", "--quiet", reference])?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
        ))
    }

    /// Push the current branch.
    pub fn push(&self, branch: &str, opts: PushOptions) -> GitResult<()> {
        let mut args = vec!["push"];
        if opts.force {
            args.push("--force-with-lease");
        }
        if opts.set_upstream {
            args.extend_from_slice(&["--set-upstream", "origin", branch]);
        } else {
            args.extend_from_slice(&["origin", branch]);
        }
        let output = run_git_guarded(&self.root, &args)?;
        if !output.status.success() {
            return Err(command_failed(&args, &output));
        }
        Ok(())
    }

    /// Fast-forward pull of the current branch.
    pub fn pull_ff(&self) -> GitResult<()> {
        self.run(&["pull", "--ff-only"]).map(drop)
    }

    /// Fetch a remote (default `origin`).
    pub fn fetch(&self, remote: Option<&str>) -> GitResult<()> {
        self.run(&["fetch", remote.unwrap_or("origin")]).map(drop)
    }

    /// `(ahead, behind)` of `branch` relative to `base`.
    pub fn ahead_behind(&self, branch: &str, base: &str) -> GitResult<(usize, usize)> {
        let range = format!("{base}...{branch}");
        let out = self.run(&["rev-list", "--left-right", "--count", &range])?;
        let mut parts = out.split_whitespace();
        let behind = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| GitError::ParseError(format!("rev-list count: {out:?}")))?;
        let ahead = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| GitError::ParseError(format!("rev-list count: {out:?}")))?;
        Ok((ahead, behind))
    }

    /// Number of commits on `branch` that are not on trunk.
    pub fn commits_since_fork(&self, branch: &str) -> GitResult<usize> {
        let trunk = self.trunk()?.to_string();
        Ok(self.ahead_behind(branch, &trunk)?.0)
    }

    /// Ahead/behind/cleanliness summary for `branch` (current when absent).
    pub fn branch_status(&self, branch: Option<&str>) -> GitResult<BranchStatus> {
        let branch = match branch {
            Some(b) => b.to_string(),
            None => self.require_current_branch()?,
        };
        let status = self.status()?;
        let has_remote = self.remote_branch_exists(&branch)?;
        let (ahead, behind) = if has_remote {
            self.ahead_behind(&branch, &format!("origin/{branch}"))?
        } else {
            (0, 0)
        };
        Ok(BranchStatus {
            ahead,
            behind,
            has_remote,
            is_clean: status.is_clean(),
            conflicted: !status.conflicted.is_empty(),
        })
    }

    /// Recent history, newest first.
    pub fn recent_log(&self, count: usize) -> GitResult<Vec<LogEntry>> {
        let n = format!("-{count}");
        let out = self.run(&["log", &n, "--format=%H%x09%s"])?;
        out.lines()
            .map(|line| {
                let (sha, subject) = line
                    .split_once('\t')
                    .ok_or_else(|| GitError::ParseError(format!("log line: {line:?}")))?;
                Ok(LogEntry {
                    sha: sha.to_string(),
                    subject: subject.to_string(),
                })
            })
            .collect()
    }

    /// Subject line of the most recent commit, if any.
    pub fn last_commit_subject(&self) -> GitResult<Option<String>> {
        let output = self.run_output(&["log", "-1", "--format=%s"])?;
        if !output.status.success() {
            // Unborn branch
            return Ok(None);
        }
        let subject = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if subject.is_empty() { Ok(None) } else { Ok(Some(subject)) }
    }

    // =========================================================================
    // Rebase and merge
    // =========================================================================

    /// Rebase the current branch onto `onto`.
    pub fn rebase(&self, onto: &str) -> GitResult<()> {
        self.run(&["rebase", onto]).map(drop)
    }

    pub fn rebase_abort(&self) -> GitResult<()> {
        self.run(&["rebase", "--abort"]).map(drop)
    }

    pub fn rebase_continue(&self) -> GitResult<()> {
        self.run(&["rebase", "--continue"]).map(drop)
    }

    /// Whether a rebase is currently in progress.
    pub fn is_rebase_in_progress(&self) -> GitResult<bool> {
        let git_dir = self.git_dir()?;
        Ok(git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists())
    }

    /// Squash-merge `branch` into the current branch as a single commit.
    pub fn squash_merge(&self, branch: &str, message: &str) -> GitResult<String> {
        self.run(&["merge", "--squash", branch])?;
        self.commit(message, CommitOptions { staged_only: true, no_verify: true })
    }

    // =========================================================================
    // Tags
    // =========================================================================

    /// Create an annotated tag.
    pub fn tag_create(&self, name: &str, message: &str) -> GitResult<()> {
        self.run(&["tag", "-a", name, "-m", message]).map(drop)
    }

    /// List tag names.
    pub fn tag_list(&self) -> GitResult<Vec<String>> {
        let out = self.run(&["tag", "--list"])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    // =========================================================================
    // Stash
    // =========================================================================

    /// Push a stash (including untracked files) with a message; returns the
    /// ref of the new entry, of form `stash@{0}`.
    pub fn stash_push(&self, message: &str) -> GitResult<String> {
        self.run(&["stash", "push", "--include-untracked", "-m", message])?;
        // The entry just pushed is always the top of the stack.
        Ok("stash@{0}".to_string())
    }

    /// Pop a specific stash entry.
    pub fn stash_pop(&self, stash_ref: &str) -> GitResult<()> {
        let output = self.run_output(&["stash", "pop", stash_ref])?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("is not a valid reference") || stderr.contains("No stash entries") {
            return Err(GitError::StashNotFound {
                stash_ref: stash_ref.to_string(),
            });
        }
        Err(command_failed(&["stash", "pop", stash_ref], &output))
    }

    /// Drop a specific stash entry.
    pub fn stash_drop(&self, stash_ref: &str) -> GitResult<()> {
        let output = self.run_output(&["stash", "drop", stash_ref])?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("is not a valid reference") || stderr.contains("No stash entries") {
            return Err(GitError::StashNotFound {
                stash_ref: stash_ref.to_string(),
            });
        }
        Err(command_failed(&["stash", "drop", stash_ref], &output))
    }

    /// List stash entries, top of stack first.
    pub fn stash_list(&self) -> GitResult<Vec<StashEntry>> {
        let out = self.run(&["stash", "list", "--format=%gd%x09%gs"])?;
        out.lines()
            .map(|line| {
                let (stash_ref, message) = line
                    .split_once('\t')
                    .ok_or_else(|| GitError::ParseError(format!("stash line: {line:?}")))?;
                Ok(StashEntry {
                    stash_ref: stash_ref.to_string(),
                    message: message.to_string(),
                })
            })
            .collect()
    }

    // =========================================================================
    // Remotes and config
    // =========================================================================

    /// URL of the primary remote (`origin`), cached. `None` when the
    /// repository has no remote.
    pub fn remote_url(&self) -> GitResult<Option<&str>> {
        self.remote_url
            .get_or_try_init(|| {
                let output = self.run_output(&["remote", "get-url", "origin"])?;
                if !output.status.success() {
                    return Ok::<_, GitError>(None);
                }
                let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
                Ok(if url.is_empty() { None } else { Some(url) })
            })
            .map(|opt| opt.as_deref())
    }

    /// Read a git config value.
    pub fn config_get(&self, key: &str) -> GitResult<Option<String>> {
        let output = self.run_output(&["config", "--get", key])?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
        ))
    }

    /// Set a git config value.
    pub fn config_set(&self, key: &str, value: &str) -> GitResult<()> {
        self.run(&["config", key, value]).map(drop)
    }
}

fn run_git_at(dir: &Path, args: &[&str]) -> GitResult<Output> {
    log::debug!("$ git {} [{}]", args.join(" "), dir.display());
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|source| GitError::SpawnFailed {
            command: format!("git {}", args.join(" ")),
            source,
        })
}

/// Like [`run_git_at`] but with the session-guard variable set, marking the
/// subprocess as tool-driven for the generated hooks.
fn run_git_guarded(dir: &Path, args: &[&str]) -> GitResult<Output> {
    log::debug!("$ git {} [{}] (guarded)", args.join(" "), dir.display());
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .env(SESSION_GUARD_ENV, "1")
        .output()
        .map_err(|source| GitError::SpawnFailed {
            command: format!("git {}", args.join(" ")),
            source,
        })
}

fn command_failed(args: &[&str], output: &Output) -> GitError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    // Some git commands print errors to stdout (e.g. `commit` with nothing
    // to commit); keep both streams, stderr first.
    let message = [stderr.trim(), stdout.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    GitError::CommandFailed {
        command: format!("git {}", args.join(" ")),
        output: message,
    }
}
