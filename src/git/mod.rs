//! Git operations and repository management.
//!
//! A thin typed surface over the local `git` binary. Commands are executed
//! via [`std::process::Command`] with captured output - never through a
//! shell - and failures preserve the original git stderr.

use serde::Serialize;

mod error;
mod repository;
mod url;

pub use error::GitError;
pub use repository::{CommitOptions, PushOptions, Repository};
pub use url::{GitRemoteUrl, parse_owner_repo};

/// Result alias for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// Ahead/behind/cleanliness summary for a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchStatus {
    pub ahead: usize,
    pub behind: usize,
    pub has_remote: bool,
    pub is_clean: bool,
    pub conflicted: bool,
}

/// One entry in the repository stash stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StashEntry {
    /// Opaque ref of form `stash@{N}`.
    pub stash_ref: String,
    pub message: String,
}

/// One line of `git log --oneline`-shaped history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub sha: String,
    pub subject: String,
}

/// Working-tree change summary from `git status --porcelain`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingTreeStatus {
    pub staged: Vec<String>,
    pub unstaged: Vec<String>,
    pub untracked: Vec<String>,
    pub conflicted: Vec<String>,
}

impl WorkingTreeStatus {
    /// True when there is nothing staged, modified, or untracked.
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty()
            && self.unstaged.is_empty()
            && self.untracked.is_empty()
            && self.conflicted.is_empty()
    }

    /// True when anything at all would be picked up by `git add -A`.
    pub fn has_changes(&self) -> bool {
        !self.is_clean()
    }

    /// All paths with any kind of change.
    pub fn all_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .staged
            .iter()
            .chain(&self.unstaged)
            .chain(&self.untracked)
            .chain(&self.conflicted)
            .cloned()
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }
}
