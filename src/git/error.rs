//! Git error types.

use std::path::PathBuf;

#[derive(Debug)]
pub enum GitError {
    /// A git command exited non-zero. Carries the command line and the
    /// original stderr (or stdout, for commands that report errors there).
    CommandFailed { command: String, output: String },
    /// The command could not be spawned at all.
    SpawnFailed { command: String, source: std::io::Error },
    /// The path is not inside a git repository.
    NotARepository { path: PathBuf },
    /// HEAD is not on a branch.
    DetachedHead,
    /// Output from git could not be parsed.
    ParseError(String),
    /// A named stash ref was not found in the stash stack.
    StashNotFound { stash_ref: String },
}

impl std::fmt::Display for GitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitError::CommandFailed { command, output } => {
                if output.is_empty() {
                    write!(f, "{command} failed")
                } else {
                    write!(f, "{command} failed: {output}")
                }
            }
            GitError::SpawnFailed { command, source } => {
                write!(f, "failed to execute {command}: {source}")
            }
            GitError::NotARepository { path } => {
                write!(f, "not a git repository: {}", path.display())
            }
            GitError::DetachedHead => write!(f, "not on a branch (detached HEAD)"),
            GitError::ParseError(msg) => write!(f, "failed to parse git output: {msg}"),
            GitError::StashNotFound { stash_ref } => {
                write!(f, "stash {stash_ref} not found")
            }
        }
    }
}

impl std::error::Error for GitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GitError::SpawnFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
