//! Durable, crash-safe session persistence.
//!
//! One JSON record per session, an index object mapping branch → session,
//! and an optional current-session pointer. Every write goes to a temporary
//! sibling first and is renamed over the target, so readers observe either
//! the prior or the new record, never a partial one. The index is rewritten
//! the same way after every session write.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditLog, AuditResult};
use crate::utils;

use super::lock::{self, SessionLock};
use super::{SessionIndex, SessionSummary, WorkflowSession};

/// Store failure.
#[derive(Debug)]
pub enum StoreError {
    Io { path: PathBuf, source: std::io::Error },
    Serialize { path: PathBuf, source: serde_json::Error },
    NotFound { id: Uuid },
    /// The per-session lock is held by a reachable process.
    LockHeld { id: Uuid, pid: Option<u32> },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io { path, source } => {
                write!(f, "session store I/O error at {}: {source}", path.display())
            }
            StoreError::Serialize { path, source } => {
                write!(f, "failed to serialize {}: {source}", path.display())
            }
            StoreError::NotFound { id } => write!(f, "session {id} not found"),
            StoreError::LockHeld { id, pid } => match pid {
                Some(pid) => write!(f, "session {id} is locked by process {pid}"),
                None => write!(f, "session {id} is locked"),
            },
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io { source, .. } => Some(source),
            StoreError::Serialize { source, .. } => Some(source),
            _ => None,
        }
    }
}

type StoreResult<T> = Result<T, StoreError>;

/// Filter for [`SessionStore::list_sessions`].
///
/// The default (`all = false`) lists *active* sessions: non-terminal and
/// non-expired. `include_expired` widens the active filter to expired
/// sessions; `all` includes terminal sessions too.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListFilter {
    pub all: bool,
    pub include_expired: bool,
}

/// Pointer to the session the user is currently working in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentPointer {
    session_id: Uuid,
}

/// Persistent session store rooted at `<base>/sessions` + `<base>/locks`.
#[derive(Debug)]
pub struct SessionStore {
    sessions_dir: PathBuf,
    locks_dir: PathBuf,
    audit: AuditLog,
}

impl SessionStore {
    /// Open (and create on first use) the store under `base`.
    ///
    /// Startup also sweeps orphaned locks, per the recovery protocol.
    pub fn open(base: &Path, audit: AuditLog) -> StoreResult<Self> {
        let sessions_dir = base.join("sessions");
        let locks_dir = base.join("locks");
        for dir in [&sessions_dir, &locks_dir] {
            fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        lock::cleanup_orphaned(&locks_dir);
        Ok(Self {
            sessions_dir,
            locks_dir,
            audit,
        })
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    fn session_path(&self, id: Uuid) -> PathBuf {
        self.sessions_dir.join(format!("{id}.json"))
    }

    fn index_path(&self) -> PathBuf {
        self.sessions_dir.join("index.json")
    }

    fn current_path(&self) -> PathBuf {
        self.sessions_dir.join("current.json")
    }

    // =========================================================================
    // Locks
    // =========================================================================

    /// Acquire the single-writer lock for a session.
    pub fn acquire_lock(&self, id: Uuid) -> StoreResult<SessionLock> {
        lock::acquire(&self.locks_dir, id)
    }

    /// Sweep orphaned locks; returns the number removed.
    pub fn cleanup_orphaned_locks(&self) -> usize {
        lock::cleanup_orphaned(&self.locks_dir)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Load one session. Corrupt records are logged and reported as absent,
    /// never deleted.
    pub fn get_session(&self, id: Uuid) -> StoreResult<Option<WorkflowSession>> {
        self.read_session_file(&self.session_path(id))
    }

    fn read_session_file(&self, path: &Path) -> StoreResult<Option<WorkflowSession>> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        match serde_json::from_str(&content) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                log::warn!("skipping corrupt session record {}: {e}", path.display());
                Ok(None)
            }
        }
    }

    /// Resolve the active session on a branch via the index.
    pub fn get_session_by_branch(&self, branch: &str) -> StoreResult<Option<WorkflowSession>> {
        let index = self.load_index()?;
        match index.branch_map.get(branch) {
            Some(id) => self.get_session(*id),
            None => Ok(None),
        }
    }

    /// Every session ever recorded for a branch, including terminal ones.
    /// Used by branch-reuse and burned-name detection.
    pub fn sessions_for_branch(&self, branch: &str) -> StoreResult<Vec<WorkflowSession>> {
        Ok(self
            .all_sessions()?
            .into_iter()
            .filter(|s| s.branch_name == branch)
            .collect())
    }

    /// List sessions per the filter. The active filter excludes terminal
    /// and expired sessions.
    pub fn list_sessions(&self, filter: ListFilter) -> StoreResult<Vec<WorkflowSession>> {
        let now = utils::now();
        let mut sessions: Vec<WorkflowSession> = self
            .all_sessions()?
            .into_iter()
            .filter(|s| {
                if filter.all {
                    return true;
                }
                if s.is_terminal() {
                    return false;
                }
                filter.include_expired || !s.is_expired(now)
            })
            .collect();
        sessions.sort_by_key(|s| std::cmp::Reverse(s.updated_at));
        Ok(sessions)
    }

    fn all_sessions(&self) -> StoreResult<Vec<WorkflowSession>> {
        let entries = fs::read_dir(&self.sessions_dir).map_err(|source| StoreError::Io {
            path: self.sessions_dir.clone(),
            source,
        })?;
        let mut sessions = Vec::new();
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !name.ends_with(".json") || name == "index.json" || name == "current.json" {
                continue;
            }
            // Skip in-flight temporary siblings
            if name.starts_with('.') || name.contains(".tmp") {
                continue;
            }
            if let Some(session) = self.read_session_file(&path)? {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Persist a session atomically and rewrite the index.
    pub fn save_session(&self, session: &WorkflowSession) -> StoreResult<()> {
        self.write_json(&self.session_path(session.id), session)?;
        self.refresh_index_for(session)
    }

    /// Load, mutate, bump `updated_at`, and persist a session.
    pub fn update_session(
        &self,
        id: Uuid,
        mutate: impl FnOnce(&mut WorkflowSession),
    ) -> StoreResult<WorkflowSession> {
        let mut session = self.get_session(id)?.ok_or(StoreError::NotFound { id })?;
        mutate(&mut session);
        session.touch(utils::now());
        self.save_session(&session)?;
        Ok(session)
    }

    /// Delete a session record, update the index, and audit the deletion.
    /// Returns false when the session did not exist.
    pub fn delete_session(&self, id: Uuid) -> StoreResult<bool> {
        let Some(session) = self.get_session(id)? else {
            return Ok(false);
        };
        let path = self.session_path(id);
        fs::remove_file(&path).map_err(|source| StoreError::Io { path, source })?;

        let mut index = self.load_index()?;
        index.sessions.retain(|s| s.id != id);
        index.branch_map.retain(|_, v| *v != id);
        self.write_json(&self.index_path(), &index)?;

        if self.current_session_id()? == Some(id) {
            self.set_current(None)?;
        }

        self.audit.append_best_effort(
            &AuditEntry::new("session.delete", "devsolo", AuditResult::Success)
                .with_session(id)
                .with_command(format!("delete {}", session.branch_name)),
        );
        Ok(true)
    }

    /// Delete sessions whose expiry has passed. Terminal sessions are left
    /// for the cleanup tool; this only collects expired ones.
    pub fn cleanup_expired_sessions(&self) -> StoreResult<usize> {
        let now = utils::now();
        let mut removed = 0;
        for session in self.all_sessions()? {
            if session.is_expired(now) && self.delete_session(session.id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    // =========================================================================
    // Index and current pointer
    // =========================================================================

    /// Load the index, tolerating a missing or corrupt file by rebuilding
    /// from the session records.
    pub fn load_index(&self) -> StoreResult<SessionIndex> {
        let path = self.index_path();
        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(index) => Ok(index),
                Err(e) => {
                    log::warn!("rebuilding corrupt session index: {e}");
                    self.rebuild_index()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.rebuild_index(),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    /// Rebuild the index from the session records on disk.
    pub fn rebuild_index(&self) -> StoreResult<SessionIndex> {
        let mut index = SessionIndex::default();
        let mut sessions = self.all_sessions()?;
        sessions.sort_by_key(|s| s.created_at);
        for session in &sessions {
            index.sessions.push(SessionSummary::from(session));
            if session.is_active() {
                index.branch_map.insert(session.branch_name.clone(), session.id);
            }
        }
        Ok(index)
    }

    fn refresh_index_for(&self, session: &WorkflowSession) -> StoreResult<()> {
        let mut index = self.load_index()?;
        index.sessions.retain(|s| s.id != session.id);
        index.sessions.push(SessionSummary::from(session));
        // An id maps from at most one branch
        index.branch_map.retain(|_, v| *v != session.id);
        if session.is_active() {
            index.branch_map.insert(session.branch_name.clone(), session.id);
        }
        self.write_json(&self.index_path(), &index)
    }

    /// Point `current.json` at a session (or clear it).
    pub fn set_current(&self, id: Option<Uuid>) -> StoreResult<()> {
        let path = self.current_path();
        match id {
            Some(session_id) => self.write_json(&path, &CurrentPointer { session_id }),
            None => match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(source) => Err(StoreError::Io { path, source }),
            },
        }
    }

    /// The current session id, if the pointer exists and parses.
    pub fn current_session_id(&self) -> StoreResult<Option<Uuid>> {
        match fs::read_to_string(self.current_path()) {
            Ok(content) => Ok(serde_json::from_str::<CurrentPointer>(&content)
                .ok()
                .map(|p| p.session_id)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                path: self.current_path(),
                source,
            }),
        }
    }

    /// Atomic write: serialize to a temporary sibling, rename over target.
    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> StoreResult<()> {
        let dir = path.parent().unwrap_or(&self.sessions_dir);
        let mut tmp = tempfile::Builder::new()
            .prefix(".tmp-")
            .tempfile_in(dir)
            .map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::to_writer_pretty(&mut tmp, value).map_err(|source| StoreError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
        tmp.persist(path).map_err(|e| StoreError::Io {
            path: path.to_path_buf(),
            source: e.error,
        })?;
        Ok(())
    }
}
