//! Per-session lock files.
//!
//! A lock is a file named `<session-id>.lock` containing the owning process
//! id. Acquire creates it exclusively; an existing lock is probed and stolen
//! when its owner is unreachable. Release is best-effort unlink.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use uuid::Uuid;

use super::store::StoreError;

/// Locks older than this with an unreachable owner are orphans.
pub const ORPHAN_LOCK_AGE: Duration = Duration::from_secs(60 * 60);

/// Held lock on one session. Released (unlinked) on drop.
#[derive(Debug)]
pub struct SessionLock {
    path: PathBuf,
    id: Uuid,
}

impl SessionLock {
    pub fn session_id(&self) -> Uuid {
        self.id
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("failed to release lock {}: {e}", self.path.display());
            }
        }
    }
}

/// Acquire the lock for `id`, stealing it from an unreachable owner.
pub fn acquire(locks_dir: &Path, id: Uuid) -> Result<SessionLock, StoreError> {
    fs::create_dir_all(locks_dir).map_err(|source| StoreError::Io {
        path: locks_dir.to_path_buf(),
        source,
    })?;
    let path = lock_path(locks_dir, id);
    let pid = std::process::id();

    match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(mut file) => {
            write!(file, "{pid}").map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            Ok(SessionLock { path, id })
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            let owner = read_owner(&path);
            match owner {
                Some(owner_pid) if owner_pid == pid => {
                    // Re-entry from the same process; per-session operations
                    // are serialized above this layer.
                    Err(StoreError::LockHeld { id, pid: Some(owner_pid) })
                }
                Some(owner_pid) if process_alive(owner_pid) => {
                    Err(StoreError::LockHeld { id, pid: Some(owner_pid) })
                }
                _ => {
                    log::info!(
                        "stealing orphaned lock {} (owner {:?} unreachable)",
                        path.display(),
                        owner
                    );
                    let mut file = fs::OpenOptions::new()
                        .write(true)
                        .truncate(true)
                        .open(&path)
                        .map_err(|source| StoreError::Io { path: path.clone(), source })?;
                    write!(file, "{pid}").map_err(|source| StoreError::Io {
                        path: path.clone(),
                        source,
                    })?;
                    Ok(SessionLock { path, id })
                }
            }
        }
        Err(source) => Err(StoreError::Io { path, source }),
    }
}

/// Remove locks older than [`ORPHAN_LOCK_AGE`] whose owner is unreachable.
/// Returns the number removed.
pub fn cleanup_orphaned(locks_dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(locks_dir) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("lock") {
            continue;
        }
        let old_enough = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.elapsed().ok())
            .is_some_and(|age| age >= ORPHAN_LOCK_AGE);
        if !old_enough {
            continue;
        }
        let owner_alive = read_owner(&path).is_some_and(process_alive);
        if owner_alive {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                log::info!("removed orphaned lock {}", path.display());
                removed += 1;
            }
            Err(e) => log::warn!("failed to remove orphaned lock {}: {e}", path.display()),
        }
    }
    removed
}

pub fn lock_path(locks_dir: &Path, id: Uuid) -> PathBuf {
    locks_dir.join(format!("{id}.lock"))
}

fn read_owner(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Probe whether a process id is reachable.
#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // Signal 0 performs the permission/existence check without delivering
    // anything. EPERM still means the process exists.
    match nix::sys::signal::kill(nix::unistd::Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    // Without a portable probe, assume alive; the age threshold in
    // cleanup_orphaned still reclaims stale locks eventually.
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_writes_pid_and_releases_on_drop() {
        let dir = TempDir::new().unwrap();
        let id = Uuid::new_v4();
        let lock = acquire(dir.path(), id).unwrap();
        let path = lock_path(dir.path(), id);
        assert!(path.exists());
        assert_eq!(read_owner(&path), Some(std::process::id()));
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn test_contention_with_live_owner_fails() {
        let dir = TempDir::new().unwrap();
        let id = Uuid::new_v4();
        let _held = acquire(dir.path(), id).unwrap();
        let err = acquire(dir.path(), id).unwrap_err();
        assert!(matches!(err, StoreError::LockHeld { .. }));
    }

    #[test]
    fn test_steal_from_dead_owner() {
        let dir = TempDir::new().unwrap();
        let id = Uuid::new_v4();
        let path = lock_path(dir.path(), id);
        // Pid far beyond any plausible live process
        fs::write(&path, "999999999").unwrap();

        let lock = acquire(dir.path(), id).unwrap();
        assert_eq!(read_owner(&path), Some(std::process::id()));
        drop(lock);
    }

    #[test]
    fn test_steal_from_garbage_content() {
        let dir = TempDir::new().unwrap();
        let id = Uuid::new_v4();
        fs::write(lock_path(dir.path(), id), "not-a-pid").unwrap();
        assert!(acquire(dir.path(), id).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_cleanup_orphaned_respects_age() {
        let dir = TempDir::new().unwrap();
        let id = Uuid::new_v4();
        // Fresh lock with a dead owner: too young to collect
        fs::write(lock_path(dir.path(), id), "999999999").unwrap();
        assert_eq!(cleanup_orphaned(dir.path()), 0);
    }

    #[test]
    fn test_process_alive_self() {
        assert!(process_alive(std::process::id()));
    }
}
