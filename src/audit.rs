//! Append-only audit trail.
//!
//! Entries are JSONL, one object per line, grouped on disk by
//! `audit/YYYY-MM/DD.jsonl`. Appends are O(1) file appends; when the day's
//! file exceeds the size limit it is renamed to a timestamped sibling and a
//! bounded number of rotated files is retained.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils;

/// Default rotation threshold: 10 MB.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
/// Default number of rotated files retained per day.
pub const DEFAULT_MAX_ROTATIONS: usize = 10;

/// Outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AuditResult {
    Success,
    Failure,
    Aborted,
}

/// State transition recorded in an entry's details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditTransition {
    pub from: String,
    pub to: String,
}

/// Optional structured context for an entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_transition: Option<AuditTransition>,
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    pub action: String,
    pub actor: String,
    #[serde(default)]
    pub details: AuditDetails,
    pub result: AuditResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AuditEntry {
    pub fn new(action: impl Into<String>, actor: impl Into<String>, result: AuditResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: utils::now(),
            session_id: None,
            action: action.into(),
            actor: actor.into(),
            details: AuditDetails::default(),
            result,
            error_message: None,
        }
    }

    pub fn with_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_transition(mut self, from: impl ToString, to: impl ToString) -> Self {
        self.details.state_transition = Some(AuditTransition {
            from: from.to_string(),
            to: to.to_string(),
        });
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.details.command = Some(command.into());
        self
    }

    pub fn with_git_operation(mut self, op: impl Into<String>) -> Self {
        self.details.git_operation = Some(op.into());
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Handle to the audit stream rooted at `<base>/audit`.
///
/// Cheap to clone; all state lives on disk.
#[derive(Debug, Clone)]
pub struct AuditLog {
    root: PathBuf,
    max_file_bytes: u64,
    max_rotations: usize,
}

impl AuditLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_rotations: DEFAULT_MAX_ROTATIONS,
        }
    }

    pub fn with_limits(root: impl Into<PathBuf>, max_file_bytes: u64, max_rotations: usize) -> Self {
        Self {
            root: root.into(),
            max_file_bytes,
            max_rotations,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn day_path(&self, date: NaiveDate) -> PathBuf {
        self.root
            .join(date.format("%Y-%m").to_string())
            .join(format!("{}.jsonl", date.format("%d")))
    }

    /// Append one entry to the current day's stream.
    pub fn append(&self, entry: &AuditEntry) -> std::io::Result<()> {
        let date = entry.timestamp.date_naive();
        let path = self.day_path(date);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.rotate_if_needed(&path)?;

        let mut line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())
    }

    /// Best-effort append used on paths where audit failure must not mask
    /// the underlying operation.
    pub fn append_best_effort(&self, entry: &AuditEntry) {
        if let Err(e) = self.append(entry) {
            log::warn!("failed to append audit entry {}: {e}", entry.action);
        }
    }

    fn rotate_if_needed(&self, path: &Path) -> std::io::Result<()> {
        let Ok(meta) = fs::metadata(path) else {
            return Ok(());
        };
        if meta.len() < self.max_file_bytes {
            return Ok(());
        }
        let rotated = path.with_extension(format!("{}.jsonl", utils::now().timestamp()));
        fs::rename(path, &rotated)?;
        log::info!("rotated audit file to {}", rotated.display());
        self.prune_rotations(path)
    }

    /// Keep only the newest `max_rotations` rotated siblings of `path`.
    fn prune_rotations(&self, path: &Path) -> std::io::Result<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let mut rotated: Vec<PathBuf> = fs::read_dir(parent)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&format!("{stem}.")) && n.ends_with(".jsonl"))
            })
            .collect();
        // Timestamped names sort chronologically
        rotated.sort();
        while rotated.len() > self.max_rotations {
            let oldest = rotated.remove(0);
            log::info!("pruning rotated audit file {}", oldest.display());
            fs::remove_file(oldest)?;
        }
        Ok(())
    }

    /// Read a day's entries, skipping corrupt lines.
    pub fn read_day(&self, date: NaiveDate) -> std::io::Result<Vec<AuditEntry>> {
        let path = self.day_path(date);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    log::warn!("skipping corrupt audit line: {e}");
                    None
                }
            })
            .collect())
    }

    /// A day's entries for one session, in append order.
    pub fn entries_for_session(
        &self,
        date: NaiveDate,
        session_id: Uuid,
    ) -> std::io::Result<Vec<AuditEntry>> {
        Ok(self
            .read_day(date)?
            .into_iter()
            .filter(|e| e.session_id == Some(session_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn log_in(dir: &TempDir) -> AuditLog {
        AuditLog::new(dir.path().join("audit"))
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let audit = log_in(&dir);
        let entry = AuditEntry::new("workflow.launch", "devsolo", AuditResult::Success)
            .with_session(Uuid::new_v4())
            .with_transition("INIT", "BRANCH_READY");
        audit.append(&entry).unwrap();

        let read = audit.read_day(entry.timestamp.date_naive()).unwrap();
        assert_eq!(read, vec![entry]);
    }

    #[test]
    fn test_day_file_layout() {
        let dir = TempDir::new().unwrap();
        let audit = log_in(&dir);
        let entry = AuditEntry::new("x", "devsolo", AuditResult::Success);
        audit.append(&entry).unwrap();

        let month = entry.timestamp.format("%Y-%m").to_string();
        let day = format!("{}.jsonl", entry.timestamp.format("%d"));
        assert!(dir.path().join("audit").join(month).join(day).exists());
    }

    #[test]
    fn test_corrupt_lines_skipped() {
        let dir = TempDir::new().unwrap();
        let audit = log_in(&dir);
        let entry = AuditEntry::new("a", "devsolo", AuditResult::Success);
        audit.append(&entry).unwrap();

        let path = audit.day_path(entry.timestamp.date_naive());
        let mut content = fs::read_to_string(&path).unwrap();
        content.push_str("{not json\n");
        fs::write(&path, content).unwrap();
        let second = AuditEntry::new("b", "devsolo", AuditResult::Failure);
        audit.append(&second).unwrap();

        let read = audit.read_day(entry.timestamp.date_naive()).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].action, "a");
        assert_eq!(read[1].action, "b");
    }

    #[test]
    fn test_rotation() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::with_limits(dir.path().join("audit"), 64, 2);
        // Each entry is well over 64 bytes, so every append after the first
        // rotates the file.
        for i in 0..5 {
            let entry = AuditEntry::new(format!("action-{i}"), "devsolo", AuditResult::Success);
            audit.append(&entry).unwrap();
            // Distinct rotation timestamps
            std::thread::sleep(std::time::Duration::from_millis(1100));
            if i >= 2 {
                break; // three appends are enough to exercise rotation
            }
        }
        let entry = AuditEntry::new("final", "devsolo", AuditResult::Success);
        let month_dir = dir
            .path()
            .join("audit")
            .join(entry.timestamp.format("%Y-%m").to_string());
        let files = fs::read_dir(&month_dir).unwrap().count();
        assert!(files >= 2, "expected rotated files, found {files}");
    }

    #[test]
    fn test_entries_for_session() {
        let dir = TempDir::new().unwrap();
        let audit = log_in(&dir);
        let session = Uuid::new_v4();
        audit
            .append(&AuditEntry::new("a", "devsolo", AuditResult::Success).with_session(session))
            .unwrap();
        audit
            .append(&AuditEntry::new("b", "devsolo", AuditResult::Success))
            .unwrap();

        let date = utils::now().date_naive();
        let entries = audit.entries_for_session(date, session).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "a");
    }

    #[test]
    fn test_read_missing_day_is_empty() {
        let dir = TempDir::new().unwrap();
        let audit = log_in(&dir);
        let date = NaiveDate::from_ymd_opt(2001, 1, 1).unwrap();
        assert!(audit.read_day(date).unwrap().is_empty());
    }
}
