//! Branch name availability and reuse detection.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::git::Repository;
use crate::naming;
use crate::session::{BranchMetadata, SessionStore, WorkflowSession};
use crate::utils;

/// Whether a proposed branch name is usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchAvailability {
    /// No local branch, no remote branch, no active prior session.
    Available,
    /// A local branch already exists.
    TakenLocal,
    /// A remote branch already exists.
    TakenRemote,
    /// A session is active on this branch; swap to it instead.
    ActiveSessionExists { session_id: uuid::Uuid },
    /// A prior session completed with a merged PR and a deleted remote
    /// branch; the name is permanently retired.
    Burned { suggestions: [String; 3] },
}

impl BranchAvailability {
    pub fn is_available(&self) -> bool {
        matches!(self, BranchAvailability::Available)
    }
}

/// Classification of a remote branch that exists where a prior merge is on
/// record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchReuse {
    /// A prior merged session recorded the remote branch as deleted, yet
    /// the same name has been pushed again. Fatal.
    MergedAndRecreated,
    /// A prior merged session exists but the branch was never deleted;
    /// continuing is allowed and a *new* PR is expected.
    ContinuedWork,
    /// No prior merge record for this name.
    Clean,
}

/// Validator over the repository and the session history.
pub struct BranchValidator<'a> {
    repo: &'a Repository,
    store: &'a SessionStore,
}

impl<'a> BranchValidator<'a> {
    pub fn new(repo: &'a Repository, store: &'a SessionStore) -> Self {
        Self { repo, store }
    }

    /// Decide whether `branch` is newly usable.
    ///
    /// Burned names are reported with three replacement suggestions.
    pub fn check_branch_name_availability(&self, branch: &str) -> Result<BranchAvailability> {
        if let Some(session) = self.store.get_session_by_branch(branch)? {
            if session.is_active() {
                return Ok(BranchAvailability::ActiveSessionExists { session_id: session.id });
            }
        }

        if self.branch_is_burned(branch)? {
            return Ok(BranchAvailability::Burned {
                suggestions: naming::burned_name_suggestions(branch, &utils::today()),
            });
        }

        if self.repo.branch_exists(branch)? {
            return Ok(BranchAvailability::TakenLocal);
        }
        if self.repo.remote_branch_exists(branch)? {
            return Ok(BranchAvailability::TakenRemote);
        }
        Ok(BranchAvailability::Available)
    }

    /// A name is burned once any prior session completed with a merged PR
    /// and a deleted remote branch. Irreversible.
    pub fn branch_is_burned(&self, branch: &str) -> Result<bool> {
        Ok(self
            .store
            .sessions_for_branch(branch)?
            .iter()
            .any(WorkflowSession::burned_branch))
    }

    /// Classify reuse of `branch`, given that the remote branch currently
    /// exists. `current_session` is the session driving the operation (its
    /// own record is not evidence against itself).
    pub fn detect_branch_reuse(
        &self,
        current_session: Option<&WorkflowSession>,
        branch: &str,
    ) -> Result<BranchReuse> {
        let current_id = current_session.map(|s| s.id);
        let mut merged_not_deleted = false;
        for prior in self.store.sessions_for_branch(branch)? {
            if Some(prior.id) == current_id {
                continue;
            }
            let merged = prior.metadata.pr.as_ref().is_some_and(|pr| pr.merged);
            if !merged {
                continue;
            }
            let remote_deleted = prior
                .metadata
                .branch
                .as_ref()
                .is_some_and(|b| b.remote_deleted);
            if remote_deleted {
                return Ok(BranchReuse::MergedAndRecreated);
            }
            merged_not_deleted = true;
        }
        if merged_not_deleted {
            Ok(BranchReuse::ContinuedWork)
        } else {
            Ok(BranchReuse::Clean)
        }
    }
}

/// Record that a session's remote branch was deleted.
///
/// Set unconditionally on every successful remote deletion, so reuse
/// detection never misses a deletion that happened on a failure path.
pub fn track_branch_deletion(session: &mut WorkflowSession, now: DateTime<Utc>) {
    let branch = session.metadata.branch.get_or_insert_with(BranchMetadata::default);
    branch.remote_deleted = true;
    branch.deleted_at = Some(now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::session::{PrMetadata, TransitionFacts, WorkflowState, WorkflowType};
    use tempfile::TempDir;

    fn fixture() -> (TempDir, Repository, SessionStore) {
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
        let base = dir.path().join(".devsolo");
        let store = SessionStore::open(&base, AuditLog::new(base.join("audit"))).unwrap();
        (dir, repo, store)
    }

    fn completed_merged_session(branch: &str, remote_deleted: bool) -> WorkflowSession {
        let mut s = WorkflowSession::new(branch, WorkflowType::Launch);
        s.metadata.pr = Some(PrMetadata {
            number: 1,
            url: "https://github.com/acme/widgets/pull/1".into(),
            merged: true,
            merged_at: Some(utils::now()),
        });
        if remote_deleted {
            track_branch_deletion(&mut s, utils::now());
        }
        // Drive to terminal state so the branch map releases the name
        s.transition_to(WorkflowState::Aborted, "test", &TransitionFacts::default())
            .unwrap();
        s
    }

    #[test]
    fn test_available_when_nothing_exists() {
        let (_dir, repo, store) = fixture();
        let validator = BranchValidator::new(&repo, &store);
        assert_eq!(
            validator.check_branch_name_availability("feature/new").unwrap(),
            BranchAvailability::Available
        );
    }

    #[test]
    fn test_taken_local() {
        let (_dir, repo, store) = fixture();
        repo.create_branch("feature/x", None).unwrap();
        let validator = BranchValidator::new(&repo, &store);
        assert_eq!(
            validator.check_branch_name_availability("feature/x").unwrap(),
            BranchAvailability::TakenLocal
        );
    }

    #[test]
    fn test_active_session_exists() {
        let (_dir, repo, store) = fixture();
        let session = WorkflowSession::new("feature/x", WorkflowType::Launch);
        store.save_session(&session).unwrap();
        let validator = BranchValidator::new(&repo, &store);
        assert_eq!(
            validator.check_branch_name_availability("feature/x").unwrap(),
            BranchAvailability::ActiveSessionExists { session_id: session.id }
        );
    }

    #[test]
    fn test_burned_name_with_suggestions() {
        let (_dir, repo, store) = fixture();
        store
            .save_session(&completed_merged_session("feature/add-user-auth", true))
            .unwrap();

        let validator = BranchValidator::new(&repo, &store);
        match validator
            .check_branch_name_availability("feature/add-user-auth")
            .unwrap()
        {
            BranchAvailability::Burned { suggestions } => {
                assert_eq!(suggestions[0], "feature/add-user-auth-v2");
                assert!(suggestions[1].starts_with("feature/add-user-auth-2"));
                assert_eq!(suggestions[2], "feature/add-user-auth-continued");
            }
            other => panic!("expected Burned, got {other:?}"),
        }
    }

    #[test]
    fn test_merged_but_not_deleted_is_not_burned() {
        let (_dir, repo, store) = fixture();
        store
            .save_session(&completed_merged_session("feature/x", false))
            .unwrap();
        let validator = BranchValidator::new(&repo, &store);
        assert!(!validator.branch_is_burned("feature/x").unwrap());
    }

    #[test]
    fn test_detect_reuse_merged_and_recreated() {
        let (_dir, repo, store) = fixture();
        store
            .save_session(&completed_merged_session("feature/x", true))
            .unwrap();
        let validator = BranchValidator::new(&repo, &store);
        assert_eq!(
            validator.detect_branch_reuse(None, "feature/x").unwrap(),
            BranchReuse::MergedAndRecreated
        );
    }

    #[test]
    fn test_detect_reuse_continued_work() {
        let (_dir, repo, store) = fixture();
        store
            .save_session(&completed_merged_session("feature/x", false))
            .unwrap();
        let validator = BranchValidator::new(&repo, &store);
        assert_eq!(
            validator.detect_branch_reuse(None, "feature/x").unwrap(),
            BranchReuse::ContinuedWork
        );
    }

    #[test]
    fn test_detect_reuse_clean_ignores_current_session() {
        let (_dir, repo, store) = fixture();
        let current = WorkflowSession::new("feature/x", WorkflowType::Launch);
        store.save_session(&current).unwrap();
        let validator = BranchValidator::new(&repo, &store);
        assert_eq!(
            validator
                .detect_branch_reuse(Some(&current), "feature/x")
                .unwrap(),
            BranchReuse::Clean
        );
    }

    #[test]
    fn test_track_branch_deletion() {
        let mut session = WorkflowSession::new("feature/x", WorkflowType::Launch);
        let now = utils::now();
        track_branch_deletion(&mut session, now);
        let branch = session.metadata.branch.as_ref().unwrap();
        assert!(branch.remote_deleted);
        assert_eq!(branch.deleted_at, Some(now));
    }
}
