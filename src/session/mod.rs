//! Workflow sessions: the durable per-branch workflow record.
//!
//! A [`WorkflowSession`] represents one end-to-end unit of work on one
//! branch, from creation to a terminal state. Sessions are persisted by the
//! [`store::SessionStore`] and advanced through the typed transition tables
//! in [`state`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils;

pub mod lock;
pub mod state;
pub mod store;

pub use state::{StateError, TransitionFacts, WorkflowState, WorkflowType};
pub use store::{ListFilter, SessionStore, StoreError};

/// Sessions that have not moved in this long are expired.
pub const SESSION_TTL_DAYS: i64 = 30;

/// One recorded state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTransition {
    pub from: WorkflowState,
    pub to: WorkflowState,
    /// What caused the transition, e.g. "commit", "ci-passed", "abort".
    pub trigger: String,
    pub timestamp: DateTime<Utc>,
}

/// Pull-request linkage recorded on a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrMetadata {
    pub number: u64,
    pub url: String,
    #[serde(default)]
    pub merged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<DateTime<Utc>>,
}

/// Branch lifecycle flags recorded on a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchMetadata {
    #[serde(default)]
    pub remote_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recreated: bool,
}

/// Why an auto-stash was taken.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StashReason {
    Swap,
    Launch,
    Abort,
}

/// A weak handle to a stash entry created on behalf of this session.
///
/// The stash lives in the repository's stash stack; it may be dropped out
/// from under us, and a missing stash is never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StashMetadata {
    #[serde(rename = "ref")]
    pub stash_ref: String,
    pub reason: StashReason,
    pub created_at: DateTime<Utc>,
}

/// Free-form session metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr: Option<PrMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stash: Option<StashMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// One end-to-end unit of work on one branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSession {
    pub id: Uuid,
    pub branch_name: String,
    pub workflow_type: WorkflowType,
    pub current_state: WorkflowState,
    #[serde(default)]
    pub state_history: Vec<StateTransition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

impl WorkflowSession {
    /// Create a session in the workflow kind's initial state.
    pub fn new(branch_name: impl Into<String>, workflow_type: WorkflowType) -> Self {
        let now = utils::now();
        Self {
            id: Uuid::new_v4(),
            branch_name: branch_name.into(),
            workflow_type,
            current_state: state::initial_state(workflow_type),
            state_history: Vec::new(),
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::days(SESSION_TTL_DAYS),
            metadata: SessionMetadata::default(),
        }
    }

    /// In a terminal (absorbing) state?
    pub fn is_terminal(&self) -> bool {
        self.current_state.is_terminal()
    }

    /// Active = not terminal. Expiry is a separate dimension.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// A session that has not moved in [`SESSION_TTL_DAYS`] is expired.
    /// Expired sessions are eligible for cleanup but are not deleted
    /// mid-workflow.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// The branch name is burned: the PR merged and the remote branch was
    /// deleted. Reuse by a later session is forbidden.
    pub fn burned_branch(&self) -> bool {
        self.metadata.pr.as_ref().is_some_and(|pr| pr.merged)
            && self
                .metadata
                .branch
                .as_ref()
                .is_some_and(|b| b.remote_deleted)
    }

    /// Validate and apply a state transition, appending to the history and
    /// bumping `updated_at`/`expires_at`.
    pub fn transition_to(
        &mut self,
        to: WorkflowState,
        trigger: &str,
        facts: &TransitionFacts,
    ) -> Result<&StateTransition, StateError> {
        let from = self.current_state;
        if !state::is_valid_transition(self.workflow_type, from, to) {
            return Err(StateError::InvalidTransition {
                workflow: self.workflow_type,
                from,
                to,
            });
        }
        self.check_requirements(to, facts)?;

        let now = utils::now();
        self.state_history.push(StateTransition {
            from,
            to,
            trigger: trigger.to_string(),
            timestamp: now,
        });
        self.current_state = to;
        self.touch(now);
        Ok(self.state_history.last().expect("just pushed"))
    }

    /// Bump the freshness timestamps after any mutation.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.expires_at = now + Duration::days(SESSION_TTL_DAYS);
    }

    fn check_requirements(
        &self,
        to: WorkflowState,
        facts: &TransitionFacts,
    ) -> Result<(), StateError> {
        match to {
            WorkflowState::BranchReady | WorkflowState::HotfixReady => {
                if self.branch_name.trim().is_empty() {
                    return Err(StateError::RequirementNotMet {
                        to,
                        requirement: "branch name must be set".into(),
                    });
                }
            }
            WorkflowState::ChangesCommitted | WorkflowState::HotfixCommitted => {
                if facts.commits_ahead == Some(0) {
                    // Warning only: an empty commit range is suspicious but
                    // not a rejection.
                    log::warn!(
                        "entering {to} on {} with zero commits past the fork point",
                        self.branch_name
                    );
                }
            }
            WorkflowState::Pushed | WorkflowState::HotfixPushed => {
                if facts.has_upstream == Some(false) {
                    return Err(StateError::RequirementNotMet {
                        to,
                        requirement: "branch has no upstream".into(),
                    });
                }
            }
            WorkflowState::PrCreated => {
                if self.metadata.pr.as_ref().map(|pr| pr.number).unwrap_or(0) == 0 {
                    return Err(StateError::RequirementNotMet {
                        to,
                        requirement: "metadata.pr.number must be set".into(),
                    });
                }
            }
            WorkflowState::Rebasing => {
                if facts.rebase_in_progress == Some(true) {
                    return Err(StateError::RequirementNotMet {
                        to,
                        requirement: "a rebase is already in progress".into(),
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Session summary kept in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: Uuid,
    pub branch_name: String,
    pub workflow_type: WorkflowType,
    pub current_state: WorkflowState,
    pub updated_at: DateTime<Utc>,
}

impl From<&WorkflowSession> for SessionSummary {
    fn from(session: &WorkflowSession) -> Self {
        Self {
            id: session.id,
            branch_name: session.branch_name.clone(),
            workflow_type: session.workflow_type,
            current_state: session.current_state,
            updated_at: session.updated_at,
        }
    }
}

/// Lookup object persisted alongside the session records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIndex {
    pub sessions: Vec<SessionSummary>,
    /// branchName → sessionId for active sessions.
    pub branch_map: indexmap::IndexMap<String, Uuid>,
}
