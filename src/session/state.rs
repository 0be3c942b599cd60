//! Workflow state machine.
//!
//! Three workflow kinds, each with a fixed transition table. Absent tuples
//! are invalid transitions. Terminal states are absorbing.

use serde::{Deserialize, Serialize};

/// Workflow kind; determines the applicable transition table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    schemars::JsonSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WorkflowType {
    Launch,
    Ship,
    Hotfix,
}

/// All session states across the three workflow kinds.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    schemars::JsonSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    Init,
    BranchReady,
    ChangesCommitted,
    Pushed,
    PrCreated,
    WaitingApproval,
    Rebasing,
    Merging,
    Cleanup,
    Complete,
    HotfixInit,
    HotfixReady,
    HotfixCommitted,
    HotfixPushed,
    HotfixValidated,
    HotfixDeployed,
    HotfixCleanup,
    HotfixComplete,
    Aborted,
}

impl WorkflowState {
    /// Terminal states are absorbing: no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowState::Complete | WorkflowState::HotfixComplete | WorkflowState::Aborted
        )
    }
}

use WorkflowState::*;

const LAUNCH_TRANSITIONS: &[(WorkflowState, WorkflowState)] = &[
    (Init, BranchReady),
    (BranchReady, ChangesCommitted),
    (ChangesCommitted, Pushed),
    (Pushed, PrCreated),
    (PrCreated, WaitingApproval),
    (WaitingApproval, Complete),
];

const SHIP_TRANSITIONS: &[(WorkflowState, WorkflowState)] = &[
    (Init, ChangesCommitted),
    // Changes already committed at session start: straight to PUSHED.
    (Init, Pushed),
    (ChangesCommitted, Pushed),
    (Pushed, PrCreated),
    (PrCreated, WaitingApproval),
    (WaitingApproval, Rebasing),
    (Rebasing, Merging),
    (Merging, Cleanup),
    (Cleanup, Complete),
];

const HOTFIX_TRANSITIONS: &[(WorkflowState, WorkflowState)] = &[
    (HotfixInit, HotfixReady),
    (HotfixReady, HotfixCommitted),
    (HotfixCommitted, HotfixPushed),
    (HotfixPushed, HotfixValidated),
    (HotfixValidated, HotfixDeployed),
    (HotfixDeployed, HotfixCleanup),
    (HotfixCleanup, HotfixComplete),
];

/// The transition table for a workflow kind (without the implicit
/// non-terminal → ABORTED tuples).
pub fn transition_table(kind: WorkflowType) -> &'static [(WorkflowState, WorkflowState)] {
    match kind {
        WorkflowType::Launch => LAUNCH_TRANSITIONS,
        WorkflowType::Ship => SHIP_TRANSITIONS,
        WorkflowType::Hotfix => HOTFIX_TRANSITIONS,
    }
}

/// The initial state for a workflow kind.
pub fn initial_state(kind: WorkflowType) -> WorkflowState {
    match kind {
        WorkflowType::Launch | WorkflowType::Ship => Init,
        WorkflowType::Hotfix => HotfixInit,
    }
}

/// Whether `from → to` is a declared transition for `kind`.
///
/// Every non-terminal state may transition to ABORTED.
pub fn is_valid_transition(kind: WorkflowType, from: WorkflowState, to: WorkflowState) -> bool {
    if from.is_terminal() {
        return false;
    }
    if to == Aborted {
        return true;
    }
    transition_table(kind).contains(&(from, to))
}

/// States reachable in one step from `from`.
pub fn valid_targets(kind: WorkflowType, from: WorkflowState) -> Vec<WorkflowState> {
    if from.is_terminal() {
        return Vec::new();
    }
    let mut targets: Vec<WorkflowState> = transition_table(kind)
        .iter()
        .filter(|(f, _)| *f == from)
        .map(|(_, t)| *t)
        .collect();
    targets.push(Aborted);
    targets
}

/// Externally observed facts consulted by transition requirements.
///
/// `None` means the fact was not observed; only observed facts are enforced.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionFacts {
    /// Branch has an upstream (required for PUSHED).
    pub has_upstream: Option<bool>,
    /// A rebase is already in progress (forbidden for REBASING).
    pub rebase_in_progress: Option<bool>,
    /// Commits newer than the fork point (warning only if zero, for
    /// CHANGES_COMMITTED).
    pub commits_ahead: Option<usize>,
}

/// State machine rejection.
#[derive(Debug)]
pub enum StateError {
    InvalidTransition {
        workflow: WorkflowType,
        from: WorkflowState,
        to: WorkflowState,
    },
    RequirementNotMet {
        to: WorkflowState,
        requirement: String,
    },
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateError::InvalidTransition { workflow, from, to } => {
                write!(f, "invalid {workflow} transition {from} -> {to}")
            }
            StateError::RequirementNotMet { to, requirement } => {
                write!(f, "cannot enter {to}: {requirement}")
            }
        }
    }
}

impl std::error::Error for StateError {}
