//! Cross-cutting properties: state-machine safety, audit completeness,
//! and index consistency, observed through the real tools.

mod common;

use common::{call, initialized_runtime, scratch_with_remote, write_file};

use devsolo::session::state::{is_valid_transition, transition_table};
use devsolo::session::{ListFilter, WorkflowState, WorkflowType};
use devsolo::utils;
use serde_json::json;

/// Every persisted state sequence is made of declared transitions with
/// non-decreasing timestamps; terminal states have no outgoing entries.
#[test]
fn state_history_only_contains_declared_transitions() {
    let scratch = scratch_with_remote();
    let rt = initialized_runtime(&scratch);

    call(&rt, "workflow.launch", json!({ "branchName": "feature/a" }));
    write_file(&scratch, "a.txt", "a\n");
    call(&rt, "workflow.commit", json!({ "message": "feat: a" }));
    let shipped = call(&rt, "workflow.ship", json!({ "createPR": false }));
    assert!(shipped.success);
    let aborted = call(&rt, "workflow.abort", json!({}));
    assert!(aborted.success);

    for session in rt
        .store()
        .list_sessions(ListFilter { all: true, include_expired: true })
        .unwrap()
    {
        for window in session.state_history.windows(2) {
            assert_eq!(window[0].to, window[1].from, "history must chain");
            assert!(window[0].timestamp <= window[1].timestamp);
        }
        for transition in &session.state_history {
            assert!(
                is_valid_transition(session.workflow_type, transition.from, transition.to),
                "{:?}: {} -> {}",
                session.workflow_type,
                transition.from,
                transition.to
            );
            assert!(!transition.from.is_terminal(), "terminal states are absorbing");
        }
    }
}

/// Every state transition persisted in a session's history has a matching
/// audit entry with the same from/to.
#[test]
fn audit_trail_matches_state_history() {
    let scratch = scratch_with_remote();
    let rt = initialized_runtime(&scratch);

    call(&rt, "workflow.launch", json!({ "branchName": "feature/audited" }));
    write_file(&scratch, "a.txt", "a\n");
    call(&rt, "workflow.commit", json!({ "message": "feat: audited" }));
    let result = call(&rt, "workflow.abort", json!({}));
    let session_id = result.session_id.unwrap();

    let session = rt.store().get_session(session_id).unwrap().unwrap();
    assert!(!session.state_history.is_empty());

    let entries = rt
        .audit()
        .entries_for_session(utils::now().date_naive(), session_id)
        .unwrap();
    for transition in &session.state_history {
        let matched = entries.iter().any(|entry| {
            entry
                .details
                .state_transition
                .as_ref()
                .is_some_and(|t| {
                    t.from == transition.from.to_string() && t.to == transition.to.to_string()
                })
        });
        assert!(
            matched,
            "no audit entry for {} -> {}",
            transition.from, transition.to
        );
    }
}

/// After any successful session write, the branch index resolves the
/// session again.
#[test]
fn index_consistency_through_tool_writes() {
    let scratch = scratch_with_remote();
    let rt = initialized_runtime(&scratch);

    let result = call(&rt, "workflow.launch", json!({ "branchName": "feature/indexed" }));
    let id = result.session_id.unwrap();
    let by_branch = rt.store().get_session_by_branch("feature/indexed").unwrap().unwrap();
    assert_eq!(by_branch.id, id);

    write_file(&scratch, "i.txt", "i\n");
    call(&rt, "workflow.commit", json!({ "message": "feat: indexed" }));
    let by_branch = rt.store().get_session_by_branch("feature/indexed").unwrap().unwrap();
    assert_eq!(by_branch.id, id);
    assert_eq!(by_branch.current_state, WorkflowState::ChangesCommitted);

    // Terminal sessions leave the branch map but keep their record
    call(&rt, "workflow.abort", json!({}));
    assert!(rt.store().get_session_by_branch("feature/indexed").unwrap().is_none());
    assert!(rt.store().get_session(id).unwrap().is_some());
}

/// The declared tables contain no transition out of a terminal state, for
/// any workflow kind.
#[test]
fn transition_tables_respect_terminal_states() {
    for kind in [WorkflowType::Launch, WorkflowType::Ship, WorkflowType::Hotfix] {
        for (from, _to) in transition_table(kind) {
            assert!(!from.is_terminal(), "{kind}: table leaves terminal {from}");
        }
    }
}

/// One branch, one active session: a second launch on the same name is
/// rejected while the first is active.
#[test]
fn single_active_session_per_branch() {
    let scratch = scratch_with_remote();
    let rt = initialized_runtime(&scratch);

    call(&rt, "workflow.launch", json!({ "branchName": "feature/solo" }));
    common::git(&scratch.work, &["checkout", "main"]);

    let result = call(&rt, "workflow.launch", json!({ "branchName": "feature/solo" }));
    assert!(!result.success);
    let check = result
        .pre_flight_checks
        .iter()
        .find(|c| c.id == "branchNameAvailable")
        .unwrap();
    assert!(!check.passed());
    assert!(check.message.contains("active session"), "message: {}", check.message);
}
