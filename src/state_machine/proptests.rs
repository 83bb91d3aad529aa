//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::*;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_state() -> impl Strategy<Value = DialogueState> {
    prop::sample::select(DialogueState::ALL.to_vec())
}

fn arb_key() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("emergency_type".to_string()),
        Just("location".to_string()),
        Just("message".to_string()),
        "[a-z_]{1,12}",
    ]
}

fn arb_updates() -> impl Strategy<Value = Vec<(String, String)>> {
    proptest::collection::vec((arb_key(), "[a-zA-Z0-9 ]{0,20}"), 0..8)
}

/// Updates whose keys are pairwise distinct
fn arb_disjoint_updates() -> impl Strategy<Value = Vec<(String, String)>> {
    proptest::collection::btree_map("[a-z_]{1,12}", "[a-zA-Z0-9 ]{0,20}", 0..8)
        .prop_map(|m| m.into_iter().collect())
}

fn sorted(ctx: &ConversationContext) -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = ctx
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    entries.sort();
    entries
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Invariant 1: No forbidden transitions
    #[test]
    fn prop_transition_always_lands(states in proptest::collection::vec(arb_state(), 1..30)) {
        let mut machine = StateMachine::new();
        for state in states {
            let before = machine.state();
            let record = machine.transition(state);
            prop_assert_eq!(machine.state(), state);
            prop_assert_eq!(record.from, before);
            prop_assert_eq!(record.to, state);
        }
    }

    // Invariant 2: Merging the same updates twice changes nothing the second time
    #[test]
    fn prop_merge_idempotent(updates in arb_updates()) {
        let mut machine = StateMachine::new();
        machine.merge_context(updates.clone());
        let once = machine.context().clone();

        machine.merge_context(updates);
        prop_assert_eq!(machine.context(), &once);
    }

    // Invariant 3: Disjoint keys merge to the same content in any order
    #[test]
    fn prop_merge_order_independent_for_disjoint_keys(updates in arb_disjoint_updates()) {
        let mut forward = StateMachine::new();
        forward.merge_context(updates.clone());

        let mut backward = StateMachine::new();
        backward.merge_context(updates.into_iter().rev());

        prop_assert_eq!(sorted(forward.context()), sorted(backward.context()));
    }

    // Invariant 4: Transitions never touch the context
    #[test]
    fn prop_transition_preserves_context(
        updates in arb_updates(),
        states in proptest::collection::vec(arb_state(), 0..10),
    ) {
        let mut machine = StateMachine::new();
        machine.merge_context(updates);
        let before = machine.context().clone();
        for state in states {
            machine.transition(state);
        }
        prop_assert_eq!(machine.context(), &before);
    }

    // Invariant 5: Reset always yields the initial snapshot
    #[test]
    fn prop_reset_is_total(updates in arb_updates(), state in arb_state()) {
        let mut machine = StateMachine::new();
        machine.transition(state);
        machine.merge_context(updates);
        machine.reset();
        prop_assert_eq!(machine.state(), DialogueState::Initial);
        prop_assert!(machine.context().is_empty());
    }
}
