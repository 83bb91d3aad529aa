//! State holder and its transitions
//!
//! The machine is permissive: every transition is applied. Validity of the
//! requested state name is enforced upstream by the response interpreter.

use super::{ContextChange, ConversationContext, DialogueState};
use serde::Serialize;
use std::fmt;

/// Record of a state change, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: DialogueState,
    pub to: DialogueState,
}

impl fmt::Display for StateTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "State transitioned from {} to {}", self.from, self.to)
    }
}

/// Point-in-time view handed to the delivery layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextSnapshot {
    pub state: DialogueState,
    pub context: ConversationContext,
}

/// Current dialogue state plus the facts collected so far
#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    current: DialogueState,
    context: ConversationContext,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DialogueState {
        self.current
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    /// Overwrite the current state unconditionally
    pub fn transition(&mut self, new_state: DialogueState) -> StateTransition {
        let from = std::mem::replace(&mut self.current, new_state);
        StateTransition {
            from,
            to: new_state,
        }
    }

    /// Apply each update in order, returning what changed
    pub fn merge_context<I, K, V>(&mut self, updates: I) -> Vec<ContextChange>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        updates
            .into_iter()
            .map(|(key, value)| {
                let key = key.into();
                let new = value.into();
                let old = self.context.insert(key.clone(), new.clone());
                ContextChange { key, old, new }
            })
            .collect()
    }

    pub fn clear_context(&mut self) {
        self.context.clear();
    }

    /// Back to `Initial` with no context, for a new session
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            state: self.current,
            context: self.context.clone(),
        }
    }
}

/// Join a change log into a single log line
pub fn describe_changes(changes: &[ContextChange]) -> String {
    let parts: Vec<String> = changes.iter().map(ToString::to_string).collect();
    format!("Context updated: {}", parts.join(", "))
}
