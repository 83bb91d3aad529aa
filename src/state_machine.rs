//! Dialogue state machine
//!
//! Holds the current intake state and the context map collected so far.

mod context;
mod state;
mod transition;

#[cfg(test)]
mod proptests;

pub use context::{ContextChange, ConversationContext};
pub use state::{DialogueState, UnknownState};
pub use transition::{describe_changes, ContextSnapshot, StateMachine, StateTransition};
