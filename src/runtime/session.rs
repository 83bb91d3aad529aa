//! Per-conversation state owned by the orchestrator

use crate::enrichment::{EnrichmentHandle, EnrichmentResult};
use crate::llm::ChatMessage;
use crate::state_machine::{ContextSnapshot, DialogueState, StateMachine};

/// Everything one conversation accumulates between resets
#[derive(Debug)]
pub struct Session {
    id: String,
    machine: StateMachine,
    history: Vec<ChatMessage>,
    state_history: Vec<DialogueState>,
    /// Single-shot guard: set the first time enrichment starts
    enrichment_requested: bool,
    enrichment: Option<EnrichmentHandle>,
    /// Set once the instructions have been spliced into a reply
    instructions_delivered: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            machine: StateMachine::new(),
            history: Vec::new(),
            state_history: Vec::new(),
            enrichment_requested: false,
            enrichment: None,
            instructions_delivered: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> DialogueState {
        self.machine.state()
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut StateMachine {
        &mut self.machine
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn state_history(&self) -> &[DialogueState] {
        &self.state_history
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.history.push(ChatMessage::user(text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.history.push(ChatMessage::assistant(text));
    }

    pub fn record_state(&mut self, state: DialogueState) {
        self.state_history.push(state);
    }

    pub fn enrichment_requested(&self) -> bool {
        self.enrichment_requested
    }

    /// Attach the session's one enrichment. Later calls are ignored.
    pub fn start_enrichment(&mut self, handle: EnrichmentHandle) -> bool {
        if self.enrichment_requested {
            tracing::warn!(session_id = %self.id, "Enrichment already requested for this session");
            return false;
        }
        self.enrichment_requested = true;
        self.enrichment = Some(handle);
        true
    }

    /// Non-blocking view of the enrichment result
    pub fn enrichment_status(&mut self) -> EnrichmentResult {
        self.enrichment
            .as_mut()
            .map_or(EnrichmentResult::Unavailable, EnrichmentHandle::poll)
    }

    pub fn instructions_delivered(&self) -> bool {
        self.instructions_delivered
    }

    pub fn mark_instructions_delivered(&mut self) {
        self.instructions_delivered = true;
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        self.machine.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_blank() {
        let mut session = Session::new();
        assert_eq!(session.state(), DialogueState::Initial);
        assert!(session.history().is_empty());
        assert!(session.state_history().is_empty());
        assert!(!session.enrichment_requested());
        assert_eq!(session.enrichment_status(), EnrichmentResult::Unavailable);
    }

    #[test]
    fn test_sessions_get_distinct_ids() {
        assert_ne!(Session::new().id(), Session::new().id());
    }

    #[test]
    fn test_enrichment_starts_once() {
        let mut session = Session::new();
        assert!(session.start_enrichment(EnrichmentHandle::ready("first")));
        assert!(!session.start_enrichment(EnrichmentHandle::ready("second")));
        assert_eq!(
            session.enrichment_status(),
            EnrichmentResult::Available("first".to_string())
        );
    }
}
