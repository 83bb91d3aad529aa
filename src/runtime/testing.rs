//! Mock implementations for testing
//!
//! These mocks enable orchestration tests without network or file I/O.

use crate::knowledge::{KnowledgeBase, KnowledgeMatch};
use crate::llm::{ChatRequest, ChatResponse, LlmError, LlmService};
use crate::system_prompt::{PromptError, PromptInputs, PromptRenderer};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

// ============================================================================
// Mock LLM Client
// ============================================================================

/// Mock LLM client that returns queued responses
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
    model_id: String,
    /// Record of all requests made
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl MockLlmClient {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful response with the given text
    pub fn queue_text(&self, text: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(ChatResponse::text(text)));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for MockLlmClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::invalid_request("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Build a structured model reply in the protocol's JSON shape
pub fn model_reply(state: &str, updates: &[(&str, &str)], response: &str) -> String {
    let updates: Map<String, Value> = updates
        .iter()
        .map(|(key, value)| ((*key).to_string(), Value::String((*value).to_string())))
        .collect();
    json!({
        "new_state": state,
        "context_updates": updates,
        "response": response,
    })
    .to_string()
}

// ============================================================================
// Mock Knowledge Base
// ============================================================================

/// Knowledge base with one canned answer that records every query
pub struct CountingKnowledge {
    instructions: Option<String>,
    queries: Mutex<Vec<String>>,
}

impl CountingKnowledge {
    pub fn with_instructions(instructions: impl Into<String>) -> Self {
        Self {
            instructions: Some(instructions.into()),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Knowledge base that never matches
    pub fn empty() -> Self {
        Self {
            instructions: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn lookup_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl KnowledgeBase for CountingKnowledge {
    async fn lookup(&self, query: &str) -> Option<KnowledgeMatch> {
        self.queries.lock().unwrap().push(query.to_string());
        self.instructions.as_ref().map(|instructions| KnowledgeMatch {
            tag: "canned".to_string(),
            instructions: instructions.clone(),
            score: 1.0,
        })
    }
}

/// Knowledge base whose lookup task dies before it can answer
pub struct PanickingKnowledge;

#[async_trait]
impl KnowledgeBase for PanickingKnowledge {
    async fn lookup(&self, _query: &str) -> Option<KnowledgeMatch> {
        panic!("instructions index unavailable")
    }
}

// ============================================================================
// Mock Prompt Renderers
// ============================================================================

/// Renders the same prompt every turn
pub struct StaticRenderer(pub &'static str);

impl PromptRenderer for StaticRenderer {
    fn render(&self, _inputs: &PromptInputs<'_>) -> Result<String, PromptError> {
        Ok(self.0.to_string())
    }
}

/// Renderer whose template is broken
pub struct FailingRenderer;

impl PromptRenderer for FailingRenderer {
    fn render(&self, _inputs: &PromptInputs<'_>) -> Result<String, PromptError> {
        Err(PromptError::Template("missing placeholder".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::{interpret, ParseOutcome};
    use crate::state_machine::DialogueState;

    #[test]
    fn test_model_reply_is_structured() {
        let reply = model_reply("LOCATION", &[("location", "Kitchen")], "On my way.");
        let interpretation = interpret(&reply);
        assert_eq!(interpretation.outcome, ParseOutcome::Structured);
        assert_eq!(interpretation.target_state, DialogueState::Location);
        assert_eq!(
            interpretation.context_updates,
            vec![("location".to_string(), "Kitchen".to_string())]
        );
        assert_eq!(interpretation.reply_text, "On my way.");
    }

    #[tokio::test]
    async fn test_mock_client_drains_queue_in_order() {
        let client = MockLlmClient::new("mock");
        client.queue_error(LlmError::server_error("boom"));
        client.queue_text("second");

        let request = ChatRequest::new(Vec::new());
        assert!(client.complete(&request).await.is_err());
        assert_eq!(client.complete(&request).await.unwrap().text, "second");
        assert!(!client.complete(&request).await.unwrap_err().is_retryable());
        assert_eq!(client.recorded_requests().len(), 3);
    }
}
