//! Turn orchestration
//!
//! One call to [`Receptionist::submit_user_turn`] runs a whole turn: render
//! the prompt, wait for rate budget, call the model (retrying transient
//! failures), interpret the reply, apply it to the state machine, and start
//! enrichment when the conversation first reaches a triggering state.

use super::session::Session;
use crate::config::RetryPolicy;
use crate::enrichment::{
    fetch_instructions, EnrichmentHandle, EnrichmentPolicy, EnrichmentResult,
    FALLBACK_INSTRUCTIONS,
};
use crate::interpreter::{interpret, Interpretation};
use crate::knowledge::KnowledgeBase;
use crate::llm::{ChatMessage, ChatRequest, ChatResponse, LlmError, LlmService};
use crate::rate_limiter::RateLimiter;
use crate::state_machine::{describe_changes, ContextSnapshot, DialogueState};
use crate::system_prompt::{PromptError, PromptInputs, PromptRenderer};
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;

/// Fixed per-request allowance on top of the message word count
pub const TOKEN_OVERHEAD: u32 = 100;

/// Reply for failures that retrying would not fix
pub const APOLOGY_REPLY: &str =
    "I'm sorry, an error occurred while processing your request. Please try again later.";

/// Reply once transient failures have used up every attempt
pub const TROUBLE_CONNECTING_REPLY: &str =
    "I'm sorry, I'm having trouble connecting right now. Please try again in a moment.";

/// Appended while deferred instructions are still being looked up
pub const PLEASE_WAIT_NOTICE: &str = "Please wait, getting emergency information in a moment.";

const EMERGENCY_TYPE_KEY: &str = "emergency_type";

#[derive(Debug, Error)]
enum TurnError {
    #[error("prompt rendering failed: {0}")]
    Prompt(#[from] PromptError),
    #[error("model call failed: {0}")]
    Upstream(LlmError),
    #[error("model call failed after {attempts} attempts: {source}")]
    RetriesExhausted { attempts: u32, source: LlmError },
}

impl TurnError {
    fn reply(&self) -> &'static str {
        match self {
            TurnError::RetriesExhausted { .. } => TROUBLE_CONNECTING_REPLY,
            TurnError::Prompt(_) | TurnError::Upstream(_) => APOLOGY_REPLY,
        }
    }
}

/// Conversation orchestrator for a single caller session
pub struct Receptionist<L, K, P>
where
    L: LlmService,
    K: KnowledgeBase + 'static,
    P: PromptRenderer,
{
    llm: L,
    knowledge: Arc<K>,
    renderer: P,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    enrichment_policy: EnrichmentPolicy,
    session: Session,
}

impl<L, K, P> Receptionist<L, K, P>
where
    L: LlmService,
    K: KnowledgeBase + 'static,
    P: PromptRenderer,
{
    pub fn new(llm: L, knowledge: Arc<K>, renderer: P, limiter: Arc<RateLimiter>) -> Self {
        Self {
            llm,
            knowledge,
            renderer,
            limiter,
            retry: RetryPolicy::default(),
            enrichment_policy: EnrichmentPolicy::default(),
            session: Session::new(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_enrichment_policy(mut self, policy: EnrichmentPolicy) -> Self {
        self.enrichment_policy = policy;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn enrichment_policy(&self) -> EnrichmentPolicy {
        self.enrichment_policy
    }

    /// Current state and collected context
    pub fn context_snapshot(&self) -> ContextSnapshot {
        self.session.snapshot()
    }

    /// Non-blocking view of this session's enrichment
    pub fn enrichment_status(&mut self) -> EnrichmentResult {
        self.session.enrichment_status()
    }

    /// Start over with a fresh session. A pending deferred lookup is
    /// abandoned; its result is dropped when it arrives.
    pub fn reset_session(&mut self) {
        let previous = self.session.id().to_string();
        self.session = Session::new();
        tracing::info!(
            previous_session = %previous,
            session_id = %self.session.id(),
            "Session reset"
        );
    }

    /// Process one caller utterance and return the receptionist's reply.
    ///
    /// Never fails: errors surface as a fixed apology in the reply, and the
    /// reply is always recorded in the conversation history.
    pub async fn submit_user_turn(&mut self, text: &str) -> String {
        let span = tracing::info_span!(
            "turn",
            session_id = %self.session.id(),
            state = %self.session.state(),
        );
        self.run_turn(text).instrument(span).await
    }

    async fn run_turn(&mut self, text: &str) -> String {
        self.session.push_user(text);

        let reply = match self.process_turn().await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "Turn failed");
                if matches!(e, TurnError::RetriesExhausted { .. }) {
                    self.force_state(DialogueState::Initial);
                }
                e.reply().to_string()
            }
        };

        self.session.push_assistant(reply.clone());
        reply
    }

    async fn process_turn(&mut self) -> Result<String, TurnError> {
        let status = self.session.enrichment_status();
        let system_prompt = self.renderer.render(&PromptInputs {
            state: self.session.state(),
            context: self.session.machine().context(),
            state_history: self.session.state_history(),
            data_available: status.is_available(),
            instructions: status.text(),
        })?;

        // History already ends with this turn's user message
        let mut messages = Vec::with_capacity(self.session.history().len() + 1);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(self.session.history().iter().cloned());
        let request = ChatRequest::new(messages);

        let tokens = self.estimate_tokens(&request);
        self.limiter.acquire(tokens).await;

        let response = self.complete_with_retry(&request).await?;
        let interpretation = interpret(&response.text);
        Ok(self.apply(interpretation).await)
    }

    /// Word count plus overhead, clamped so a single request never exceeds
    /// what the limiter can ever grant
    fn estimate_tokens(&self, request: &ChatRequest) -> u32 {
        let words = u32::try_from(request.word_count()).unwrap_or(u32::MAX);
        let estimate = words.saturating_add(TOKEN_OVERHEAD);
        let limits = self.limiter.limits();
        let ceiling = limits.tokens_per_minute.min(limits.tokens_per_day);
        if estimate > ceiling {
            tracing::warn!(estimate, ceiling, "Request estimate exceeds rate capacity, clamping");
            return ceiling;
        }
        estimate
    }

    async fn complete_with_retry(&self, request: &ChatRequest) -> Result<ChatResponse, TurnError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.llm.complete(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = %delay.as_millis(),
                        error = %e,
                        "Transient model failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    return Err(TurnError::RetriesExhausted {
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => return Err(TurnError::Upstream(e)),
            }
        }
    }

    async fn apply(&mut self, interpretation: Interpretation) -> String {
        let Interpretation {
            target_state,
            context_updates,
            mut reply_text,
            outcome,
        } = interpretation;

        tracing::debug!(?outcome, updates = context_updates.len(), "Interpreted model reply");

        self.force_state(target_state);

        if !context_updates.is_empty() {
            let changes = self.session.machine_mut().merge_context(context_updates);
            if !changes.is_empty() {
                tracing::info!("{}", describe_changes(&changes));
            }
        }

        let mut state = target_state;
        if state.triggers_enrichment() && !self.session.enrichment_requested() {
            if let Some(emergency_type) = self.emergency_type() {
                state = self.start_enrichment(emergency_type, state, &mut reply_text).await;
            }
        }

        if state == DialogueState::Intermediary {
            self.surface_deferred_result(&mut reply_text);
        }

        if state == DialogueState::Message {
            self.session.machine_mut().clear_context();
            tracing::info!("Message taken, context cleared");
        }

        reply_text
    }

    fn emergency_type(&self) -> Option<String> {
        self.session
            .machine()
            .context()
            .get(EMERGENCY_TYPE_KEY)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    /// Returns the state the turn ends in
    async fn start_enrichment(
        &mut self,
        emergency_type: String,
        state: DialogueState,
        reply_text: &mut String,
    ) -> DialogueState {
        tracing::info!(
            emergency_type = %emergency_type,
            policy = %self.enrichment_policy,
            "Starting enrichment"
        );
        match self.enrichment_policy {
            EnrichmentPolicy::Inline => {
                let instructions =
                    fetch_instructions(self.knowledge.as_ref(), &emergency_type).await;
                append_sentence(reply_text, &format!("Please follow this: {instructions}"));
                self.session.start_enrichment(EnrichmentHandle::ready(instructions));
                self.session.mark_instructions_delivered();
                self.force_state(DialogueState::Intermediary);
                DialogueState::Intermediary
            }
            EnrichmentPolicy::Deferred { delay } => {
                self.session.start_enrichment(EnrichmentHandle::spawn(
                    Arc::clone(&self.knowledge),
                    emergency_type,
                    delay,
                ));
                state
            }
        }
    }

    fn surface_deferred_result(&mut self, reply_text: &mut String) {
        if self.session.instructions_delivered() {
            return;
        }
        match self.session.enrichment_status() {
            EnrichmentResult::Available(text) => {
                append_sentence(reply_text, &format!("Please follow this: {text}"));
                self.session.mark_instructions_delivered();
            }
            EnrichmentResult::Pending => append_sentence(reply_text, PLEASE_WAIT_NOTICE),
            EnrichmentResult::Unavailable if self.session.enrichment_requested() => {
                append_sentence(reply_text, FALLBACK_INSTRUCTIONS);
                self.session.mark_instructions_delivered();
            }
            EnrichmentResult::Unavailable => {}
        }
    }

    fn force_state(&mut self, state: DialogueState) {
        let transition = self.session.machine_mut().transition(state);
        tracing::info!(from = %transition.from, to = %transition.to, "{transition}");
        self.session.record_state(state);
    }
}

fn append_sentence(reply: &mut String, sentence: &str) {
    if !reply.is_empty() && !reply.ends_with(char::is_whitespace) {
        reply.push(' ');
    }
    reply.push_str(sentence);
}
