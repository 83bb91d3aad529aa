//! System prompt construction for the intake protocol
//!
//! The prompt describes the protocol, pins the JSON reply schema the
//! interpreter expects, and injects the live session state: current state,
//! collected context, the states visited so far, and any instructions the
//! knowledge lookup has produced.

use crate::state_machine::{ConversationContext, DialogueState};
use std::fmt::Write;
use thiserror::Error;

/// Base system prompt establishing the receptionist's role
const BASE_PROMPT: &str = r#"You are the AI receptionist for Dr. Adrin. Callers either have a medical emergency or want to leave a message for the doctor.

Follow this protocol:
1. INITIAL: find out whether the caller has an emergency or wants to leave a message. If unclear, ask.
2. EMERGENCY: ask what the emergency is and record it as `emergency_type`.
3. LOCATION: ask where the caller is. Once you have it, record `location` and tell them Dr. Adrin is on the way with an estimated arrival time.
4. INTERMEDIARY: while help is on the way, relay the handling instructions when they are available and keep the caller calm.
5. MESSAGE: take down the caller's message, record it as `message`, and confirm it will be forwarded to Dr. Adrin.
6. FINAL: close the call politely; offer further help.

Keep replies short and calm. Ask one question at a time."#;

/// Reply format the interpreter parses
const RESPONSE_FORMAT: &str = r#"Always respond with a single valid JSON object and nothing else:
{
    "new_state": "INITIAL|EMERGENCY|MESSAGE|LOCATION|INTERMEDIARY|FINAL",
    "context_updates": {
        "emergency_type": "string (if applicable)",
        "location": "string (if applicable)",
        "message": "string (if applicable)"
    },
    "response": "Your response to the caller."
}"#;

/// Everything the renderer may draw on for one turn
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub state: DialogueState,
    pub context: &'a ConversationContext,
    pub state_history: &'a [DialogueState],
    pub data_available: bool,
    pub instructions: Option<&'a str>,
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template error: {0}")]
    Template(String),
}

/// Prompt-render collaborator
pub trait PromptRenderer: Send + Sync {
    fn render(&self, inputs: &PromptInputs<'_>) -> Result<String, PromptError>;
}

impl<T: PromptRenderer + ?Sized> PromptRenderer for std::sync::Arc<T> {
    fn render(&self, inputs: &PromptInputs<'_>) -> Result<String, PromptError> {
        (**self).render(inputs)
    }
}

/// Built-in renderer for the intake protocol
#[derive(Debug, Clone, Default)]
pub struct ProtocolPromptRenderer;

impl PromptRenderer for ProtocolPromptRenderer {
    fn render(&self, inputs: &PromptInputs<'_>) -> Result<String, PromptError> {
        Ok(build_system_prompt(inputs))
    }
}

/// Build the complete system prompt for a turn.
pub fn build_system_prompt(inputs: &PromptInputs<'_>) -> String {
    let mut prompt = String::from(BASE_PROMPT);

    prompt.push_str("\n\n<session>\n");
    let _ = writeln!(prompt, "Current state: {}", inputs.state);

    if inputs.context.is_empty() {
        prompt.push_str("Known context: none yet\n");
    } else {
        prompt.push_str("Known context:\n");
        for (key, value) in inputs.context.iter() {
            let _ = writeln!(prompt, "- {key}: {value}");
        }
    }

    if !inputs.state_history.is_empty() {
        let visited: Vec<&str> = inputs.state_history.iter().map(|s| s.name()).collect();
        let _ = writeln!(prompt, "States so far: {}", visited.join(" -> "));
    }
    prompt.push_str("</session>");

    match (inputs.data_available, inputs.instructions) {
        (true, Some(instructions)) => {
            prompt.push_str("\n\n<instructions>\n");
            prompt.push_str("Handling instructions for this emergency are available. Relay them to the caller when in INTERMEDIARY:\n");
            prompt.push_str(instructions);
            if !instructions.ends_with('\n') {
                prompt.push('\n');
            }
            prompt.push_str("</instructions>");
        }
        _ => {
            prompt.push_str("\n\nHandling instructions are not available yet. Do not invent medical instructions.");
        }
    }

    prompt.push_str("\n\n");
    prompt.push_str(RESPONSE_FORMAT);
    prompt
}
