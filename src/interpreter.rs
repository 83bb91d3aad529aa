//! Validating parse of the model's structured reply
//!
//! The model is asked to answer with
//! `{"new_state": "...", "context_updates": {...}, "response": "..."}`.
//! Two fallback tiers keep the conversation alive when it does not:
//!
//! - structural: the text is not a JSON object at all. The raw text becomes
//!   the reply and the state returns to `Initial`.
//! - semantic: the object parses but a field is off. An unknown state name
//!   becomes `Initial`; a missing `response` falls back to the raw text.

use crate::state_machine::DialogueState;
use serde_json::{Map, Value};

/// How the raw reply was understood, for logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Well-formed object with a valid (or absent) state name
    Structured,
    /// Not a JSON object; raw text used verbatim
    Unparseable,
    /// Object with a state name outside the protocol
    InvalidState(String),
}

/// Normalized result of interpreting one model reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpretation {
    pub target_state: DialogueState,
    pub context_updates: Vec<(String, String)>,
    pub reply_text: String,
    pub outcome: ParseOutcome,
}

impl Interpretation {
    fn unparseable(raw: &str) -> Self {
        Self {
            target_state: DialogueState::Initial,
            context_updates: Vec::new(),
            reply_text: raw.to_string(),
            outcome: ParseOutcome::Unparseable,
        }
    }
}

/// Interpret the raw text returned by the model
pub fn interpret(raw: &str) -> Interpretation {
    let Some(object) = parse_object(raw) else {
        tracing::warn!(raw = %raw, "Model reply is not a JSON object, using raw text");
        return Interpretation::unparseable(raw);
    };

    let (target_state, outcome) = match object.get("new_state") {
        Some(Value::String(name)) => match name.parse::<DialogueState>() {
            Ok(state) => (state, ParseOutcome::Structured),
            Err(_) => {
                tracing::warn!(new_state = %name, "Unknown state from model, coercing to INITIAL");
                (DialogueState::Initial, ParseOutcome::InvalidState(name.clone()))
            }
        },
        None | Some(Value::Null) => (DialogueState::Initial, ParseOutcome::Structured),
        Some(other) => {
            tracing::warn!(new_state = %other, "Non-string state from model, coercing to INITIAL");
            (DialogueState::Initial, ParseOutcome::InvalidState(other.to_string()))
        }
    };

    let reply_text = match object.get("response") {
        Some(Value::String(text)) => text.clone(),
        _ => raw.to_string(),
    };

    let context_updates = object
        .get("context_updates")
        .and_then(Value::as_object)
        .map(flatten_updates)
        .unwrap_or_default();

    Interpretation {
        target_state,
        context_updates,
        reply_text,
        outcome,
    }
}

/// Strict parse after trimming and removing a markdown code fence
fn parse_object(raw: &str) -> Option<Map<String, Value>> {
    let candidate = strip_code_fence(raw.trim());
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Unwrap "```json\n{...}\n```" style replies; anything else is returned as-is
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return text;
    };
    // Drop the info string ("json") on the opening line
    match body.split_once('\n') {
        Some((info, content)) if !info.trim_start().starts_with('{') => content.trim(),
        _ => body.trim(),
    }
}

/// Keep scalar values as strings; drop nulls and nested structures
fn flatten_updates(updates: &Map<String, Value>) -> Vec<(String, String)> {
    updates
        .iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null | Value::Array(_) | Value::Object(_) => return None,
            };
            Some((key.clone(), text))
        })
        .collect()
}
