//! Dialogue states of the intake protocol

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Where the caller is in the intake protocol
///
/// Any state may follow any other; the model decides, the interpreter
/// validates the name, and the machine applies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DialogueState {
    /// Start of the call: emergency or message?
    #[default]
    Initial,
    /// An emergency was reported, details being collected
    Emergency,
    /// Caller wants to leave a message
    Message,
    /// Collecting the caller's location
    Location,
    /// Help is on the way, instructions being relayed
    Intermediary,
    /// Wrap-up
    Final,
}

impl DialogueState {
    pub const ALL: [DialogueState; 6] = [
        DialogueState::Initial,
        DialogueState::Emergency,
        DialogueState::Message,
        DialogueState::Location,
        DialogueState::Intermediary,
        DialogueState::Final,
    ];

    /// Upper-case name used on the wire and in logs
    pub fn name(self) -> &'static str {
        match self {
            DialogueState::Initial => "INITIAL",
            DialogueState::Emergency => "EMERGENCY",
            DialogueState::Message => "MESSAGE",
            DialogueState::Location => "LOCATION",
            DialogueState::Intermediary => "INTERMEDIARY",
            DialogueState::Final => "FINAL",
        }
    }

    /// States whose entry may start the knowledge lookup
    pub fn triggers_enrichment(self) -> bool {
        matches!(self, DialogueState::Location | DialogueState::Emergency)
    }
}

impl fmt::Display for DialogueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown dialogue state: {0:?}")]
pub struct UnknownState(pub String);

impl FromStr for DialogueState {
    type Err = UnknownState;

    /// Case-insensitive; surrounding whitespace is ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|state| state.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}
