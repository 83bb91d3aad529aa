//! Receptionist - LLM-driven intake for Dr. Adrin's practice
//!
//! Callers either report an emergency or leave a message. Each turn is
//! rendered into a prompt, sent to a chat-completions model under a token
//! budget, and the model's structured reply drives a small dialogue state
//! machine. Handling instructions for the reported emergency are looked up
//! in a local knowledge base once per session.

pub mod config;
pub mod enrichment;
pub mod interpreter;
pub mod knowledge;
pub mod llm;
pub mod rate_limiter;
pub mod runtime;
pub mod state_machine;
pub mod system_prompt;
