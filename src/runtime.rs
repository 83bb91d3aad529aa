//! Runtime for receptionist conversations
//!
//! A [`Receptionist`] owns one [`Session`] and drives it turn by turn; the
//! model, knowledge base and prompt renderer are injected so tests can swap
//! them for mocks.

mod receptionist;
mod session;

#[cfg(test)]
pub mod testing;

pub use receptionist::{
    Receptionist, APOLOGY_REPLY, PLEASE_WAIT_NOTICE, TOKEN_OVERHEAD, TROUBLE_CONNECTING_REPLY,
};
pub use session::Session;

use crate::config::ReceptionistConfig;
use crate::knowledge::IntentsKnowledgeBase;
use crate::llm::{ChatCompletionsService, LoggingService};
use crate::rate_limiter::RateLimiter;
use crate::system_prompt::ProtocolPromptRenderer;
use std::sync::Arc;

/// Type alias for production receptionist with concrete implementations
pub type ProductionReceptionist = Receptionist<
    LoggingService<ChatCompletionsService>,
    IntentsKnowledgeBase,
    ProtocolPromptRenderer,
>;

impl ProductionReceptionist {
    /// Wire the shipped collaborators together from configuration
    pub fn from_config(
        config: &ReceptionistConfig,
        llm: ChatCompletionsService,
        knowledge: Arc<IntentsKnowledgeBase>,
    ) -> Self {
        Receptionist::new(
            LoggingService::new(llm),
            knowledge,
            ProtocolPromptRenderer,
            Arc::new(RateLimiter::new(config.rate_limits)),
        )
        .with_retry_policy(config.retry)
        .with_enrichment_policy(config.enrichment)
    }
}
