//! Knowledge enrichment: fetching handling instructions for the reported
//! emergency while the conversation continues.
//!
//! The deferred mode hands the result back through a `oneshot` channel: the
//! spawned task is the only writer, the session the only reader.

use crate::knowledge::KnowledgeBase;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

/// Reply text used when the knowledge base has nothing for the query
pub const FALLBACK_INSTRUCTIONS: &str =
    "I'm sorry, I couldn't find any specific instructions for that situation in my database.";

/// When the lookup runs relative to the turn that triggers it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnrichmentPolicy {
    /// Look up within the triggering turn and answer with the instructions
    #[default]
    Inline,
    /// Look up in a background task, optionally after a delay, and surface
    /// the result on a later turn
    Deferred { delay: Duration },
}

impl fmt::Display for EnrichmentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrichmentPolicy::Inline => f.write_str("inline"),
            EnrichmentPolicy::Deferred { delay } => {
                write!(f, "deferred ({}s delay)", delay.as_secs())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown enrichment policy {0:?} (expected \"inline\" or \"deferred\")")]
pub struct UnknownPolicy(pub String);

impl FromStr for EnrichmentPolicy {
    type Err = UnknownPolicy;

    /// Parses the mode only; a deferred delay is configured separately
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline" | "sync" => Ok(EnrichmentPolicy::Inline),
            "deferred" | "background" => Ok(EnrichmentPolicy::Deferred {
                delay: Duration::ZERO,
            }),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

/// Observable state of a session's enrichment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentResult {
    /// Requested, not finished yet
    Pending,
    /// Nothing will arrive: never requested, or the task died before publishing
    Unavailable,
    Available(String),
}

impl EnrichmentResult {
    pub fn is_available(&self) -> bool {
        matches!(self, EnrichmentResult::Available(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            EnrichmentResult::Available(text) => Some(text),
            _ => None,
        }
    }
}

/// Query the knowledge base, substituting the fallback text on a miss
pub async fn fetch_instructions<K: KnowledgeBase + ?Sized>(knowledge: &K, query: &str) -> String {
    match knowledge.lookup(query).await {
        Some(found) => {
            tracing::info!(tag = %found.tag, score = found.score, "Enrichment matched");
            found.instructions
        }
        None => {
            tracing::info!(query = %query, "Enrichment found no match, using fallback");
            FALLBACK_INSTRUCTIONS.to_string()
        }
    }
}

/// Receiving end of a background lookup
///
/// Once the result is taken from the channel it is cached, so every later
/// read sees the same `Available` text.
#[derive(Debug)]
pub struct EnrichmentHandle {
    receiver: Option<oneshot::Receiver<String>>,
    result: EnrichmentResult,
}

impl EnrichmentHandle {
    /// Start the lookup in a background task
    pub fn spawn<K>(knowledge: Arc<K>, query: String, delay: Duration) -> Self
    where
        K: KnowledgeBase + ?Sized + 'static,
    {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let instructions = fetch_instructions(knowledge.as_ref(), &query).await;
            if tx.send(instructions).is_err() {
                // The session was reset or dropped while we were looking
                tracing::debug!(query = %query, "Enrichment result discarded, no receiver");
            }
        });

        Self {
            receiver: Some(rx),
            result: EnrichmentResult::Pending,
        }
    }

    /// Handle for a result that is already known
    pub fn ready(text: impl Into<String>) -> Self {
        Self {
            receiver: None,
            result: EnrichmentResult::Available(text.into()),
        }
    }

    /// Non-blocking read of the current result
    pub fn poll(&mut self) -> EnrichmentResult {
        if let Some(rx) = self.receiver.as_mut() {
            match rx.try_recv() {
                Ok(text) => {
                    self.result = EnrichmentResult::Available(text);
                    self.receiver = None;
                }
                Err(oneshot::error::TryRecvError::Empty) => {}
                Err(oneshot::error::TryRecvError::Closed) => {
                    tracing::warn!("Enrichment task ended without publishing a result");
                    self.result = EnrichmentResult::Unavailable;
                    self.receiver = None;
                }
            }
        }
        self.result.clone()
    }

    /// Wait for the background task to publish
    #[cfg(test)]
    pub(crate) async fn wait(&mut self) -> EnrichmentResult {
        if let Some(rx) = self.receiver.take() {
            self.result = match rx.await {
                Ok(text) => EnrichmentResult::Available(text),
                Err(_) => EnrichmentResult::Unavailable,
            };
        }
        self.result.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeMatch;
    use async_trait::async_trait;

    struct FixedKnowledge(Option<&'static str>);

    #[async_trait]
    impl KnowledgeBase for FixedKnowledge {
        async fn lookup(&self, _query: &str) -> Option<KnowledgeMatch> {
            self.0.map(|text| KnowledgeMatch {
                tag: "fixed".to_string(),
                instructions: text.to_string(),
                score: 1.0,
            })
        }
    }

    struct PanickingKnowledge;

    #[async_trait]
    impl KnowledgeBase for PanickingKnowledge {
        async fn lookup(&self, _query: &str) -> Option<KnowledgeMatch> {
            panic!("index unavailable")
        }
    }

    #[tokio::test]
    async fn test_fetch_falls_back_on_miss() {
        let text = fetch_instructions(&FixedKnowledge(None), "anything").await;
        assert_eq!(text, FALLBACK_INSTRUCTIONS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_result_is_pending_until_delay_elapses() {
        let kb = Arc::new(FixedKnowledge(Some("Keep the wound clean.")));
        let mut handle = EnrichmentHandle::spawn(kb, "Cut".to_string(), Duration::from_secs(15));

        tokio::task::yield_now().await;
        assert_eq!(handle.poll(), EnrichmentResult::Pending);

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(
            handle.poll(),
            EnrichmentResult::Available("Keep the wound clean.".to_string())
        );
    }

    #[tokio::test]
    async fn test_available_result_is_idempotent() {
        let kb = Arc::new(FixedKnowledge(Some("Stay calm.")));
        let mut handle = EnrichmentHandle::spawn(kb, "Panic".to_string(), Duration::ZERO);

        let first = handle.wait().await;
        assert_eq!(first, EnrichmentResult::Available("Stay calm.".to_string()));
        assert_eq!(handle.poll(), first);
        assert_eq!(handle.poll(), first);
    }

    #[tokio::test]
    async fn test_dead_task_reports_unavailable() {
        let mut handle = EnrichmentHandle::spawn(
            Arc::new(PanickingKnowledge),
            "Burn".to_string(),
            Duration::ZERO,
        );
        assert_eq!(handle.wait().await, EnrichmentResult::Unavailable);
        assert_eq!(handle.poll(), EnrichmentResult::Unavailable);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("inline".parse::<EnrichmentPolicy>(), Ok(EnrichmentPolicy::Inline));
        assert_eq!(
            "Deferred".parse::<EnrichmentPolicy>(),
            Ok(EnrichmentPolicy::Deferred {
                delay: Duration::ZERO
            })
        );
        assert!("eventually".parse::<EnrichmentPolicy>().is_err());
    }
}
