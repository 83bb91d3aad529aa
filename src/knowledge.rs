//! Emergency-handling instructions lookup
//!
//! The orchestrator only needs "given a query, return the best instructions
//! or nothing". [`IntentsKnowledgeBase`] serves that from an intents file:
//!
//! ```json
//! {"intents": [{"tag": "Cuts", "patterns": ["I cut my leg"], "responses": ["Apply pressure..."]}]}
//! ```
//!
//! Matching is lexical: the query is compared against every pattern (and the
//! tag) by token overlap, and the best-scoring intent wins.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Minimum overlap score for a match to count
pub const DEFAULT_MIN_SCORE: f32 = 0.2;

/// Best instructions found for a query
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeMatch {
    pub tag: String,
    pub instructions: String,
    pub score: f32,
}

/// Lookup collaborator. Never errors: a miss is `None`.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn lookup(&self, query: &str) -> Option<KnowledgeMatch>;
}

#[async_trait]
impl<T: KnowledgeBase + ?Sized> KnowledgeBase for std::sync::Arc<T> {
    async fn lookup(&self, query: &str) -> Option<KnowledgeMatch> {
        (**self).lookup(query).await
    }
}

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("failed to read intents file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse intents file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct IntentsFile {
    intents: Vec<Intent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Intent {
    pub tag: String,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub responses: Vec<String>,
}

#[derive(Debug)]
struct IndexedIntent {
    tag: String,
    instructions: String,
    /// Token sets for the tag and every pattern
    token_sets: Vec<HashSet<String>>,
}

/// In-memory intents collection with lexical ranking
#[derive(Debug)]
pub struct IntentsKnowledgeBase {
    intents: Vec<IndexedIntent>,
    min_score: f32,
}

impl IntentsKnowledgeBase {
    pub fn new(intents: Vec<Intent>) -> Self {
        let intents = intents
            .into_iter()
            .filter_map(|intent| {
                // The first response is the canonical instruction text
                let instructions = intent.responses.into_iter().next()?;
                let token_sets = std::iter::once(&intent.tag)
                    .chain(intent.patterns.iter())
                    .map(|text| tokenize(text))
                    .filter(|tokens| !tokens.is_empty())
                    .collect();
                Some(IndexedIntent {
                    tag: intent.tag,
                    instructions,
                    token_sets,
                })
            })
            .collect();

        Self {
            intents,
            min_score: DEFAULT_MIN_SCORE,
        }
    }

    #[must_use]
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let file: IntentsFile = serde_json::from_str(json)?;
        Ok(Self::new(file.intents))
    }

    pub fn load(path: &Path) -> Result<Self, KnowledgeError> {
        let shown = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| KnowledgeError::Io {
            path: shown.clone(),
            source,
        })?;
        let kb = Self::from_json(&content).map_err(|source| KnowledgeError::Parse {
            path: shown.clone(),
            source,
        })?;
        tracing::info!(path = %shown, intents = kb.len(), "Loaded emergency instructions");
        Ok(kb)
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    fn best_match(&self, query: &str) -> Option<KnowledgeMatch> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return None;
        }

        self.intents
            .iter()
            .filter_map(|intent| {
                let score = intent
                    .token_sets
                    .iter()
                    .map(|tokens| overlap_score(&query_tokens, tokens))
                    .fold(0.0_f32, f32::max);
                (score >= self.min_score).then_some((intent, score))
            })
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(intent, score)| KnowledgeMatch {
                tag: intent.tag.clone(),
                instructions: intent.instructions.clone(),
                score,
            })
    }
}

#[async_trait]
impl KnowledgeBase for IntentsKnowledgeBase {
    async fn lookup(&self, query: &str) -> Option<KnowledgeMatch> {
        tracing::info!(query = %query, "Searching emergency instructions");
        let result = self.best_match(query);
        match &result {
            Some(m) => tracing::info!(tag = %m.tag, score = m.score, "Instructions found"),
            None => tracing::info!(query = %query, "No instructions found"),
        }
        result
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Jaccard similarity of two token sets
#[allow(clippy::cast_precision_loss)] // token counts are tiny
fn overlap_score(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}
