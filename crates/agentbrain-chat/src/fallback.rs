//! Fallback retrieval: answer with the stored reply to the most similar
//! past question when the constrained stage cannot generate.
//!
//! The similarity index is rebuilt from global history on every call. With
//! at most `window` candidates a brute-force cosine scan is enough.

use std::sync::Arc;

use agentbrain_core::error::BrainError;
use agentbrain_core::store::ConversationStore;
use agentbrain_core::types::Scope;
use agentbrain_vector::embedding::DynEmbeddingService;
use agentbrain_vector::similarity::nearest;
use tracing::{debug, info, warn};

use crate::pairs::{extract_pairs, PairingPolicy};

/// Returned when there is nothing to retrieve or retrieval fails.
pub const FALLBACK_APOLOGY: &str = "Desculpe, não consigo responder no momento.";

/// The historical pair selected for a question.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackMatch {
    pub question: String,
    pub answer: String,
    pub score: f64,
    /// Position within the retained window, oldest first.
    pub index: usize,
}

/// Nearest-question lookup over recorded history.
pub struct FallbackRetriever {
    embedder: Arc<dyn DynEmbeddingService>,
    policy: PairingPolicy,
}

impl FallbackRetriever {
    pub fn new(embedder: Arc<dyn DynEmbeddingService>, policy: PairingPolicy) -> Self {
        Self { embedder, policy }
    }

    /// Answer text for `question`, or [`FALLBACK_APOLOGY`]. Never fails.
    pub async fn retrieve(
        &self,
        question: &str,
        store: &dyn ConversationStore,
        window: usize,
    ) -> String {
        match self.retrieve_detailed(question, store, window).await {
            Ok(Some(found)) => {
                info!(
                    score = found.score,
                    index = found.index,
                    matched = %found.question,
                    "Fallback answer retrieved"
                );
                found.answer
            }
            Ok(None) => {
                info!("Fallback corpus empty, returning apology");
                FALLBACK_APOLOGY.to_string()
            }
            Err(e) => {
                warn!(error = %e, "Fallback retrieval failed, returning apology");
                FALLBACK_APOLOGY.to_string()
            }
        }
    }

    /// Like [`retrieve`](Self::retrieve) but exposes the match and errors.
    ///
    /// `Ok(None)` means the corpus held no eligible pair. A `window` of 0 is
    /// treated as 1.
    pub async fn retrieve_detailed(
        &self,
        question: &str,
        store: &dyn ConversationStore,
        window: usize,
    ) -> Result<Option<FallbackMatch>, BrainError> {
        let window = window.max(1);
        let history = store.read(Scope::Global, None)?;
        let mut pairs = extract_pairs(&history, &self.policy);
        if pairs.len() > window {
            pairs.drain(..pairs.len() - window);
        }
        debug!(messages = history.len(), pairs = pairs.len(), "Fallback corpus built");

        if pairs.is_empty() {
            return Ok(None);
        }

        let query = self.embedder.embed_boxed(question).await?;
        let mut positions = Vec::with_capacity(pairs.len());
        let mut corpus = Vec::with_capacity(pairs.len());
        for (position, pair) in pairs.iter().enumerate() {
            match self.embedder.embed_boxed(&pair.question).await {
                Ok(vector) => {
                    positions.push(position);
                    corpus.push(vector);
                }
                Err(e) => {
                    warn!(
                        index = position,
                        error = %e,
                        "Skipping stored question that cannot be embedded"
                    );
                }
            }
        }

        let Some((best, score)) = nearest(&query, &corpus) else {
            return Ok(None);
        };
        let index = positions[best];
        let pair = pairs.swap_remove(index);
        Ok(Some(FallbackMatch {
            question: pair.question,
            answer: pair.answer,
            score,
            index,
        }))
    }
}
