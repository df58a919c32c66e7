//! Reconstruct (question, answer) pairs from stored conversation history.

use agentbrain_core::types::{AnswerPair, Message, MessageOrigin, Role};

/// Stored and shown in place of a failed primary answer.
pub const PRIMARY_UNAVAILABLE: &str = "GPT-3 Desconectado temporariamente";

/// Which messages count as answers, and which answers are failure markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingPolicy {
    /// Roles whose messages answer the pending user question.
    pub answer_roles: Vec<Role>,
    /// Answers with one of these origins consume the pending question but
    /// are never emitted.
    pub skip_origins: Vec<MessageOrigin>,
    /// Also treat answers whose text is [`PRIMARY_UNAVAILABLE`] as failure
    /// markers, whatever their origin.
    pub skip_sentinel_text: bool,
}

impl PairingPolicy {
    /// Corpus used by fallback retrieval: professor and agent answers, with
    /// sentinel substitutes skipped. Fallback-derived answers are skipped
    /// too when `skip_fallback_answers` is set.
    pub fn corpus(skip_fallback_answers: bool) -> Self {
        let mut skip_origins = vec![MessageOrigin::Sentinel];
        if skip_fallback_answers {
            skip_origins.push(MessageOrigin::Fallback);
        }
        Self {
            answer_roles: vec![Role::Professor, Role::Agent],
            skip_origins,
            skip_sentinel_text: true,
        }
    }

    /// Context shown to the constrained stage: user questions paired with
    /// the professor's answer only, nothing skipped.
    pub fn professor_context() -> Self {
        Self {
            answer_roles: vec![Role::Professor],
            skip_origins: Vec::new(),
            skip_sentinel_text: false,
        }
    }

    fn is_answer(&self, role: Role) -> bool {
        self.answer_roles.contains(&role)
    }

    fn is_failure_marker(&self, message: &Message) -> bool {
        self.skip_origins.contains(&message.origin)
            || (self.skip_sentinel_text && message.content.starts_with(PRIMARY_UNAVAILABLE))
    }
}

impl Default for PairingPolicy {
    fn default() -> Self {
        Self::corpus(false)
    }
}

/// Pair each user question with the first answer-role message after it.
///
/// A second user message before any answer replaces the pending question.
/// Answers with no pending question are ignored, so a question answered
/// twice yields one pair. Output keeps history order.
pub fn extract_pairs(history: &[Message], policy: &PairingPolicy) -> Vec<AnswerPair> {
    let mut pairs = Vec::new();
    let mut pending: Option<&str> = None;

    for message in history {
        if message.role == Role::User {
            pending = Some(message.content.as_str());
            continue;
        }
        if !policy.is_answer(message.role) {
            continue;
        }
        let Some(question) = pending.take() else {
            continue;
        };
        if policy.is_failure_marker(message) {
            continue;
        }
        pairs.push(AnswerPair::new(question, message.content.clone()));
    }

    pairs
}
