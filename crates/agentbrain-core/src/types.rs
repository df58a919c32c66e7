use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Identifiers
// =============================================================================

/// Stable identifier of a registered user (the store's row id).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing message sequence identifier.
///
/// Insertion order is the only ordering of history; timestamps never
/// override it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub i64);

// =============================================================================
// Enums
// =============================================================================

/// Author role of a stored message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A question typed by the user.
    User,
    /// Answer from the knowledge-grounded primary stage.
    Professor,
    /// Answer from the constrained second stage (or its fallback).
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Professor => "professor",
            Role::Agent => "agent",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "professor" => Ok(Role::Professor),
            "agent" => Ok(Role::Agent),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// How the content of a stored message came to be.
///
/// Persisted next to the content so that pair extraction can filter
/// substitutes structurally instead of comparing against the sentinel text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageOrigin {
    /// Typed by a user or produced by a successful generation call.
    #[default]
    Generated,
    /// The sentinel substituted for a failed primary generation.
    Sentinel,
    /// A verbatim historical answer returned by fallback retrieval.
    Fallback,
}

impl MessageOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageOrigin::Generated => "generated",
            MessageOrigin::Sentinel => "sentinel",
            MessageOrigin::Fallback => "fallback",
        }
    }
}

impl FromStr for MessageOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generated" => Ok(MessageOrigin::Generated),
            "sentinel" => Ok(MessageOrigin::Sentinel),
            "fallback" => Ok(MessageOrigin::Fallback),
            other => Err(format!("unknown message origin: {}", other)),
        }
    }
}

/// Which messages a history read considers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// A single user's messages.
    User(UserId),
    /// Every user's messages.
    Global,
}

// =============================================================================
// Records
// =============================================================================

/// A registered user. Immutable after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub handle: String,
    pub created_at: DateTime<Utc>,
}

/// A message about to be appended to the store.
#[derive(Clone, Debug, PartialEq)]
pub struct NewMessage {
    pub user_id: UserId,
    pub role: Role,
    pub content: String,
    pub origin: MessageOrigin,
}

impl NewMessage {
    pub fn new(user_id: UserId, role: Role, content: impl Into<String>) -> Self {
        Self {
            user_id,
            role,
            content: content.into(),
            origin: MessageOrigin::Generated,
        }
    }

    pub fn with_origin(mut self, origin: MessageOrigin) -> Self {
        self.origin = origin;
        self
    }
}

/// A stored, immutable message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub user_id: UserId,
    pub role: Role,
    pub content: String,
    pub origin: MessageOrigin,
    pub created_at: DateTime<Utc>,
}

/// A question and the answer that followed it in history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerPair {
    pub question: String,
    pub answer: String,
}

impl AnswerPair {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

// =============================================================================
// Stage outcomes
// =============================================================================

/// Why a stage produced a substitute instead of a generated answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum DegradeCause {
    /// Generation failed and the sentinel text was substituted.
    GenerationUnavailable(String),
    /// Generation failed and a historical answer was retrieved instead.
    FallbackRetrieval(String),
}

/// Result of one pipeline stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageOutcome {
    Success(String),
    Degraded { text: String, cause: DegradeCause },
}

impl StageOutcome {
    /// The text shown to the user and persisted, regardless of outcome.
    pub fn text(&self) -> &str {
        match self {
            StageOutcome::Success(text) => text,
            StageOutcome::Degraded { text, .. } => text,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, StageOutcome::Degraded { .. })
    }

    /// The origin marker persisted alongside this outcome's text.
    pub fn origin(&self) -> MessageOrigin {
        match self {
            StageOutcome::Success(_) => MessageOrigin::Generated,
            StageOutcome::Degraded {
                cause: DegradeCause::GenerationUnavailable(_),
                ..
            } => MessageOrigin::Sentinel,
            StageOutcome::Degraded {
                cause: DegradeCause::FallbackRetrieval(_),
                ..
            } => MessageOrigin::Fallback,
        }
    }
}

/// Both answers produced by one conversational turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnReport {
    pub professor: StageOutcome,
    pub agent: StageOutcome,
}
