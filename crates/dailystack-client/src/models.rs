//! Domain types for the daily challenge.
//!
//! The backend's JSON is decoded into lenient payload structs first and then
//! mapped into the domain types, so that missing or legacy fields fall back to
//! the defaults the UI expects.

use serde::{Deserialize, Deserializer, Serialize};

/// Category shown when the backend does not provide one.
pub const DEFAULT_CATEGORY: &str = "General";

// ============================================================================
// Scenario
// ============================================================================

/// The day's problem statement, shown above the flashcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Short title of the scenario.
    pub title: String,
    /// Problem description.
    pub description: String,
    /// Optional architectural overview (older backends only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architectural_overview: Option<String>,
}

impl Scenario {
    /// Creates a scenario with a title and description.
    #[must_use]
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            architectural_overview: None,
        }
    }
}

/// Scenario as sent by the backend.
///
/// `{}` is sent while no challenge has been generated yet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScenarioPayload {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    problem_description: Option<String>,
    #[serde(default)]
    architectural_overview: Option<String>,
}

impl ScenarioPayload {
    /// Maps the payload into a [`Scenario`].
    ///
    /// Returns `None` when the payload carries neither a title nor a description.
    #[must_use]
    pub fn into_scenario(self) -> Option<Scenario> {
        let title = non_empty(self.title);
        let description =
            non_empty(self.problem_description).or_else(|| non_empty(self.description));
        if title.is_none() && description.is_none() {
            return None;
        }
        Some(Scenario {
            title: title.unwrap_or_default(),
            description: description.unwrap_or_default(),
            architectural_overview: non_empty(self.architectural_overview),
        })
    }
}

// ============================================================================
// Flashcard
// ============================================================================

/// A question/answer pair with optional extended material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    /// Card heading (may be empty).
    #[serde(default)]
    pub title: String,
    /// The question shown before the answer is revealed.
    pub question: String,
    /// The short answer.
    pub answer: String,
    /// Topic category, `"General"` when unknown.
    pub category: String,
    /// Longer explanation shown with the answer.
    #[serde(default)]
    pub detailed_explanation: String,
    /// Code sample shown with the answer.
    #[serde(default)]
    pub code_example: String,
    /// Diagram or visual description shown with the answer.
    #[serde(default)]
    pub visual_example: String,
}

impl Flashcard {
    /// Creates a flashcard with a question and answer and default extras.
    #[must_use]
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            title: String::new(),
            question: question.into(),
            answer: answer.into(),
            category: DEFAULT_CATEGORY.to_string(),
            detailed_explanation: String::new(),
            code_example: String::new(),
            visual_example: String::new(),
        }
    }
}

/// Flashcard as sent by the backend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlashcardPayload {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    short_answer: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    detailed_explanation: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    code_example: Option<String>,
    #[serde(default)]
    visual_example: Option<String>,
}

impl FlashcardPayload {
    /// Maps the payload into a [`Flashcard`].
    ///
    /// Returns `None` when the payload has neither a question nor an answer,
    /// which is how the backend says there is no card (`{}` or
    /// `{"status": "no flashcards"}`).
    #[must_use]
    pub fn into_flashcard(self) -> Option<Flashcard> {
        let question = non_empty(self.question);
        let answer = non_empty(self.short_answer).or_else(|| non_empty(self.answer));
        if question.is_none() && answer.is_none() {
            return None;
        }
        Some(Flashcard {
            title: self.title.unwrap_or_default(),
            question: question.unwrap_or_default(),
            answer: answer.unwrap_or_default(),
            category: non_empty(self.category).unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            detailed_explanation: non_empty(self.detailed_explanation)
                .or_else(|| non_empty(self.description))
                .unwrap_or_default(),
            code_example: self.code_example.unwrap_or_default(),
            visual_example: self.visual_example.unwrap_or_default(),
        })
    }
}

// ============================================================================
// Chat
// ============================================================================

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    /// Typed by the learner.
    User,
    /// Produced by the LLM.
    Bot,
}

impl<'de> Deserialize<'de> for ChatRole {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Anything that is not the bot is rendered as the learner.
        let s = String::deserialize(deserializer)?;
        Ok(if s.eq_ignore_ascii_case("bot") {
            Self::Bot
        } else {
            Self::User
        })
    }
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Bot => write!(f, "bot"),
        }
    }
}

/// One entry of the chat transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who wrote the message.
    pub role: ChatRole,
    /// Message text.
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    /// Creates a message written by the learner.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// Creates a message written by the bot.
    #[must_use]
    pub fn bot(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Bot,
            content: content.into(),
        }
    }
}

// ============================================================================
// Status and auth
// ============================================================================

/// Response of `GET /api/status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Whether the backend is still generating the challenge.
    #[serde(default)]
    pub loading: bool,
    /// Whether a challenge is available.
    #[serde(default)]
    pub has_data: bool,
    /// Error reported by the backend, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusReport {
    /// Returns the backend's error message, ignoring blank strings.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }
}

/// Credentials for the LLM provider, saved on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    /// Client id.
    #[serde(rename = "stk_client_id")]
    pub client_id: String,
    /// Client secret.
    #[serde(rename = "stk_client_key")]
    pub client_key: String,
    /// Account realm.
    #[serde(rename = "stk_realm")]
    pub realm: String,
}

impl Credentials {
    /// Returns `true` when every field is filled in.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        [&self.client_id, &self.client_key, &self.realm]
            .iter()
            .all(|field| !field.trim().is_empty())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ============================================================================
// Tests
// ============================================================================
