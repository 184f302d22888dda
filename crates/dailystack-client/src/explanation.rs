//! Automatic explanation of a revealed flashcard.
//!
//! The first time a card's answer is revealed,
//! [`SessionState::toggle_answer`](crate::session::SessionState::toggle_answer)
//! hands out an [`ExplanationRequest`]. Running it with [`explain`] asks the
//! LLM, hidden from the visible history, to explain the answer in the context
//! of the scenario, and streams the reply into a new bot message.

use tracing::{debug, info, instrument, warn};

use crate::api::Backend;
use crate::chat::stream_answer;
use crate::models::{ChatMessage, Flashcard, Scenario};
use crate::session::Session;

/// Shown in place of an explanation that could not be generated.
pub const EXPLANATION_APOLOGY: &str = "Sorry, I couldn't generate an explanation right now.";

/// Composes the explanation prompt for a flashcard.
///
/// # Examples
///
/// ```
/// use dailystack_client::explanation::compose_prompt;
/// use dailystack_client::models::{Flashcard, Scenario};
///
/// let scenario = Scenario::new("Checkout", "A shop at peak load");
/// let card = Flashcard::new("What is idempotency?", "Same request, same effect");
/// let prompt = compose_prompt(Some(&scenario), &card);
///
/// assert!(prompt.starts_with("Scenario: Checkout\nA shop at peak load\n"));
/// assert!(prompt.contains("Expected answer: Same request, same effect"));
/// ```
#[must_use]
pub fn compose_prompt(scenario: Option<&Scenario>, flashcard: &Flashcard) -> String {
    let (title, description) =
        scenario.map_or(("", ""), |s| (s.title.as_str(), s.description.as_str()));
    format!(
        "Scenario: {title}\n{description}\n\n\
         Flashcard question: {question}\n\
         Expected answer: {answer}\n\n\
         Explain the answer in the context of this scenario, step by step.",
        question = flashcard.question,
        answer = flashcard.answer,
    )
}

/// A pending explanation for one flashcard.
///
/// Not `Clone`: each reveal yields at most one request, and running it
/// consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct ExplanationRequest {
    epoch: u64,
    prompt: String,
}

impl ExplanationRequest {
    pub(crate) const fn new(epoch: u64, prompt: String) -> Self {
        Self { epoch, prompt }
    }

    /// The flashcard this request belongs to.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The composed prompt.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

/// How an explanation run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplanationOutcome {
    /// The card changed before the request started; nothing was sent.
    Skipped,
    /// The explanation streamed to the end.
    Completed,
    /// The request or the stream failed and the apology is shown.
    Failed,
}

/// Runs an explanation request to completion.
///
/// Sets `generating`, appends an empty bot placeholder and streams the hidden
/// answer into it. On failure the placeholder shows [`EXPLANATION_APOLOGY`].
/// Either way the phase ends as `Done` and `generating` is cleared, unless the
/// card changed meanwhile.
#[instrument(skip_all, fields(epoch = request.epoch()))]
pub async fn explain<B>(
    backend: &B,
    session: &Session,
    request: ExplanationRequest,
) -> ExplanationOutcome
where
    B: Backend + ?Sized,
{
    let epoch = request.epoch();
    let placeholder = session
        .update(|state| {
            if !state.is_pending(&request) {
                return None;
            }
            state.set_generating(true);
            Some(state.append_message(ChatMessage::bot("")))
        })
        .await;

    let Some(placeholder) = placeholder else {
        debug!("Flashcard changed before the explanation started");
        return ExplanationOutcome::Skipped;
    };

    info!("Generating explanation");
    let result = match backend.ask(request.prompt(), true).await {
        Ok(body) => {
            session
                .update(|state| state.explanation_streaming(epoch))
                .await;
            stream_answer(session, placeholder, body).await
        }
        Err(e) => Err(e),
    };

    let outcome = match result {
        Ok(()) => ExplanationOutcome::Completed,
        Err(e) => {
            warn!(error = %e, "Explanation failed");
            session
                .update(|state| state.replace_message(placeholder, EXPLANATION_APOLOGY))
                .await;
            ExplanationOutcome::Failed
        }
    };

    session
        .update(|state| state.finish_explanation(epoch))
        .await;
    outcome
}

// ============================================================================
// Tests
// ============================================================================
