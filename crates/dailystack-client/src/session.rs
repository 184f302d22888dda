//! Session state for one learner.
//!
//! [`SessionState`] holds everything a front end renders: the scenario, the
//! current flashcard, the chat transcript and the UI flags. Every mutating
//! method records the [`SessionEvent`]s it causes; [`Session`] wraps the state
//! in a mutex and broadcasts those events once the mutation is done.
//!
//! # Message handles
//!
//! Streams write into a bot placeholder through a [`MessageHandle`]. The
//! transcript carries a generation counter that is bumped whenever the whole
//! list is replaced (a chat history reload), so a stream that outlives its
//! transcript cannot write into an unrelated message.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use crate::events::{EventBroadcaster, SessionEvent};
use crate::explanation::{compose_prompt, ExplanationRequest};
use crate::models::{ChatMessage, Flashcard, Scenario};

// ============================================================================
// ExplanationPhase
// ============================================================================

/// Progress of the automatic explanation for the current flashcard.
///
/// `Idle -> Requested -> Streaming -> Done`. The phase returns to `Idle` only
/// when the current flashcard changes, so each card is explained at most once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationPhase {
    /// No explanation requested for this card yet.
    #[default]
    Idle,
    /// Requested, waiting for the response headers.
    Requested,
    /// Fragments are arriving.
    Streaming,
    /// Finished, successfully or not.
    Done,
}

impl ExplanationPhase {
    /// Returns `true` while a request for this card is in flight.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Requested | Self::Streaming)
    }
}

// ============================================================================
// MessageHandle
// ============================================================================

/// Names one message of one version of the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle {
    generation: u64,
    index: usize,
}

impl MessageHandle {
    /// Position of the message in the transcript.
    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }
}

// ============================================================================
// SessionState
// ============================================================================

/// Everything a front end needs to render the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Today's scenario, once loaded.
    pub scenario: Option<Scenario>,

    /// The flashcard being studied, once loaded.
    pub flashcard: Option<Flashcard>,

    /// Chat transcript for the current flashcard.
    pub messages: Vec<ChatMessage>,

    /// Whether a load is in flight. Starts `true` until the first load settles.
    pub loading: bool,

    /// Error to show in place of the challenge.
    pub error: Option<String>,

    /// Whether the answer of the current flashcard is visible.
    pub answer_revealed: bool,

    /// Whether an explanation is being generated.
    pub generating: bool,

    /// Explanation progress for the current flashcard.
    pub explanation: ExplanationPhase,

    /// When the state last changed.
    pub updated_at: DateTime<Utc>,

    #[serde(skip)]
    generation: u64,

    #[serde(skip)]
    flashcard_epoch: u64,

    #[serde(skip)]
    pending: Vec<SessionEvent>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    /// Creates an empty session that is waiting for its first load.
    ///
    /// # Examples
    ///
    /// ```
    /// use dailystack_client::session::{ExplanationPhase, SessionState};
    ///
    /// let state = SessionState::new();
    /// assert!(state.loading);
    /// assert!(!state.is_errored());
    /// assert!(state.messages.is_empty());
    /// assert_eq!(state.explanation, ExplanationPhase::Idle);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self {
            scenario: None,
            flashcard: None,
            messages: Vec::new(),
            loading: true,
            error: None,
            answer_revealed: false,
            generating: false,
            explanation: ExplanationPhase::Idle,
            updated_at: Utc::now(),
            generation: 0,
            flashcard_epoch: 0,
            pending: Vec::new(),
        }
    }

    /// Returns `true` if an error is being shown.
    #[must_use]
    pub const fn is_errored(&self) -> bool {
        self.error.is_some()
    }

    /// Identifies the current flashcard; bumped every time it is replaced.
    #[must_use]
    pub const fn flashcard_epoch(&self) -> u64 {
        self.flashcard_epoch
    }

    /// Drains the events recorded since the last call.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.pending)
    }

    /// Updates the `updated_at` timestamp to the current time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn record(&mut self, event: SessionEvent) {
        self.pending.push(event);
        self.touch();
    }

    // ------------------------------------------------------------------------
    // Flags
    // ------------------------------------------------------------------------

    /// Sets the loading flag.
    pub fn set_loading(&mut self, loading: bool) {
        if self.loading != loading {
            self.loading = loading;
            self.record(SessionEvent::LoadingChanged { loading });
        }
    }

    /// Sets or clears the error.
    pub fn set_error(&mut self, error: Option<String>) {
        if self.error != error {
            self.error.clone_from(&error);
            self.record(SessionEvent::ErrorChanged { error });
        }
    }

    /// Sets the generating flag.
    pub fn set_generating(&mut self, generating: bool) {
        if self.generating != generating {
            self.generating = generating;
            self.record(SessionEvent::GeneratingChanged { generating });
        }
    }

    /// Shows or hides the answer without touching the explanation phase.
    pub fn set_answer_revealed(&mut self, revealed: bool) {
        if self.answer_revealed != revealed {
            self.answer_revealed = revealed;
            self.record(SessionEvent::AnswerRevealChanged { revealed });
        }
    }

    // ------------------------------------------------------------------------
    // Scenario and flashcard
    // ------------------------------------------------------------------------

    /// Replaces the scenario.
    pub fn set_scenario(&mut self, scenario: Option<Scenario>) {
        self.scenario.clone_from(&scenario);
        self.record(SessionEvent::ScenarioChanged { scenario });
    }

    /// Replaces the current flashcard.
    ///
    /// Hides the answer and re-arms the explanation for the new card.
    pub fn set_flashcard(&mut self, flashcard: Option<Flashcard>) {
        self.flashcard.clone_from(&flashcard);
        self.flashcard_epoch += 1;
        self.explanation = ExplanationPhase::Idle;
        self.record(SessionEvent::FlashcardChanged { flashcard });
        self.set_answer_revealed(false);
    }

    /// Flips answer visibility.
    ///
    /// Returns a request the first time the current card's answer is shown;
    /// the caller passes it to the explanation runner. Later toggles of the
    /// same card return `None`.
    pub fn toggle_answer(&mut self) -> Option<ExplanationRequest> {
        let revealed = !self.answer_revealed;
        self.set_answer_revealed(revealed);

        if !revealed || self.explanation != ExplanationPhase::Idle {
            return None;
        }
        let flashcard = self.flashcard.as_ref()?;

        let prompt = compose_prompt(self.scenario.as_ref(), flashcard);
        self.explanation = ExplanationPhase::Requested;
        self.touch();
        debug!(epoch = self.flashcard_epoch, "Explanation requested");
        Some(ExplanationRequest::new(self.flashcard_epoch, prompt))
    }

    /// Returns `true` if `request` still belongs to the current card and has
    /// not started yet.
    #[must_use]
    pub fn is_pending(&self, request: &ExplanationRequest) -> bool {
        request.epoch() == self.flashcard_epoch && self.explanation == ExplanationPhase::Requested
    }

    /// Marks the explanation for card `epoch` as streaming.
    ///
    /// Ignored if the card has changed since.
    pub fn explanation_streaming(&mut self, epoch: u64) {
        if epoch == self.flashcard_epoch && self.explanation == ExplanationPhase::Requested {
            self.explanation = ExplanationPhase::Streaming;
            self.touch();
        }
    }

    /// Finishes the explanation for card `epoch`.
    ///
    /// The phase only moves if the card is unchanged. `generating` is cleared
    /// unless a newer card has its own explanation in flight.
    pub fn finish_explanation(&mut self, epoch: u64) {
        if epoch == self.flashcard_epoch {
            self.explanation = ExplanationPhase::Done;
            self.touch();
            self.set_generating(false);
        } else if !self.explanation.is_active() {
            self.set_generating(false);
        }
    }

    // ------------------------------------------------------------------------
    // Transcript
    // ------------------------------------------------------------------------

    /// Appends a message and returns a handle to it.
    pub fn append_message(&mut self, message: ChatMessage) -> MessageHandle {
        let index = self.messages.len();
        self.messages.push(message.clone());
        self.record(SessionEvent::MessageAppended { index, message });
        MessageHandle {
            generation: self.generation,
            index,
        }
    }

    /// Returns the message behind `handle`, unless the transcript was replaced.
    #[must_use]
    pub fn message(&self, handle: MessageHandle) -> Option<&ChatMessage> {
        if handle.generation != self.generation {
            return None;
        }
        self.messages.get(handle.index)
    }

    /// Appends text to the message behind `handle`.
    ///
    /// Returns `false` and changes nothing when the handle is stale.
    pub fn append_to(&mut self, handle: MessageHandle, fragment: &str) -> bool {
        if handle.generation != self.generation {
            return false;
        }
        let Some(message) = self.messages.get_mut(handle.index) else {
            return false;
        };
        message.content.push_str(fragment);
        self.record(SessionEvent::MessageDelta {
            index: handle.index,
            fragment: fragment.to_string(),
        });
        true
    }

    /// Replaces the content of the message behind `handle`.
    ///
    /// Returns `false` and changes nothing when the handle is stale.
    pub fn replace_message(&mut self, handle: MessageHandle, content: impl Into<String>) -> bool {
        if handle.generation != self.generation {
            return false;
        }
        let Some(message) = self.messages.get_mut(handle.index) else {
            return false;
        };
        let content = content.into();
        message.content.clone_from(&content);
        self.record(SessionEvent::MessageReplaced {
            index: handle.index,
            content,
        });
        true
    }

    /// Replaces the whole transcript, invalidating every outstanding handle.
    pub fn reset_messages(&mut self, messages: Vec<ChatMessage>) {
        self.generation += 1;
        self.messages.clone_from(&messages);
        self.record(SessionEvent::MessagesReset { messages });
    }
}

// ============================================================================
// Session
// ============================================================================

/// Shared, observable session state.
///
/// Cloning is cheap; all clones see the same state and event stream.
#[derive(Debug, Clone)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
    events: EventBroadcaster,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(EventBroadcaster::default())
    }
}

impl Session {
    /// Creates a fresh session publishing on `events`.
    #[must_use]
    pub fn new(events: EventBroadcaster) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::new())),
            events,
        }
    }

    /// Subscribes to future changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Returns the current state together with a subscription that starts
    /// exactly after it.
    pub async fn observe(&self) -> (SessionState, broadcast::Receiver<SessionEvent>) {
        let state = self.state.lock().await;
        (state.clone(), self.events.subscribe())
    }

    /// Returns a copy of the current state.
    pub async fn snapshot(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    /// Mutates the state and broadcasts the resulting events.
    ///
    /// Events are sent while the lock is held, so subscribers observe them in
    /// mutation order.
    pub async fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.state.lock().await;
        let result = f(&mut state);
        for event in state.take_events() {
            self.events.send(event);
        }
        result
    }
}

// ============================================================================
// Tests
// ============================================================================
