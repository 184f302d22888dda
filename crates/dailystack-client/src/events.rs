//! Session change events and their broadcaster.
//!
//! Every mutation of the [`SessionState`](crate::session::SessionState) is
//! published as a [`SessionEvent`] so that front ends can either react to
//! individual changes or re-render from a fresh snapshot.
//!
//! # Example
//!
//! ```no_run
//! use dailystack_client::events::{EventBroadcaster, SessionEvent};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(16);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(SessionEvent::LoadingChanged { loading: false });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("{}", event.event_name());
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::{ChatMessage, Flashcard, Scenario};
use crate::session::SessionState;

// ============================================================================
// Event Enum
// ============================================================================

/// A change to the session.
///
/// Serialized as a JSON object with `event` and `payload` fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Full state, sent once to a fresh observer.
    Snapshot {
        /// The state at the time of subscribing.
        state: Box<SessionState>,
    },
    /// The scenario was replaced.
    ScenarioChanged {
        /// The new scenario.
        scenario: Option<Scenario>,
    },
    /// The current flashcard was replaced.
    FlashcardChanged {
        /// The new flashcard.
        flashcard: Option<Flashcard>,
    },
    /// A load started or finished.
    LoadingChanged {
        /// Whether a load is in flight.
        loading: bool,
    },
    /// The error banner changed.
    ErrorChanged {
        /// The error to show, `None` to clear it.
        error: Option<String>,
    },
    /// The answer was revealed or hidden.
    AnswerRevealChanged {
        /// Whether the answer is visible.
        revealed: bool,
    },
    /// An explanation started or finished.
    GeneratingChanged {
        /// Whether an explanation is being generated.
        generating: bool,
    },
    /// A message was added to the transcript.
    MessageAppended {
        /// Position of the new message.
        index: usize,
        /// The message as appended.
        message: ChatMessage,
    },
    /// Text was appended to a streaming message.
    MessageDelta {
        /// Position of the message.
        index: usize,
        /// Text appended to the message.
        fragment: String,
    },
    /// A message's content was replaced.
    MessageReplaced {
        /// Position of the message.
        index: usize,
        /// The new content.
        content: String,
    },
    /// The whole transcript was replaced.
    MessagesReset {
        /// The new transcript.
        messages: Vec<ChatMessage>,
    },
}

impl SessionEvent {
    /// Returns the event name as serialized in the `event` field.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Snapshot { .. } => "snapshot",
            Self::ScenarioChanged { .. } => "scenario_changed",
            Self::FlashcardChanged { .. } => "flashcard_changed",
            Self::LoadingChanged { .. } => "loading_changed",
            Self::ErrorChanged { .. } => "error_changed",
            Self::AnswerRevealChanged { .. } => "answer_reveal_changed",
            Self::GeneratingChanged { .. } => "generating_changed",
            Self::MessageAppended { .. } => "message_appended",
            Self::MessageDelta { .. } => "message_delta",
            Self::MessageReplaced { .. } => "message_replaced",
            Self::MessagesReset { .. } => "messages_reset",
        }
    }

    /// Creates a `Snapshot` event.
    #[must_use]
    pub fn snapshot(state: SessionState) -> Self {
        Self::Snapshot {
            state: Box::new(state),
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Fans session events out to every subscriber.
///
/// Events are not replayed: a subscriber only sees what is sent after it
/// subscribed, and one that falls more than `capacity` events behind gets a
/// `Lagged` error and skips ahead.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Creates a new subscriber.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event, returning how many subscribers will receive it.
    pub fn send(&self, event: SessionEvent) -> usize {
        // Err only means nobody is listening.
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

// ============================================================================
// Tests
// ============================================================================
