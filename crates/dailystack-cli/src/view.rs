//! Terminal renderings of a session.
//!
//! All three views consume the same event stream. [`StreamView`] reacts to
//! each event and prints only what changed, [`SnapshotView`] redraws a full
//! frame from the current state, and [`JsonView`] prints the events
//! themselves, one per line.

use std::fmt::Write as _;

use dailystack_client::{ChatMessage, ChatRole, SessionEvent, SessionState, View};

/// ANSI sequence clearing the screen and moving the cursor home.
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Turns session events into terminal output.
pub trait Render: Send {
    /// Returns the text to print for `event`, if any.
    ///
    /// `state` is the session as of (or after) the event.
    fn render(&mut self, event: &SessionEvent, state: &SessionState) -> Option<String>;
}

/// Creates the renderer for a view mode.
pub fn renderer(view: View) -> Box<dyn Render> {
    match view {
        View::Stream => Box::new(StreamView::default()),
        View::Snapshot => Box::new(SnapshotView),
        View::Json => Box::new(JsonView),
    }
}

// ============================================================================
// Stream view
// ============================================================================

/// Prints changes as they happen, streaming answer text in place.
#[derive(Debug, Default)]
pub struct StreamView {
    /// Message whose text is currently being printed without a newline.
    open_message: Option<usize>,
}

impl StreamView {
    fn close_open_message(&mut self, out: &mut String) {
        if self.open_message.take().is_some() {
            out.push('\n');
        }
    }
}

impl Render for StreamView {
    fn render(&mut self, event: &SessionEvent, state: &SessionState) -> Option<String> {
        let mut out = String::new();

        match event {
            SessionEvent::Snapshot { state } => {
                self.open_message = None;
                out.push_str(&render_frame(state));
            }
            SessionEvent::MessageDelta { index, fragment } => {
                if self.open_message != Some(*index) {
                    self.close_open_message(&mut out);
                    out.push_str("bot> ");
                    self.open_message = Some(*index);
                }
                out.push_str(fragment);
                return Some(out);
            }
            SessionEvent::MessageAppended { index, message } => {
                self.close_open_message(&mut out);
                if message.role == ChatRole::Bot && message.content.is_empty() {
                    out.push_str("bot> ");
                    self.open_message = Some(*index);
                    return Some(out);
                }
                push_message(&mut out, message);
            }
            SessionEvent::MessageReplaced { content, .. } => {
                self.close_open_message(&mut out);
                let _ = writeln!(out, "bot> {content}");
            }
            SessionEvent::MessagesReset { messages } => {
                self.close_open_message(&mut out);
                if !messages.is_empty() {
                    out.push_str("-- chat history --\n");
                    for message in messages {
                        push_message(&mut out, message);
                    }
                }
            }
            SessionEvent::ScenarioChanged { scenario: Some(scenario) } => {
                self.close_open_message(&mut out);
                let _ = writeln!(out, "\n== {} ==\n{}", scenario.title, scenario.description);
            }
            SessionEvent::FlashcardChanged {
                flashcard: Some(card),
            } => {
                self.close_open_message(&mut out);
                let _ = writeln!(
                    out,
                    "\n[{}] {}\n(type :reveal to show the answer)",
                    card.category, card.question
                );
            }
            SessionEvent::FlashcardChanged { flashcard: None } => {
                self.close_open_message(&mut out);
                out.push_str("\nNo flashcard available.\n");
            }
            SessionEvent::AnswerRevealChanged { revealed: true } => {
                let card = state.flashcard.as_ref()?;
                self.close_open_message(&mut out);
                push_answer(&mut out, card);
            }
            SessionEvent::LoadingChanged { loading: true } => {
                self.close_open_message(&mut out);
                out.push_str("Loading...\n");
            }
            SessionEvent::ErrorChanged { error: Some(error) } => {
                self.close_open_message(&mut out);
                let _ = writeln!(out, "Error: {error}");
            }
            SessionEvent::GeneratingChanged { generating: true } => {
                self.close_open_message(&mut out);
                out.push_str("(generating explanation...)\n");
            }
            _ => {}
        }

        (!out.is_empty()).then_some(out)
    }
}

// ============================================================================
// Snapshot view
// ============================================================================

/// Redraws the whole session after every change.
#[derive(Debug, Default)]
pub struct SnapshotView;

impl Render for SnapshotView {
    fn render(&mut self, _event: &SessionEvent, state: &SessionState) -> Option<String> {
        Some(format!("{CLEAR_SCREEN}{}", render_frame(state)))
    }
}

/// Renders the whole session as plain text.
pub fn render_frame(state: &SessionState) -> String {
    let mut out = String::new();
    out.push_str("DailyStack\n==========\n");

    if let Some(error) = &state.error {
        let _ = writeln!(out, "Error: {error}");
    }
    if state.loading {
        out.push_str("Loading daily challenge...\n");
    }

    if let Some(scenario) = &state.scenario {
        let _ = writeln!(out, "\nScenario: {}\n{}", scenario.title, scenario.description);
        if let Some(overview) = &scenario.architectural_overview {
            let _ = writeln!(out, "Architecture: {overview}");
        }
    }

    match &state.flashcard {
        Some(card) => {
            let _ = writeln!(out, "\nFlashcard [{}]", card.category);
            if !card.title.is_empty() {
                let _ = writeln!(out, "{}", card.title);
            }
            let _ = writeln!(out, "Q: {}", card.question);
            if state.answer_revealed {
                push_answer(&mut out, card);
            } else {
                out.push_str("A: (hidden, type :reveal)\n");
            }
        }
        None if !state.loading && state.error.is_none() => {
            out.push_str("\nNo flashcard available.\n");
        }
        None => {}
    }

    if !state.messages.is_empty() || state.generating {
        out.push_str("\nChat\n----\n");
        for message in &state.messages {
            push_message(&mut out, message);
        }
        if state.generating {
            out.push_str("(generating explanation...)\n");
        }
    }

    out
}

// ============================================================================
// JSON view
// ============================================================================

/// Prints every event as one JSON object per line.
#[derive(Debug, Default)]
pub struct JsonView;

impl Render for JsonView {
    fn render(&mut self, event: &SessionEvent, _state: &SessionState) -> Option<String> {
        match serde_json::to_string(event) {
            Ok(line) => Some(format!("{line}\n")),
            Err(e) => {
                tracing::warn!(error = %e, event = event.event_name(), "Failed to serialize event");
                None
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn push_message(out: &mut String, message: &ChatMessage) {
    let who = match message.role {
        ChatRole::User => "you",
        ChatRole::Bot => "bot",
    };
    let _ = writeln!(out, "{who}> {}", message.content);
}

fn push_answer(out: &mut String, card: &dailystack_client::Flashcard) {
    let _ = writeln!(out, "A: {}", card.answer);
    for (label, text) in [
        ("Explanation", &card.detailed_explanation),
        ("Visual", &card.visual_example),
        ("Code", &card.code_example),
    ] {
        if !text.trim().is_empty() {
            let _ = writeln!(out, "{label}:\n{text}");
        }
    }
}
