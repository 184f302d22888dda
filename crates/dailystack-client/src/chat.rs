//! Manual chat and the shared answer-streaming loop.

use std::pin::pin;

use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::api::{Backend, ByteStream};
use crate::error::{ClientError, Result};
use crate::models::ChatMessage;
use crate::session::{MessageHandle, Session};
use crate::sse::{decode_stream, StreamEvent};

/// Shown in place of a chat answer when the backend cannot be reached.
pub const CHAT_APOLOGY: &str = "Sorry, I couldn't reach the server.";

/// How a chat send ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The input was blank; nothing was sent.
    Ignored,
    /// The answer streamed to the end.
    Answered,
    /// The request or the stream failed and the apology is shown.
    Failed,
}

/// Sends a visible chat message and streams the answer into the transcript.
///
/// Blank input is ignored without touching the transcript. Otherwise the
/// trimmed text is appended as a user message followed by an empty bot
/// placeholder that receives the streamed answer.
#[instrument(skip(backend, session, text), fields(len = text.len()))]
pub async fn send<B>(backend: &B, session: &Session, text: &str) -> SendOutcome
where
    B: Backend + ?Sized,
{
    let question = text.trim();
    if question.is_empty() {
        debug!("Ignoring blank chat message");
        return SendOutcome::Ignored;
    }

    let placeholder = session
        .update(|state| {
            state.append_message(ChatMessage::user(question));
            state.append_message(ChatMessage::bot(""))
        })
        .await;

    let result = match backend.ask(question, false).await {
        Ok(body) => stream_answer(session, placeholder, body).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            info!("Chat answer complete");
            SendOutcome::Answered
        }
        Err(e) => {
            warn!(error = %e, "Chat request failed");
            session
                .update(|state| state.replace_message(placeholder, CHAT_APOLOGY))
                .await;
            SendOutcome::Failed
        }
    }
}

/// Streams an answer body into the message behind `placeholder`.
///
/// `Answer` fragments are appended in order. An `Error` payload replaces the
/// content with `Error: <message>` and seals the message: later fragments are
/// dropped while the body drains. A transport error ends the stream with
/// `Err`, unless the message was already sealed.
pub(crate) async fn stream_answer(
    session: &Session,
    placeholder: MessageHandle,
    body: ByteStream,
) -> Result<()> {
    let mut events = pin!(decode_stream(body));
    let mut sealed = false;

    while let Some(event) = events.next().await {
        match event {
            Ok(StreamEvent::Answer(fragment)) if !sealed => {
                let written = session
                    .update(|state| state.append_to(placeholder, &fragment))
                    .await;
                if !written {
                    debug!(index = placeholder.index(), "Placeholder is gone, dropping fragment");
                }
            }
            Ok(StreamEvent::Answer(_)) => {
                debug!("Dropping fragment after error payload");
            }
            Ok(StreamEvent::Error(message)) => {
                if !sealed {
                    warn!(error = %message, "Answer stream reported an error");
                    let text = ClientError::stream_failed(message).to_string();
                    session
                        .update(|state| state.replace_message(placeholder, text))
                        .await;
                    sealed = true;
                }
            }
            Err(e) if sealed => {
                debug!(error = %e, "Stream broke after error payload");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
