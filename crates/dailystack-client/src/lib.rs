//! DailyStack client core
//!
//! Waits for the backend's daily challenge, keeps the session state a front
//! end renders, and streams LLM answers into the chat transcript.

pub mod api;
pub mod chat;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod explanation;
pub mod models;
pub mod readiness;
pub mod session;
pub mod sse;


pub use api::{ApiClient, Backend, ByteStream, Endpoint};
pub use chat::{SendOutcome, CHAT_APOLOGY};
pub use config::{Config, View, CONFIG_FILE_NAME};
pub use controller::Controller;
pub use error::{ClientError, Result};
pub use events::{EventBroadcaster, SessionEvent};
pub use explanation::{compose_prompt, ExplanationOutcome, ExplanationRequest, EXPLANATION_APOLOGY};
pub use models::{
    ChatMessage, ChatRole, Credentials, Flashcard, Scenario, StatusReport, DEFAULT_CATEGORY,
};
pub use readiness::{poll_until_ready, PollPolicy, Readiness, FINISHED_WITH_NOTHING};
pub use session::{ExplanationPhase, MessageHandle, Session, SessionState};
pub use sse::{decode_stream, SseDecoder, StreamEvent};
