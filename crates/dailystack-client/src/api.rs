//! HTTP transport for the DailyStack backend.
//!
//! Every backend endpoint is one method on the [`Backend`] trait. The
//! production implementation, [`ApiClient`], issues the requests with
//! `reqwest`; the controller only ever sees the trait, so tests can drive it
//! with a scripted backend instead.
//!
//! # Endpoints
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | GET | `/api/status` | Generation progress |
//! | GET | `/api/scenario` | Today's scenario |
//! | GET | `/api/flashcard/current` | Current flashcard |
//! | POST | `/api/flashcard/next` | Advance to the next flashcard |
//! | GET | `/api/chat/history` | Chat transcript for the current card |
//! | POST | `/api/ask-llm` | Streamed answer (`text/event-stream`) |
//! | GET | `/check-auth` | Whether LLM credentials are configured |
//! | POST | `/save-credentials` | Store LLM credentials |

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::Config;
use crate::error::{ClientError, Result};
use crate::models::{
    ChatMessage, Credentials, Flashcard, FlashcardPayload, Scenario, ScenarioPayload, StatusReport,
};

/// Raw body chunks of a streamed answer, in arrival order.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

// ============================================================================
// Endpoints
// ============================================================================

/// A backend endpoint.
///
/// `Display` renders the action phrase used in error messages, so that
/// `RequestFailed` reads "Failed to fetch scenario (HTTP 500)".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `GET /api/status`
    Status,
    /// `GET /api/scenario`
    Scenario,
    /// `GET /api/flashcard/current`
    CurrentFlashcard,
    /// `POST /api/flashcard/next`
    NextFlashcard,
    /// `GET /api/chat/history`
    ChatHistory,
    /// `POST /api/ask-llm`
    AskLlm,
    /// `GET /check-auth`
    CheckAuth,
    /// `POST /save-credentials`
    SaveCredentials,
}

impl Endpoint {
    /// Returns the request path, relative to the base URL.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Status => "/api/status",
            Self::Scenario => "/api/scenario",
            Self::CurrentFlashcard => "/api/flashcard/current",
            Self::NextFlashcard => "/api/flashcard/next",
            Self::ChatHistory => "/api/chat/history",
            Self::AskLlm => "/api/ask-llm",
            Self::CheckAuth => "/check-auth",
            Self::SaveCredentials => "/save-credentials",
        }
    }

    /// Returns the HTTP method used by the endpoint.
    #[must_use]
    pub fn method(self) -> Method {
        match self {
            Self::NextFlashcard | Self::AskLlm | Self::SaveCredentials => Method::POST,
            _ => Method::GET,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self {
            Self::Status => "check status",
            Self::Scenario => "fetch scenario",
            Self::CurrentFlashcard => "fetch flashcard",
            Self::NextFlashcard => "fetch next flashcard",
            Self::ChatHistory => "fetch chat history",
            Self::AskLlm => "ask the LLM",
            Self::CheckAuth => "check authentication",
            Self::SaveCredentials => "save credentials",
        };
        f.write_str(action)
    }
}

// ============================================================================
// Backend trait
// ============================================================================

/// The operations the client needs from the backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Reports whether the daily challenge is still being generated.
    async fn status(&self) -> Result<StatusReport>;

    /// Fetches today's scenario, `None` when none has been generated yet.
    async fn scenario(&self) -> Result<Option<Scenario>>;

    /// Fetches the current flashcard, `None` when there is no card.
    async fn current_flashcard(&self) -> Result<Option<Flashcard>>;

    /// Advances to the next flashcard and returns it.
    async fn next_flashcard(&self) -> Result<Option<Flashcard>>;

    /// Fetches the chat transcript for the current flashcard.
    async fn chat_history(&self) -> Result<Vec<ChatMessage>>;

    /// Asks the LLM a question and returns the raw event-stream body.
    ///
    /// Hidden questions are not recorded in the visible transcript.
    async fn ask(&self, question: &str, hidden: bool) -> Result<ByteStream>;

    /// Returns whether LLM credentials are configured on the backend.
    async fn check_auth(&self) -> Result<bool>;

    /// Stores LLM credentials on the backend.
    async fn save_credentials(&self, credentials: &Credentials) -> Result<()>;
}

// ============================================================================
// Wire bodies
// ============================================================================

/// Body of `POST /api/ask-llm`.
#[derive(Debug, Serialize)]
struct AskRequest<'a> {
    question: &'a str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    hidden: bool,
}

/// Body of `GET /check-auth`.
#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(default)]
    authenticated: bool,
}

// ============================================================================
// reqwest implementation
// ============================================================================

/// [`Backend`] over HTTP.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl ApiClient {
    /// Creates a client for the backend at `base_url`.
    ///
    /// `connect_timeout` applies to every request. `request_timeout` bounds
    /// the JSON endpoints only; answer streams run for as long as the LLM
    /// keeps talking.
    pub fn new(
        base_url: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            request_timeout,
        })
    }

    /// Creates a client from the loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Returns the base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    fn request(&self, endpoint: Endpoint) -> reqwest::RequestBuilder {
        self.http
            .request(endpoint.method(), self.url(endpoint))
            .timeout(self.request_timeout)
    }

    async fn fetch_json<T: DeserializeOwned>(&self, endpoint: Endpoint) -> Result<T> {
        let response = self.request(endpoint).send().await?;
        read_json(endpoint, response).await
    }
}

/// Fails with `RequestFailed` unless the response has a 2xx status.
fn ensure_success(endpoint: Endpoint, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ClientError::request_failed(endpoint, status.as_u16()))
    }
}

async fn read_json<T: DeserializeOwned>(endpoint: Endpoint, response: Response) -> Result<T> {
    let response = ensure_success(endpoint, response)?;
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| ClientError::decode(endpoint, e.to_string()))
}

#[async_trait]
impl Backend for ApiClient {
    #[instrument(skip(self))]
    async fn status(&self) -> Result<StatusReport> {
        let status: StatusReport = self.fetch_json(Endpoint::Status).await?;
        debug!(
            loading = status.loading,
            has_data = status.has_data,
            "Status polled"
        );
        Ok(status)
    }

    #[instrument(skip(self))]
    async fn scenario(&self) -> Result<Option<Scenario>> {
        let payload: ScenarioPayload = self.fetch_json(Endpoint::Scenario).await?;
        Ok(payload.into_scenario())
    }

    #[instrument(skip(self))]
    async fn current_flashcard(&self) -> Result<Option<Flashcard>> {
        let payload: FlashcardPayload = self.fetch_json(Endpoint::CurrentFlashcard).await?;
        Ok(payload.into_flashcard())
    }

    #[instrument(skip(self))]
    async fn next_flashcard(&self) -> Result<Option<Flashcard>> {
        let payload: FlashcardPayload = self.fetch_json(Endpoint::NextFlashcard).await?;
        Ok(payload.into_flashcard())
    }

    #[instrument(skip(self))]
    async fn chat_history(&self) -> Result<Vec<ChatMessage>> {
        self.fetch_json(Endpoint::ChatHistory).await
    }

    #[instrument(skip(self, question), fields(question_len = question.len()))]
    async fn ask(&self, question: &str, hidden: bool) -> Result<ByteStream> {
        let endpoint = Endpoint::AskLlm;
        let response = self
            .http
            .request(endpoint.method(), self.url(endpoint))
            .json(&AskRequest { question, hidden })
            .send()
            .await?;
        let response = ensure_success(endpoint, response)?;
        debug!("Answer stream opened");

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ClientError::from))
            .boxed())
    }

    #[instrument(skip(self))]
    async fn check_auth(&self) -> Result<bool> {
        let auth: AuthResponse = self.fetch_json(Endpoint::CheckAuth).await?;
        Ok(auth.authenticated)
    }

    #[instrument(skip(self, credentials))]
    async fn save_credentials(&self, credentials: &Credentials) -> Result<()> {
        let endpoint = Endpoint::SaveCredentials;
        let response = self.request(endpoint).json(credentials).send().await?;
        ensure_success(endpoint, response)?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
