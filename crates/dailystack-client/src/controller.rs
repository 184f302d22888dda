//! User-facing actions on a session.
//!
//! [`Controller`] ties a [`Backend`] to a [`Session`]: every action talks to
//! the backend and records the outcome in the session, where front ends pick
//! it up through the event stream. Errors of the challenge loads are stored in
//! the session's error banner; chat and explanation failures become bot
//! messages instead.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::api::Backend;
use crate::chat::{self, SendOutcome};
use crate::error::Result;
use crate::explanation::{self, ExplanationOutcome, ExplanationRequest};
use crate::models::Credentials;
use crate::readiness::{poll_until_ready, PollPolicy, Readiness};
use crate::session::Session;

/// Drives one session against one backend.
///
/// Cloning is cheap and shares both the backend and the session, so a clone
/// can be moved into a spawned task.
#[derive(Debug)]
pub struct Controller<B: ?Sized> {
    backend: Arc<B>,
    session: Session,
    policy: PollPolicy,
}

impl<B: ?Sized> Clone for Controller<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            session: self.session.clone(),
            policy: self.policy,
        }
    }
}

impl<B> Controller<B>
where
    B: Backend + ?Sized,
{
    /// Creates a controller.
    #[must_use]
    pub const fn new(backend: Arc<B>, session: Session, policy: PollPolicy) -> Self {
        Self {
            backend,
            session,
            policy,
        }
    }

    /// The session this controller writes to.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// The backend this controller talks to.
    #[must_use]
    pub const fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    // ------------------------------------------------------------------------
    // Startup
    // ------------------------------------------------------------------------

    /// Returns whether LLM credentials are configured.
    ///
    /// Any failure to ask counts as "not authenticated".
    #[instrument(skip(self))]
    pub async fn check_auth(&self) -> bool {
        match self.backend.check_auth().await {
            Ok(authenticated) => authenticated,
            Err(e) => {
                warn!(error = %e, "Auth check failed");
                false
            }
        }
    }

    /// Stores LLM credentials on the backend.
    #[instrument(skip(self, credentials))]
    pub async fn save_credentials(&self, credentials: &Credentials) -> Result<()> {
        self.backend.save_credentials(credentials).await?;
        info!("Credentials saved");
        Ok(())
    }

    /// Waits for the daily challenge and loads it.
    ///
    /// On `Ready` the scenario and flashcard are fetched exactly once. On any
    /// other outcome the session shows the reason and stops loading.
    #[instrument(skip(self))]
    pub async fn await_ready(&self) -> Readiness {
        let readiness = poll_until_ready(self.backend.as_ref(), self.policy).await;

        if readiness.is_ready() {
            // Failures are already recorded in the session.
            if let Err(e) = self.load_daily_challenge().await {
                debug!(error = %e, "Daily challenge load failed after ready");
            }
        } else if let Some(error) = readiness.clone().into_error() {
            let message = error.to_string();
            self.session
                .update(|state| {
                    state.set_error(Some(message));
                    state.set_loading(false);
                })
                .await;
        }

        readiness
    }

    // ------------------------------------------------------------------------
    // Challenge
    // ------------------------------------------------------------------------

    /// Fetches the scenario and the current flashcard concurrently.
    ///
    /// The chat history of the card follows; failing to load it is logged
    /// but does not fail the load.
    #[instrument(skip(self))]
    pub async fn load_daily_challenge(&self) -> Result<()> {
        self.session
            .update(|state| {
                state.set_loading(true);
                state.set_error(None);
            })
            .await;

        let (scenario, flashcard) =
            tokio::join!(self.backend.scenario(), self.backend.current_flashcard());

        let result = match (scenario, flashcard) {
            (Ok(scenario), Ok(flashcard)) => {
                let has_card = flashcard.is_some();
                self.session
                    .update(|state| {
                        state.set_scenario(scenario);
                        state.set_flashcard(flashcard);
                    })
                    .await;
                if has_card {
                    // Logged by load_chat_history; the card is still usable.
                    if let Err(e) = self.load_chat_history().await {
                        debug!(error = %e, "Continuing without chat history");
                    }
                } else {
                    self.session
                        .update(|state| state.reset_messages(Vec::new()))
                        .await;
                }
                info!(has_card, "Daily challenge loaded");
                Ok(())
            }
            (Err(e), _) | (_, Err(e)) => Err(e),
        };

        self.finish_load(result).await
    }

    /// Flips answer visibility.
    ///
    /// Returns the explanation to run the first time the current card's
    /// answer is revealed; pass it to [`Controller::explain`].
    pub async fn toggle_answer(&self) -> Option<ExplanationRequest> {
        self.session.update(|state| state.toggle_answer()).await
    }

    /// Streams the explanation for a revealed card into the transcript.
    pub async fn explain(&self, request: ExplanationRequest) -> ExplanationOutcome {
        explanation::explain(self.backend.as_ref(), &self.session, request).await
    }

    /// Advances to the next flashcard and loads its chat history.
    #[instrument(skip(self))]
    pub async fn next_card(&self) -> Result<()> {
        self.session
            .update(|state| {
                state.set_loading(true);
                state.set_error(None);
                state.set_answer_revealed(false);
            })
            .await;

        let result = match self.backend.next_flashcard().await {
            Ok(flashcard) => {
                self.session
                    .update(|state| state.set_flashcard(flashcard))
                    .await;
                if let Err(e) = self.load_chat_history().await {
                    debug!(error = %e, "Continuing without chat history");
                }
                Ok(())
            }
            Err(e) => Err(e),
        };

        self.finish_load(result).await
    }

    /// Replaces the transcript with the backend's history for the current card.
    #[instrument(skip(self))]
    pub async fn load_chat_history(&self) -> Result<()> {
        match self.backend.chat_history().await {
            Ok(messages) => {
                info!(count = messages.len(), "Chat history loaded");
                self.session
                    .update(|state| state.reset_messages(messages))
                    .await;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to load chat history");
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Chat
    // ------------------------------------------------------------------------

    /// Sends a chat message and streams the answer.
    pub async fn send(&self, text: &str) -> SendOutcome {
        chat::send(self.backend.as_ref(), &self.session, text).await
    }

    async fn finish_load(&self, result: Result<()>) -> Result<()> {
        let error = result.as_ref().err().map(ToString::to_string);
        if let Some(error) = &error {
            warn!(error = %error, "Load failed");
        }
        self.session
            .update(|state| {
                if error.is_some() {
                    state.set_error(error);
                }
                state.set_loading(false);
            })
            .await;
        result
    }
}

// ============================================================================
// Tests
// ============================================================================
