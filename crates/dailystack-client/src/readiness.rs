//! Waiting for the backend to finish generating the daily challenge.
//!
//! The backend generates the scenario and flashcards in the background after
//! it starts. [`poll_until_ready`] polls `GET /api/status` on a fixed interval
//! until the challenge is available, the backend reports an error, or the
//! attempt budget runs out.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::api::Backend;
use crate::error::ClientError;

/// Reason given when the backend stopped loading without producing data.
pub const FINISHED_WITH_NOTHING: &str = "finished with nothing";

/// Polling budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between two status requests.
    pub interval: Duration,
    /// Total number of status requests before giving up.
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            max_attempts: 60,
        }
    }
}

/// Result of waiting for the challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// The challenge is available.
    Ready,
    /// Still loading after every attempt.
    TimedOut {
        /// Number of status requests issued.
        attempts: u32,
    },
    /// The backend gave up.
    Failed {
        /// Reason reported by the backend.
        reason: String,
    },
}

impl Readiness {
    /// Returns `true` if the challenge is available.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Converts a non-ready outcome into the matching error.
    #[must_use]
    pub fn into_error(self) -> Option<ClientError> {
        match self {
            Self::Ready => None,
            Self::TimedOut { attempts } => Some(ClientError::readiness_timed_out(attempts)),
            Self::Failed { reason } => Some(ClientError::not_ready(reason)),
        }
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::TimedOut { attempts } => write!(f, "timed out after {attempts} attempts"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Polls the status endpoint until the challenge is ready.
///
/// Issues at most `policy.max_attempts` status requests, sleeping
/// `policy.interval` between them but not after the last one. Each response
/// is classified in order:
///
/// 1. a non-blank `error` fails immediately;
/// 2. not loading with data is ready;
/// 3. not loading without data fails with [`FINISHED_WITH_NOTHING`].
///
/// Anything else, including a request that could not be sent, counts as still
/// loading.
#[instrument(skip(backend), fields(max_attempts = policy.max_attempts))]
pub async fn poll_until_ready<B>(backend: &B, policy: PollPolicy) -> Readiness
where
    B: Backend + ?Sized,
{
    for attempt in 1..=policy.max_attempts {
        match backend.status().await {
            Ok(status) => {
                if let Some(error) = status.error_message() {
                    warn!(attempt, error, "Backend reported an error");
                    return Readiness::Failed {
                        reason: error.to_string(),
                    };
                }
                if !status.loading {
                    if status.has_data {
                        info!(attempt, "Daily challenge is ready");
                        return Readiness::Ready;
                    }
                    warn!(attempt, "Backend finished loading without data");
                    return Readiness::Failed {
                        reason: FINISHED_WITH_NOTHING.to_string(),
                    };
                }
                debug!(attempt, "Daily challenge still loading");
            }
            Err(e) => {
                debug!(attempt, error = %e, "Status request failed, still waiting");
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    warn!(attempts = policy.max_attempts, "Gave up waiting for the daily challenge");
    Readiness::TimedOut {
        attempts: policy.max_attempts,
    }
}

// ============================================================================
// Tests
// ============================================================================
