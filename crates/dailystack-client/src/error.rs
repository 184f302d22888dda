//! Error types for the DailyStack client.
//!
//! This module defines the error hierarchy for all client operations,
//! including backend transport, readiness polling, streamed answers and
//! configuration loading.

use std::path::PathBuf;

use crate::api::Endpoint;

/// A specialized `Result` type for DailyStack client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur while talking to the DailyStack backend.
///
/// Variants are grouped by subsystem. Transport and stream errors that occur
/// while answering in the chat are turned into chat text by the controller and
/// never reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// The backend answered with a non-success status code.
    #[error("Failed to {endpoint} (HTTP {status})")]
    RequestFailed {
        /// The endpoint that was called.
        endpoint: Endpoint,
        /// The HTTP status code returned.
        status: u16,
    },

    /// The request could not be sent or the connection broke mid-response.
    #[error("Failed to reach server: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body was not the JSON shape the endpoint promises.
    #[error("Failed to {endpoint}: unexpected response ({message})")]
    Decode {
        /// The endpoint whose body could not be decoded.
        endpoint: Endpoint,
        /// Description of the decode failure.
        message: String,
    },

    // ========================================================================
    // Readiness Errors
    // ========================================================================
    /// The backend reported an error or finished loading without data.
    #[error("Daily challenge unavailable: {reason}")]
    NotReady {
        /// Reason reported by the backend.
        reason: String,
    },

    /// The backend was still loading after the whole polling budget.
    #[error("Timed out waiting for the daily challenge after {attempts} attempts\n\nSuggestion: Check that the backend is running and has valid credentials")]
    ReadinessTimedOut {
        /// Number of status requests issued.
        attempts: u32,
    },

    // ========================================================================
    // Stream Errors
    // ========================================================================
    /// The answer stream carried an explicit error payload.
    #[error("Error: {message}")]
    StreamFailed {
        /// Message carried by the error payload.
        message: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your dailystack.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Creates a new `RequestFailed` error.
    #[must_use]
    pub const fn request_failed(endpoint: Endpoint, status: u16) -> Self {
        Self::RequestFailed { endpoint, status }
    }

    /// Creates a new `Decode` error.
    #[must_use]
    pub fn decode(endpoint: Endpoint, message: impl Into<String>) -> Self {
        Self::Decode {
            endpoint,
            message: message.into(),
        }
    }

    /// Creates a new `NotReady` error.
    #[must_use]
    pub fn not_ready(reason: impl Into<String>) -> Self {
        Self::NotReady {
            reason: reason.into(),
        }
    }

    /// Creates a new `ReadinessTimedOut` error.
    #[must_use]
    pub const fn readiness_timed_out(attempts: u32) -> Self {
        Self::ReadinessTimedOut { attempts }
    }

    /// Creates a new `StreamFailed` error.
    #[must_use]
    pub fn stream_failed(message: impl Into<String>) -> Self {
        Self::StreamFailed {
            message: message.into(),
        }
    }

    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Returns `true` if this error is transient and a later attempt may succeed.
    ///
    /// Server-side failures (5xx) and connection problems are transient;
    /// client errors and malformed bodies are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed { status, .. } => *status >= 500,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::ReadinessTimedOut { .. } => true,
            _ => false,
        }
    }
}
