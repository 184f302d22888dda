//! Configuration for the DailyStack client.
//!
//! Settings live in an optional `dailystack.json` next to where the client
//! is started. Every field has a default, so an absent file or a partial one
//! is fine; command-line flags override the file afterwards.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};
use crate::readiness::PollPolicy;

/// The default config file name.
pub const CONFIG_FILE_NAME: &str = "dailystack.json";

/// Default backend address.
fn default_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

/// Default delay between status polls, in milliseconds.
const fn default_poll_interval_ms() -> u64 {
    1000
}

/// Default number of status polls before giving up.
const fn default_max_poll_attempts() -> u32 {
    60
}

/// Default timeout for JSON requests, in seconds.
const fn default_request_timeout_secs() -> u64 {
    30
}

/// Default connect timeout, in seconds.
const fn default_connect_timeout_secs() -> u64 {
    10
}

/// Default capacity of the session event channel.
const fn default_event_capacity() -> usize {
    256
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Base URL of the backend, without a trailing path.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Delay between status polls while the challenge is generated.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Number of status polls before reporting a timeout.
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Timeout applied to every JSON request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Timeout for establishing a connection, streaming requests included.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Number of session events buffered for slow subscribers.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// How the terminal front end renders the session.
    #[serde(default)]
    pub view: View,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            event_capacity: default_event_capacity(),
            view: View::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Returns the defaults when no `dailystack.json` exists there.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            ClientError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads `dailystack.json` from the given directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ConfigParseError` if the file cannot be read or is
    /// not valid JSON, and `ClientError::ConfigValidationError` if a value is
    /// out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(ClientError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| ClientError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ConfigValidationError` for the first bad value.
    pub fn validate(&self) -> Result<()> {
        let base_url = self.base_url.trim();
        if base_url.is_empty() {
            return Err(ClientError::config_validation(
                "baseUrl must not be empty",
                "Set baseUrl to the backend address, e.g. http://127.0.0.1:5000",
            ));
        }

        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::config_validation(
                format!("baseUrl '{base_url}' is not an http(s) URL"),
                "Prefix baseUrl with http:// or https://",
            ));
        }

        if self.max_poll_attempts == 0 {
            return Err(ClientError::config_validation(
                "maxPollAttempts must be greater than 0",
                "Set maxPollAttempts to at least 1 in your dailystack.json",
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(ClientError::config_validation(
                "requestTimeoutSecs must be greater than 0",
                "Set requestTimeoutSecs to at least 1 second in your dailystack.json",
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err(ClientError::config_validation(
                "connectTimeoutSecs must be greater than 0",
                "Set connectTimeoutSecs to at least 1 second in your dailystack.json",
            ));
        }

        if self.event_capacity == 0 {
            return Err(ClientError::config_validation(
                "eventCapacity must be greater than 0",
                "Set eventCapacity to at least 1 in your dailystack.json",
            ));
        }

        Ok(())
    }

    /// Returns the readiness polling budget.
    #[must_use]
    pub const fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_poll_attempts,
        }
    }
}

/// Rendering mode of the terminal front end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum View {
    /// Print text deltas as they arrive (default).
    #[default]
    Stream,
    /// Redraw the whole session after every change.
    Snapshot,
    /// Emit one JSON event per line.
    Json,
}

impl View {
    /// Returns the lowercase name used in config files and flags.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Snapshot => "snapshot",
            Self::Json => "json",
        }
    }
}

impl FromStr for View {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stream" => Ok(Self::Stream),
            "snapshot" => Ok(Self::Snapshot),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "invalid view '{s}': expected one of 'stream', 'snapshot', 'json'"
            )),
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for View {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for View {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}
