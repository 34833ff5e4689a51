//! Error types for the ghrelnoty system
//!
//! This module defines all error types used throughout the crate.

use std::fmt;
use thiserror::Error;

/// Result type alias for ghrelnoty operations
pub type Result<T> = std::result::Result<T, Error>;

/// Which upstream quota was exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitKind {
    /// The regular per-window request quota
    Primary,
    /// Secondary (abuse) limiting, applied independently of the quota
    Secondary,
}

impl fmt::Display for RateLimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitKind::Primary => f.write_str("primary"),
            RateLimitKind::Secondary => f.write_str("secondary"),
        }
    }
}

/// Classified failure of a single `ReleaseSource::fetch` call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Upstream refused the request because a rate limit was hit
    #[error("Rate limited: {kind}")]
    RateLimited {
        /// Which limit was hit
        kind: RateLimitKind,
    },

    /// Upstream could not be reached or answered with a failure status
    #[error("Release source unavailable: {0}")]
    Unavailable(String),

    /// Upstream answered but the payload could not be understood
    #[error("Malformed release data: {0}")]
    Malformed(String),

    /// The source cannot handle this repository identifier
    #[error("Unsupported repository: {0}")]
    Unsupported(String),
}

/// Core error type for the ghrelnoty system
#[derive(Error, Debug)]
pub enum Error {
    /// Version store errors
    #[error("Version store error: {0}")]
    Store(String),

    /// Destination key has no configured channel
    #[error("No channel configured for destination: {0}")]
    Routing(String),

    /// Notification channel reported a delivery failure
    #[error("Notification error ({channel}): {message}")]
    Notify {
        /// Channel name
        channel: String,
        /// Error message
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML deserialization errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Create a version store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a routing error
    pub fn routing(destination: impl Into<String>) -> Self {
        Self::Routing(destination.into())
    }

    /// Create a notification error
    pub fn notify(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Notify {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// redb reports failures through several error types; all of them are
/// store errors from the coordinator's point of view.
impl From<redb::Error> for Error {
    fn from(err: redb::Error) -> Self {
        Self::Store(err.to_string())
    }
}
