//! Configuration types for the ghrelnoty system
//!
//! This module defines all configuration structures used throughout the crate.
//! The daemon reads them from a YAML file; library users can build them in code.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Maximum log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Port of the metrics/health HTTP endpoint
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Interval between sweeps (in seconds)
    #[serde(default = "default_check_every_secs")]
    pub check_every_secs: u64,

    /// Delay before each repository fetch (in seconds)
    #[serde(default = "default_sleep_between_secs")]
    pub sleep_between_secs: u64,

    /// Capacity of the poll event channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Version store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Release sources, at most one per kind
    #[serde(default = "default_sources")]
    pub sources: Vec<ReleaseSourceConfig>,

    /// Repositories to watch, polled in this order
    #[serde(default)]
    pub repositories: Vec<RepositoryTarget>,

    /// Notification channels keyed by destination name
    #[serde(default)]
    pub destinations: BTreeMap<String, ChannelConfig>,
}

impl AppConfig {
    /// Parse a configuration from YAML text
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Read and parse a YAML configuration file
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.repositories.is_empty() {
            return Err(Error::config("No repositories configured"));
        }
        if self.check_every_secs == 0 {
            return Err(Error::config("check_every_secs must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::config("event_channel_capacity must be > 0"));
        }

        self.store.validate()?;

        let mut seen_kinds = Vec::new();
        for source in &self.sources {
            source.validate()?;
            if seen_kinds.contains(&source.kind()) {
                return Err(Error::config(format!(
                    "Release source '{}' configured more than once",
                    source.kind()
                )));
            }
            seen_kinds.push(source.kind());
        }

        for (name, channel) in &self.destinations {
            channel
                .validate()
                .map_err(|e| Error::config(format!("Destination '{}': {}", name, e)))?;
        }

        for repo in &self.repositories {
            if repo.identifier.trim().is_empty() {
                return Err(Error::config("Repository name cannot be empty"));
            }
            if !self.destinations.contains_key(&repo.destination_key) {
                return Err(Error::config(format!(
                    "Repository '{}' uses unknown destination '{}'",
                    repo.identifier, repo.destination_key
                )));
            }
            if !seen_kinds.contains(&repo.source) {
                return Err(Error::config(format!(
                    "Repository '{}' uses release source '{}' which is not configured",
                    repo.identifier, repo.source
                )));
            }
        }

        Ok(())
    }

    /// Settings for the poll loop derived from this configuration
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            repositories: self.repositories.clone(),
            tick_interval: Duration::from_secs(self.check_every_secs),
            per_repo_delay: Duration::from_secs(self.sleep_between_secs),
            event_channel_capacity: self.event_channel_capacity,
        }
    }
}

/// Runtime settings consumed by `PollCoordinator`
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Repositories in sweep order
    pub repositories: Vec<RepositoryTarget>,
    /// Period of the sweep timer
    pub tick_interval: Duration,
    /// Unconditional pause before each repository
    pub per_repo_delay: Duration,
    /// Capacity of the poll event channel
    pub event_channel_capacity: usize,
}

impl PollerConfig {
    /// Create settings with the default cadence for the given repositories
    pub fn new(repositories: Vec<RepositoryTarget>) -> Self {
        Self {
            repositories,
            tick_interval: Duration::from_secs(default_check_every_secs()),
            per_repo_delay: Duration::from_secs(default_sleep_between_secs()),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn with_per_repo_delay(mut self, per_repo_delay: Duration) -> Self {
        self.per_repo_delay = per_repo_delay;
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.repositories.is_empty() {
            return Err(Error::config("No repositories configured"));
        }
        if self.tick_interval.is_zero() {
            return Err(Error::config("Tick interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

/// A monitored repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryTarget {
    /// Identifier understood by the release source (e.g. "owner/project")
    #[serde(rename = "name")]
    pub identifier: String,

    /// Key into the destinations map
    #[serde(rename = "destination")]
    pub destination_key: String,

    /// Which release source answers for this repository
    #[serde(default)]
    pub source: ReleaseSourceKind,
}

impl RepositoryTarget {
    /// Create a target served by the default (GitHub) source
    pub fn new(identifier: impl Into<String>, destination_key: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            destination_key: destination_key.into(),
            source: ReleaseSourceKind::default(),
        }
    }

    /// Set the release source kind
    pub fn with_source(mut self, source: ReleaseSourceKind) -> Self {
        self.source = source;
        self
    }
}

/// Closed set of release source implementations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseSourceKind {
    /// GitHub REST API
    #[default]
    Github,
}

impl fmt::Display for ReleaseSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseSourceKind::Github => f.write_str("github"),
        }
    }
}

/// Closed set of notification channel implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Email over SMTP
    Smtp,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Smtp => f.write_str("smtp"),
        }
    }
}

/// A credential that never shows up in `Debug` output
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value; only pass it to the upstream that needs it
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<REDACTED>")
    }
}

/// Release source configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReleaseSourceConfig {
    /// GitHub REST API
    Github {
        /// API base URL (GitHub Enterprise uses a different one)
        #[serde(default = "default_github_api_url")]
        api_url: String,
        /// Optional access token; anonymous requests get a lower quota
        #[serde(default)]
        token: Option<Secret>,
    },
}

impl ReleaseSourceConfig {
    /// Anonymous access to api.github.com
    pub fn github() -> Self {
        ReleaseSourceConfig::Github {
            api_url: default_github_api_url(),
            token: None,
        }
    }

    /// The kind of source this configures
    pub fn kind(&self) -> ReleaseSourceKind {
        match self {
            ReleaseSourceConfig::Github { .. } => ReleaseSourceKind::Github,
        }
    }

    /// Validate the source configuration
    pub fn validate(&self) -> Result<()> {
        match self {
            ReleaseSourceConfig::Github { api_url, .. } => {
                if !api_url.starts_with("https://") && !api_url.starts_with("http://") {
                    return Err(Error::config(format!(
                        "GitHub api_url must use HTTP or HTTPS scheme. Got: {}",
                        api_url
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Transport security for SMTP
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS
    #[default]
    Starttls,
    /// TLS from the first byte (usually port 465)
    Tls,
    /// No encryption; local relays only
    None,
}

/// Notification channel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelConfig {
    /// Email over SMTP
    Smtp {
        from: String,
        to: String,
        host: String,
        #[serde(default = "default_smtp_port")]
        port: u16,
        /// Login name; `from` is used when empty
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: Secret,
        #[serde(default)]
        security: SmtpSecurity,
    },
}

impl ChannelConfig {
    /// The kind of channel this configures
    pub fn kind(&self) -> ChannelKind {
        match self {
            ChannelConfig::Smtp { .. } => ChannelKind::Smtp,
        }
    }

    /// Validate the channel configuration
    pub fn validate(&self) -> Result<()> {
        match self {
            ChannelConfig::Smtp { from, to, host, .. } => {
                if host.is_empty() {
                    return Err(Error::config("SMTP host cannot be empty"));
                }
                if from.is_empty() {
                    return Err(Error::config("SMTP from address cannot be empty"));
                }
                if to.is_empty() {
                    return Err(Error::config("SMTP to address cannot be empty"));
                }
                Ok(())
            }
        }
    }
}

/// Version store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// redb database file
    Redb {
        /// Path to the database file
        path: String,
    },

    /// In-memory store (not persistent)
    Memory,
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<()> {
        match self {
            StoreConfig::Redb { path } if path.is_empty() => {
                Err(Error::config("Store path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Redb {
            path: default_store_path(),
        }
    }
}

/// Log verbosity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_check_every_secs() -> u64 {
    3600
}

fn default_sleep_between_secs() -> u64 {
    5
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_sources() -> Vec<ReleaseSourceConfig> {
    vec![ReleaseSourceConfig::github()]
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_store_path() -> String {
    "ghrelnoty.redb".to_string()
}
