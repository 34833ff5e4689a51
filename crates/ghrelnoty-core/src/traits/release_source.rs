// # Release Source Trait
//
// Defines the interface for asking an upstream service what the latest
// release of a repository is.
//
// ## Implementations
//
// - GitHub REST API: `ghrelnoty-source-github` crate
//
// ## Usage
//
// ```rust,ignore
// use ghrelnoty_core::ReleaseSource;
//
// let outcome = source.fetch("acme/widget").await;
// if let Some(rate_limit) = &outcome.rate_limit {
//     println!("used {} of {}", rate_limit.used, rate_limit.limit);
// }
// match outcome.result {
//     Ok(release) => println!("latest: {}", release.version),
//     Err(e) => eprintln!("fetch failed: {}", e),
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::FetchError;

/// Fraction of the quota above which the poller backs off
pub const AT_RISK_THRESHOLD: f64 = 0.8;

/// The latest release of a repository as seen by a source
///
/// Only `version` is persisted; the rest is display metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseObservation {
    /// Identifier of the repository this release belongs to
    pub repository: String,
    /// Opaque version token, compared by exact equality only
    pub version: String,
    /// Release notes, may be empty
    pub description: String,
    /// Link to the release page, may be empty
    pub url: String,
}

impl ReleaseObservation {
    /// Create an observation without display metadata
    pub fn new(repository: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            version: version.into(),
            description: String::new(),
            url: String::new(),
        }
    }

    /// Attach release notes
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Attach the release page link
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

/// Upstream quota usage read from a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub limit: u64,
    pub remaining: u64,
    pub used: u64,
    /// When the current window resets
    pub reset_at: DateTime<Utc>,
}

impl RateLimitSnapshot {
    /// Fraction of the quota consumed, `None` when `limit` is zero
    pub fn used_fraction(&self) -> Option<f64> {
        if self.limit == 0 {
            return None;
        }
        Some(self.used as f64 / self.limit as f64)
    }

    /// True when strictly more than 80% of the quota is used
    pub fn is_at_risk(&self) -> bool {
        self.used_fraction()
            .is_some_and(|fraction| fraction > AT_RISK_THRESHOLD)
    }
}

/// Result of one fetch, with telemetry that is present even on failure
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub result: Result<ReleaseObservation, FetchError>,
    pub rate_limit: Option<RateLimitSnapshot>,
}

impl FetchOutcome {
    /// A successful fetch
    pub fn ok(release: ReleaseObservation, rate_limit: Option<RateLimitSnapshot>) -> Self {
        Self {
            result: Ok(release),
            rate_limit,
        }
    }

    /// A failed fetch
    pub fn failed(error: FetchError, rate_limit: Option<RateLimitSnapshot>) -> Self {
        Self {
            result: Err(error),
            rate_limit,
        }
    }
}

/// Trait for release source implementations
///
/// Sources are stateless adapters around an upstream API. They make one
/// request per `fetch` and report what happened; they never sleep, retry or
/// decide anything about pacing. The `PollCoordinator` owns all of that.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Fetch the latest release of `repository`
    ///
    /// Never panics on upstream failure; failures are classified into
    /// [`FetchError`] and returned alongside whatever rate-limit telemetry
    /// could be read from the response.
    async fn fetch(&self, repository: &str) -> FetchOutcome;

    /// Whether this source can handle the identifier at all
    fn supports_repository(&self, repository: &str) -> bool;

    /// Source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing release sources from configuration
pub trait ReleaseSourceFactory: Send + Sync {
    /// Create a ReleaseSource instance from configuration
    fn create(
        &self,
        config: &crate::config::ReleaseSourceConfig,
    ) -> Result<Box<dyn ReleaseSource>, crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(limit: u64, used: u64) -> RateLimitSnapshot {
        RateLimitSnapshot {
            limit,
            remaining: limit.saturating_sub(used),
            used,
            reset_at: Utc::now(),
        }
    }

    #[test]
    fn test_at_risk_boundary_is_exclusive() {
        assert!(snapshot(100, 81).is_at_risk());
        assert!(!snapshot(100, 80).is_at_risk());
    }

    #[test]
    fn test_used_fraction() {
        assert_eq!(snapshot(60, 0).used_fraction(), Some(0.0));
        assert_eq!(snapshot(100, 90).used_fraction(), Some(0.9));
    }

    #[test]
    fn test_zero_limit_is_guarded() {
        let s = snapshot(0, 5);
        assert_eq!(s.used_fraction(), None);
        assert!(!s.is_at_risk());
    }

    #[test]
    fn test_observation_builder() {
        let release = ReleaseObservation::new("acme/widget", "v1.0.0")
            .with_description("notes")
            .with_url("https://example.com/v1.0.0");

        assert_eq!(release.repository, "acme/widget");
        assert_eq!(release.version, "v1.0.0");
        assert_eq!(release.description, "notes");
        assert_eq!(release.url, "https://example.com/v1.0.0");
    }
}
