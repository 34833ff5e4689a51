// # GitHub Release Source
//
// This crate provides the GitHub REST API implementation of `ReleaseSource`.
//
// ## Behavior
//
// - One HTTP request per `fetch` call: `GET /repos/{owner}/{project}/releases/latest`
// - HTTP timeout configured (30 seconds)
// - Rate-limit telemetry read from the `x-ratelimit-*` headers of every
//   response, including failed ones
// - Failures classified into primary rate limit, secondary rate limit,
//   unavailable and malformed
// - NO retry, backoff or sleeping: pacing is owned by `PollCoordinator`
//
// ## Security Requirements
//
// - The access token NEVER appears in logs or `Debug` output
// - Anonymous access works, with GitHub's lower quota
//
// ## API Reference
//
// - Latest release: https://docs.github.com/en/rest/releases/releases#get-the-latest-release
// - Rate limits: https://docs.github.com/en/rest/using-the-rest-api/rate-limits-for-the-rest-api

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ghrelnoty_core::config::{ReleaseSourceConfig, ReleaseSourceKind, Secret};
use ghrelnoty_core::error::{FetchError, RateLimitKind};
use ghrelnoty_core::traits::{
    FetchOutcome, RateLimitSnapshot, ReleaseObservation, ReleaseSource, ReleaseSourceFactory,
};
use ghrelnoty_core::{Error, Registry, Result};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use std::time::Duration;

/// Public GitHub API base URL
pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// REST API version pinned in every request
pub const GITHUB_API_VERSION: &str = "2022-11-28";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("ghrelnoty/", env!("CARGO_PKG_VERSION"));

/// Subset of the release payload that ends up in an observation
#[derive(Debug, Deserialize)]
struct LatestRelease {
    #[serde(default)]
    tag_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    documentation_url: Option<String>,
}

/// GitHub release source
///
/// Stateless and single-shot. The `Debug` implementation does NOT expose
/// the access token.
pub struct GithubSource {
    /// API base URL, without trailing slash
    api_url: String,

    /// Optional access token
    /// ⚠️ NEVER log this value
    token: Option<Secret>,

    /// HTTP client for API requests
    client: reqwest::Client,
}

impl std::fmt::Debug for GithubSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubSource")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

impl GithubSource {
    /// Create a new GitHub source
    ///
    /// # Parameters
    ///
    /// - `api_url`: API base URL (`https://api.github.com` or an Enterprise URL)
    /// - `token`: Optional access token; an empty token is treated as none
    pub fn new(api_url: impl Into<String>, token: Option<Secret>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        let api_url = api_url.into().trim_end_matches('/').to_string();
        if api_url.is_empty() {
            return Err(Error::config("GitHub api_url cannot be empty"));
        }

        Ok(Self {
            api_url,
            token: token.filter(|t| !t.is_empty()),
            client,
        })
    }

    /// Anonymous access to api.github.com
    pub fn anonymous() -> Result<Self> {
        Self::new(GITHUB_API_BASE, None)
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn latest_release_url(&self, owner: &str, project: &str) -> String {
        format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_url, owner, project
        )
    }
}

#[async_trait]
impl ReleaseSource for GithubSource {
    async fn fetch(&self, repository: &str) -> FetchOutcome {
        let Some((owner, project)) = split_repository(repository) else {
            return FetchOutcome::failed(
                FetchError::Unsupported(format!("expected owner/project, got '{}'", repository)),
                None,
            );
        };

        let url = self.latest_release_url(owner, project);
        tracing::debug!(repository, "Fetching latest release");

        let mut request = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return FetchOutcome::failed(
                    FetchError::Unavailable(format!("HTTP request failed: {}", e)),
                    None,
                );
            }
        };

        let rate_limit = parse_rate_limit(response.headers());
        let status = response.status();

        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            let error = classify_failure(status, &headers, &body);
            tracing::debug!(repository, %status, error = %error, "GitHub request failed");
            return FetchOutcome::failed(error, rate_limit);
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                return FetchOutcome::failed(
                    FetchError::Unavailable(format!("Failed to read response: {}", e)),
                    rate_limit,
                );
            }
        };

        match parse_release(repository, &text) {
            Ok(release) => FetchOutcome::ok(release, rate_limit),
            Err(error) => FetchOutcome::failed(error, rate_limit),
        }
    }

    fn supports_repository(&self, repository: &str) -> bool {
        split_repository(repository).is_some()
    }

    fn source_name(&self) -> &'static str {
        "github"
    }
}

/// Split `owner/project`; anything else is rejected
pub fn split_repository(identifier: &str) -> Option<(&str, &str)> {
    let (owner, project) = identifier.split_once('/')?;
    if owner.is_empty() || project.is_empty() || project.contains('/') {
        return None;
    }
    Some((owner, project))
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Read the `x-ratelimit-*` headers
///
/// `limit`, `remaining` and `reset` are required. When `used` is missing it
/// is derived from the other two.
pub fn parse_rate_limit(headers: &HeaderMap) -> Option<RateLimitSnapshot> {
    let limit = header_u64(headers, "x-ratelimit-limit")?;
    let remaining = header_u64(headers, "x-ratelimit-remaining")?;
    let reset = header_u64(headers, "x-ratelimit-reset")?;
    let used = header_u64(headers, "x-ratelimit-used")
        .unwrap_or_else(|| limit.saturating_sub(remaining));

    let reset_at: DateTime<Utc> = DateTime::from_timestamp(i64::try_from(reset).ok()?, 0)?;

    Some(RateLimitSnapshot {
        limit,
        remaining,
        used,
        reset_at,
    })
}

fn mentions_secondary_limit(body: &str) -> bool {
    let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
    [parsed.message, parsed.documentation_url]
        .into_iter()
        .flatten()
        .map(|text| text.to_lowercase())
        .any(|text| text.contains("secondary rate limit") || text.contains("secondary-rate-limit"))
}

/// Map a non-success response to a classified failure
pub fn classify_failure(status: StatusCode, headers: &HeaderMap, body: &str) -> FetchError {
    match status.as_u16() {
        403 | 429 => {
            if header_u64(headers, "x-ratelimit-remaining") == Some(0) {
                FetchError::RateLimited {
                    kind: RateLimitKind::Primary,
                }
            } else if headers.contains_key(RETRY_AFTER) || mentions_secondary_limit(body) {
                FetchError::RateLimited {
                    kind: RateLimitKind::Secondary,
                }
            } else {
                FetchError::Unavailable(format!("Access denied: {}", status))
            }
        }
        401 => FetchError::Unavailable(format!(
            "Authentication failed: invalid or expired token. Status: {}",
            status
        )),
        404 => FetchError::Unavailable(format!(
            "Repository not found or has no published release. Status: {}",
            status
        )),
        500..=599 => {
            FetchError::Unavailable(format!("GitHub server error (transient): {}", status))
        }
        _ => FetchError::Unavailable(format!("Unexpected response: {}", status)),
    }
}

/// Build an observation from a release payload
fn parse_release(
    repository: &str,
    text: &str,
) -> std::result::Result<ReleaseObservation, FetchError> {
    let release: LatestRelease = serde_json::from_str(text)
        .map_err(|e| FetchError::Malformed(format!("Failed to parse release: {}", e)))?;

    let version = [release.tag_name, release.name]
        .into_iter()
        .flatten()
        .find(|v| !v.is_empty())
        .ok_or_else(|| FetchError::Malformed("release has neither tag_name nor name".to_string()))?;

    Ok(ReleaseObservation::new(repository, version)
        .with_description(release.body.unwrap_or_default())
        .with_url(release.html_url.unwrap_or_default()))
}

/// Factory for creating GitHub sources
pub struct GithubFactory;

impl ReleaseSourceFactory for GithubFactory {
    fn create(&self, config: &ReleaseSourceConfig) -> Result<Box<dyn ReleaseSource>> {
        match config {
            ReleaseSourceConfig::Github { api_url, token } => {
                if token.is_none() {
                    tracing::warn!(
                        "No GitHub token configured; anonymous requests have a low rate limit"
                    );
                }
                Ok(Box::new(GithubSource::new(api_url.clone(), token.clone())?))
            }
        }
    }
}

/// Register the GitHub source with a registry
///
/// # Example
///
/// ```rust
/// use ghrelnoty_core::{Registry, ReleaseSourceKind};
///
/// let mut registry = Registry::new();
/// ghrelnoty_source_github::register(&mut registry);
/// assert!(registry.has_source(ReleaseSourceKind::Github));
/// ```
pub fn register(registry: &mut Registry) {
    registry.register_source(ReleaseSourceKind::Github, Box::new(GithubFactory));
}
