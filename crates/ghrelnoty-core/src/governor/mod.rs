//! Rate-limit pacing decisions
//!
//! [`RateLimitGovernor`] turns the telemetry of one fetch into a pause that
//! the coordinator sleeps before moving on. Upstream quotas are shared by
//! every repository polled from the same source, so a pause stalls the whole
//! sweep.
//!
//! There are two independent triggers:
//!
//! 1. **At risk**: more than 80% of the quota is used. The governor asks for
//!    a fixed cooldown regardless of how close to the limit usage is.
//! 2. **Rate limited**: the fetch failed with a classified rate-limit error.
//!    The governor asks for a pause until the upstream window resets.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::RateLimitKind;
use crate::traits::RateLimitSnapshot;

/// Cooldown applied when usage crosses the at-risk threshold
pub const AT_RISK_COOLDOWN: Duration = Duration::from_secs(30 * 60);

/// Why a pause was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    /// Quota usage is above the at-risk threshold
    AtRisk,
    /// The fetch was refused by a rate limit
    RateLimited(RateLimitKind),
}

/// A pacing decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pause {
    pub duration: Duration,
    pub reason: PauseReason,
}

/// Converts rate-limit telemetry into pauses
#[derive(Debug, Clone)]
pub struct RateLimitGovernor {
    at_risk_cooldown: Duration,
}

impl Default for RateLimitGovernor {
    fn default() -> Self {
        Self {
            at_risk_cooldown: AT_RISK_COOLDOWN,
        }
    }
}

impl RateLimitGovernor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the at-risk cooldown
    pub fn with_at_risk_cooldown(mut self, cooldown: Duration) -> Self {
        self.at_risk_cooldown = cooldown;
        self
    }

    /// Pause required by the snapshot alone, whether or not the fetch failed
    pub fn assess(&self, snapshot: Option<&RateLimitSnapshot>) -> Option<Pause> {
        snapshot.filter(|s| s.is_at_risk()).map(|_| Pause {
            duration: self.at_risk_cooldown,
            reason: PauseReason::AtRisk,
        })
    }

    /// Pause required after a fetch failed with a rate-limit error
    ///
    /// Sleeps until `reset_at`, never a negative duration. Without telemetry
    /// there is no reset time to wait for, so the at-risk cooldown is used.
    pub fn assess_rate_limited(
        &self,
        kind: RateLimitKind,
        snapshot: Option<&RateLimitSnapshot>,
        now: DateTime<Utc>,
    ) -> Pause {
        let duration = match snapshot {
            Some(s) => (s.reset_at - now).to_std().unwrap_or(Duration::ZERO),
            None => self.at_risk_cooldown,
        };

        Pause {
            duration,
            reason: PauseReason::RateLimited(kind),
        }
    }
}
