//! Poll-detect-notify loop
//!
//! The PollCoordinator is responsible for:
//! - Sweeping all configured repositories on a fixed timer
//! - Pacing requests and honouring upstream rate limits
//! - Detecting new versions through the VersionStore compare-and-set
//! - Routing new releases to their notification channel
//!
//! ## Architecture
//!
//! ```text
//!           tick
//!             │
//!             ▼
//!     ┌────────────────┐   fetch    ┌───────────────┐
//!     │PollCoordinator │──────────▶│ ReleaseSource │
//!     └────────────────┘            └───────────────┘
//!             │  ▲
//!             │  └── RateLimitGovernor (pause?)
//!             │
//!     ┌───────┴────────────────┬─────────────────────────┐
//!     ▼                        ▼                         ▼
//! ┌──────────────┐   ┌─────────────────────┐   ┌─────────────┐
//! │ VersionStore │   │ NotificationChannel │   │   Events    │
//! │ (CAS)        │   │ (notify)            │   │  + Metrics  │
//! └──────────────┘   └─────────────────────┘   └─────────────┘
//! ```
//!
//! ## Per-repository flow
//!
//! 1. Sleep the per-repository delay
//! 2. Fetch the latest release
//! 3. Pause for the at-risk cooldown if quota usage is above 80%
//! 4. On failure: count it, pause until reset if rate limited, move on
//! 5. Compare-and-set the version; a store failure skips the notification
//! 6. If changed, notify the repository's destination channel
//!
//! Repositories are processed strictly in configuration order, one at a
//! time. No failure for one repository aborts the sweep.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use crate::config::{PollerConfig, ReleaseSourceKind, RepositoryTarget};
use crate::error::{Error, FetchError, RateLimitKind, Result};
use crate::governor::{Pause, RateLimitGovernor};
use crate::metrics::Metrics;
use crate::traits::{NotificationChannel, ReleaseObservation, ReleaseSource, VersionStore};

/// Release sources keyed by the kind they serve
pub type SourceMap = HashMap<ReleaseSourceKind, Box<dyn ReleaseSource>>;

/// Notification channels keyed by destination name
pub type ChannelMap = HashMap<String, Box<dyn NotificationChannel>>;

/// Events emitted by the PollCoordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    /// Coordinator started
    Started { repositories: usize },

    /// A sweep began
    SweepStarted { sweep: u64 },

    /// A sweep went through every repository
    SweepCompleted { sweep: u64, notified: usize },

    /// A sweep was requested while another one was running
    SweepSkipped,

    /// Quota usage crossed the at-risk threshold
    RateLimitRisk {
        repository: String,
        used: u64,
        limit: u64,
        pause: Duration,
    },

    /// A fetch was refused by a rate limit
    RateLimited {
        repository: String,
        kind: RateLimitKind,
        pause: Duration,
    },

    /// A fetch failed for any other reason
    FetchFailed { repository: String, error: String },

    /// A version differed from the stored one
    NewRelease { repository: String, version: String },

    /// The stored version was already current
    Unchanged { repository: String, version: String },

    /// The version store failed; no notification was sent
    StoreFailed { repository: String, error: String },

    /// No channel is configured for the repository's destination
    RoutingFailed {
        repository: String,
        destination: String,
    },

    /// A notification was delivered
    Notified {
        repository: String,
        version: String,
        destination: String,
    },

    /// A notification channel reported a failure
    NotifyFailed {
        repository: String,
        destination: String,
        error: String,
    },

    /// Coordinator stopped
    Stopped { reason: String },
}

/// What happened to one repository during a sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoOutcome {
    /// The fetch failed; nothing else was attempted
    FetchFailed { error: FetchError },

    /// The fetch was rate limited and the sweep paused until reset
    RateLimited { kind: RateLimitKind, pause: Duration },

    /// The version matched the stored one
    Unchanged { version: String },

    /// The compare-and-set failed; no notification was sent
    StoreFailed { version: String, error: String },

    /// The version changed but the destination has no channel
    RoutingFailed { version: String, destination: String },

    /// The version changed and the channel accepted the notification
    Notified { version: String, destination: String },

    /// The version changed but the channel failed
    NotifyFailed {
        version: String,
        destination: String,
        error: String,
    },

    /// Cancellation arrived while waiting on this repository
    Interrupted,
}

/// Outcome of one repository within a sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoReport {
    pub repository: String,
    pub outcome: RepoOutcome,
}

/// Result of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Per-repository outcomes, in processing order
    pub repositories: Vec<RepoReport>,
    /// The sweep did not run because another one held the guard
    pub skipped: bool,
    /// The sweep stopped early at a suspension point
    pub cancelled: bool,
}

impl SweepReport {
    /// Report for a sweep that did not run
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    /// Outcome for a repository, if it was reached
    pub fn outcome_for(&self, repository: &str) -> Option<&RepoOutcome> {
        self.repositories
            .iter()
            .find(|r| r.repository == repository)
            .map(|r| &r.outcome)
    }

    /// Number of notifications delivered
    pub fn notified(&self) -> usize {
        self.repositories
            .iter()
            .filter(|r| matches!(r.outcome, RepoOutcome::Notified { .. }))
            .count()
    }
}

/// Drives the sweep-notify cycle until cancelled
///
/// ## Lifecycle
///
/// 1. Create with [`PollCoordinator::new()`]
/// 2. Start with [`PollCoordinator::run()`] or [`PollCoordinator::spawn()`]
/// 3. Cancel the token to stop; the version store is closed on the way out
///
/// ## Threading
///
/// Everything runs on one task. Sweeps never overlap: they run inline in the
/// timer loop, and [`PollCoordinator::run_sweep()`] additionally refuses to
/// start while another sweep holds the guard.
pub struct PollCoordinator {
    repositories: Vec<RepositoryTarget>,
    tick_interval: Duration,
    per_repo_delay: Duration,
    sources: SourceMap,
    store: Arc<dyn VersionStore>,
    channels: ChannelMap,
    governor: RateLimitGovernor,
    metrics: Arc<Metrics>,
    span: tracing::Span,
    sweep_guard: Mutex<()>,
    sweep_count: AtomicU64,
    event_tx: mpsc::Sender<PollEvent>,
}

impl PollCoordinator {
    /// Create a new coordinator
    ///
    /// # Returns
    ///
    /// A tuple of (coordinator, event_receiver) where event_receiver yields
    /// poll events. Dropping the receiver is fine; events are then discarded.
    pub fn new(
        config: PollerConfig,
        sources: SourceMap,
        store: Arc<dyn VersionStore>,
        channels: ChannelMap,
        metrics: Arc<Metrics>,
    ) -> Result<(Self, mpsc::Receiver<PollEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let coordinator = Self {
            repositories: config.repositories,
            tick_interval: config.tick_interval,
            per_repo_delay: config.per_repo_delay,
            sources,
            store,
            channels,
            governor: RateLimitGovernor::default(),
            metrics,
            span: tracing::info_span!("poll_coordinator"),
            sweep_guard: Mutex::new(()),
            sweep_count: AtomicU64::new(0),
            event_tx: tx,
        };

        Ok((coordinator, rx))
    }

    /// Replace the rate-limit governor
    pub fn with_governor(mut self, governor: RateLimitGovernor) -> Self {
        self.governor = governor;
        self
    }

    /// Run the loop under `span` instead of the default one
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn repositories(&self) -> &[RepositoryTarget] {
        &self.repositories
    }

    /// Run sweeps on the timer until `shutdown` is cancelled
    ///
    /// The first sweep starts immediately. On exit the version store is
    /// closed and its result returned.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let span = self.span.clone();
        self.run_internal(shutdown).instrument(span).await
    }

    /// Move the coordinator onto its own task
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run_internal(&self, shutdown: CancellationToken) -> Result<()> {
        info!(
            repositories = self.repositories.len(),
            interval_secs = self.tick_interval.as_secs(),
            "Poll coordinator started"
        );
        self.emit_event(PollEvent::Started {
            repositories: self.repositories.len(),
        });

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                _ = ticker.tick() => {
                    let report = self.sweep(&shutdown).await;
                    if report.cancelled {
                        break;
                    }
                }
            }
        }

        info!("Shutdown requested, stopping poll coordinator");
        self.emit_event(PollEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });

        match self.store.close().await {
            Ok(()) => {
                info!("Version store closed, coordinator stopped");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to close version store");
                Err(e)
            }
        }
    }

    /// Execute one sweep over every repository
    pub async fn run_sweep(&self) -> SweepReport {
        self.sweep(&CancellationToken::new()).await
    }

    /// Execute one sweep, stopping at the next suspension point once
    /// `shutdown` is cancelled
    pub async fn run_sweep_until(&self, shutdown: &CancellationToken) -> SweepReport {
        self.sweep(shutdown).await
    }

    async fn sweep(&self, shutdown: &CancellationToken) -> SweepReport {
        let Ok(_guard) = self.sweep_guard.try_lock() else {
            warn!("Previous sweep still running, skipping this one");
            self.emit_event(PollEvent::SweepSkipped);
            return SweepReport::skipped();
        };

        let sweep = self.sweep_count.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(sweep, "Sweep started");
        self.emit_event(PollEvent::SweepStarted { sweep });

        let mut report = SweepReport::default();
        for target in &self.repositories {
            let outcome = self.process_repository(target, shutdown).await;
            let interrupted = outcome == RepoOutcome::Interrupted;

            report.repositories.push(RepoReport {
                repository: target.identifier.clone(),
                outcome,
            });

            if interrupted {
                report.cancelled = true;
                debug!(sweep, "Sweep interrupted by shutdown");
                return report;
            }
        }

        self.metrics.sweep_completed();
        let notified = report.notified();
        debug!(sweep, notified, "Sweep completed");
        self.emit_event(PollEvent::SweepCompleted { sweep, notified });

        report
    }

    /// Run the per-repository protocol for one target
    async fn process_repository(
        &self,
        target: &RepositoryTarget,
        shutdown: &CancellationToken,
    ) -> RepoOutcome {
        if !sleep_or_cancel(self.per_repo_delay, shutdown).await {
            return RepoOutcome::Interrupted;
        }

        let Some(source) = self.sources.get(&target.source) else {
            return self.fetch_failed(
                target,
                FetchError::Unsupported(format!(
                    "no release source configured for kind '{}'",
                    target.source
                )),
            );
        };

        if !source.supports_repository(&target.identifier) {
            return self.fetch_failed(
                target,
                FetchError::Unsupported(format!(
                    "{} does not support repository '{}'",
                    source.source_name(),
                    target.identifier
                )),
            );
        }

        let outcome = source.fetch(&target.identifier).await;
        let rate_limit = outcome.rate_limit;

        if let Some(snapshot) = &rate_limit {
            self.metrics.set_rate_limit(snapshot.limit);
            self.metrics.set_rate_limit_used(snapshot.used);
        }

        if let Some(pause) = self.governor.assess(rate_limit.as_ref()) {
            let (used, limit) = rate_limit.map(|s| (s.used, s.limit)).unwrap_or_default();
            self.metrics.rate_limit_risk();
            warn!(
                repository = %target.identifier,
                used,
                limit,
                pause_secs = pause.duration.as_secs(),
                "Rate limit at risk, pausing sweep"
            );
            self.emit_event(PollEvent::RateLimitRisk {
                repository: target.identifier.clone(),
                used,
                limit,
                pause: pause.duration,
            });

            if !sleep_or_cancel(pause.duration, shutdown).await {
                return RepoOutcome::Interrupted;
            }
        }

        let release = match outcome.result {
            Ok(release) => release,
            Err(FetchError::RateLimited { kind }) => {
                self.metrics.release_get_error();
                let pause = self
                    .governor
                    .assess_rate_limited(kind, rate_limit.as_ref(), Utc::now());
                return self.rate_limited(target, kind, pause, shutdown).await;
            }
            Err(error) => return self.fetch_failed(target, error),
        };

        match self
            .store
            .compare_and_set(&target.identifier, &release.version)
            .await
        {
            Ok(true) => self.deliver(target, release).await,
            Ok(false) => {
                debug!(
                    repository = %target.identifier,
                    version = %release.version,
                    "No new release"
                );
                self.emit_event(PollEvent::Unchanged {
                    repository: target.identifier.clone(),
                    version: release.version.clone(),
                });
                RepoOutcome::Unchanged {
                    version: release.version,
                }
            }
            Err(e) => {
                self.metrics.db_error();
                error!(
                    repository = %target.identifier,
                    version = %release.version,
                    error = %e,
                    "Cannot store version, skipping notification"
                );
                self.emit_event(PollEvent::StoreFailed {
                    repository: target.identifier.clone(),
                    error: e.to_string(),
                });
                RepoOutcome::StoreFailed {
                    version: release.version,
                    error: e.to_string(),
                }
            }
        }
    }

    fn fetch_failed(&self, target: &RepositoryTarget, error: FetchError) -> RepoOutcome {
        self.metrics.release_get_error();
        warn!(
            repository = %target.identifier,
            error = %error,
            "Cannot get latest release"
        );
        self.emit_event(PollEvent::FetchFailed {
            repository: target.identifier.clone(),
            error: error.to_string(),
        });
        RepoOutcome::FetchFailed { error }
    }

    async fn rate_limited(
        &self,
        target: &RepositoryTarget,
        kind: RateLimitKind,
        pause: Pause,
        shutdown: &CancellationToken,
    ) -> RepoOutcome {
        self.metrics.rate_limited();
        warn!(
            repository = %target.identifier,
            kind = %kind,
            pause_secs = pause.duration.as_secs(),
            "Rate limited, sleeping until reset"
        );
        self.emit_event(PollEvent::RateLimited {
            repository: target.identifier.clone(),
            kind,
            pause: pause.duration,
        });

        if !sleep_or_cancel(pause.duration, shutdown).await {
            return RepoOutcome::Interrupted;
        }

        RepoOutcome::RateLimited {
            kind,
            pause: pause.duration,
        }
    }

    async fn deliver(&self, target: &RepositoryTarget, release: ReleaseObservation) -> RepoOutcome {
        self.metrics.new_release_found();
        info!(
            repository = %target.identifier,
            version = %release.version,
            "New release found"
        );
        self.emit_event(PollEvent::NewRelease {
            repository: target.identifier.clone(),
            version: release.version.clone(),
        });

        let destination = target.destination_key.clone();
        let Some(channel) = self.channels.get(&destination) else {
            let e = Error::routing(&destination);
            self.metrics.routing_error();
            error!(
                repository = %target.identifier,
                destination = %destination,
                error = %e,
                "Cannot route notification"
            );
            self.emit_event(PollEvent::RoutingFailed {
                repository: target.identifier.clone(),
                destination: destination.clone(),
            });
            return RepoOutcome::RoutingFailed {
                version: release.version,
                destination,
            };
        };

        match channel.notify(&release).await {
            Ok(()) => {
                self.metrics.notification_sent();
                info!(
                    repository = %target.identifier,
                    version = %release.version,
                    destination = %destination,
                    channel = channel.channel_name(),
                    "Notification sent"
                );
                self.emit_event(PollEvent::Notified {
                    repository: target.identifier.clone(),
                    version: release.version.clone(),
                    destination: destination.clone(),
                });
                RepoOutcome::Notified {
                    version: release.version,
                    destination,
                }
            }
            Err(e) => {
                self.metrics.notification_error();
                error!(
                    repository = %target.identifier,
                    version = %release.version,
                    destination = %destination,
                    error = %e,
                    "Cannot notify"
                );
                self.emit_event(PollEvent::NotifyFailed {
                    repository: target.identifier.clone(),
                    destination: destination.clone(),
                    error: e.to_string(),
                });
                RepoOutcome::NotifyFailed {
                    version: release.version,
                    destination,
                    error: e.to_string(),
                }
            }
        }
    }

    fn emit_event(&self, event: PollEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Increase event_channel_capacity.");
            }
            // Nobody listens; events are optional
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

/// Sleep for `duration` unless `shutdown` fires first
///
/// Returns `false` when cancelled.
async fn sleep_or_cancel(duration: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
