//! Test doubles and common utilities for contract tests
//!
//! The doubles keep their state behind `Arc`s so a test can hold one handle
//! for inspection while the coordinator owns a clone.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ghrelnoty_core::coordinator::{ChannelMap, SourceMap};
use ghrelnoty_core::error::{Error, FetchError, RateLimitKind, Result};
use ghrelnoty_core::traits::{
    FetchOutcome, NotificationChannel, RateLimitSnapshot, ReleaseObservation, ReleaseSource,
    VersionStore,
};
use ghrelnoty_core::{
    MemoryVersionStore, Metrics, PollCoordinator, PollEvent, PollerConfig, ReleaseSourceKind,
    RepositoryTarget,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// A release source that answers from a per-repository script
///
/// Each repository has a queue of outcomes; once the queue is empty the last
/// scripted outcome repeats. Unscripted repositories fail as unavailable.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    scripts: Arc<Mutex<HashMap<String, VecDeque<FetchOutcome>>>>,
    calls: Arc<Mutex<Vec<(String, Instant)>>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome for a repository
    pub fn push(&self, repository: &str, outcome: FetchOutcome) -> &Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(repository.to_string())
            .or_default()
            .push_back(outcome);
        self
    }

    /// Queue a successful fetch without telemetry
    pub fn release(&self, repository: &str, version: &str) -> &Self {
        self.push(
            repository,
            FetchOutcome::ok(ReleaseObservation::new(repository, version), None),
        )
    }

    /// Queue a failed fetch without telemetry
    pub fn failure(&self, repository: &str, error: FetchError) -> &Self {
        self.push(repository, FetchOutcome::failed(error, None))
    }

    /// Repositories fetched so far, in call order
    pub fn fetched(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(repo, _)| repo.clone())
            .collect()
    }

    /// Instants at which each fetch happened
    pub fn fetch_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn boxed(&self) -> Box<dyn ReleaseSource> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl ReleaseSource for ScriptedSource {
    async fn fetch(&self, repository: &str) -> FetchOutcome {
        self.calls
            .lock()
            .unwrap()
            .push((repository.to_string(), Instant::now()));

        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(repository) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => FetchOutcome::failed(
                FetchError::Unavailable(format!("no script for {}", repository)),
                None,
            ),
        }
    }

    fn supports_repository(&self, repository: &str) -> bool {
        repository.split('/').count() == 2
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// A notification channel that records every release it receives
#[derive(Clone, Default)]
pub struct RecordingChannel {
    received: Arc<Mutex<Vec<ReleaseObservation>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel whose deliveries always fail (but are still recorded)
    pub fn failing() -> Self {
        let channel = Self::default();
        channel.fail.store(true, Ordering::SeqCst);
        channel
    }

    pub fn received(&self) -> Vec<ReleaseObservation> {
        self.received.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    pub fn boxed(&self) -> Box<dyn NotificationChannel> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn notify(&self, release: &ReleaseObservation) -> Result<()> {
        self.received.lock().unwrap().push(release.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::notify("recording", "delivery refused"));
        }
        Ok(())
    }

    fn channel_name(&self) -> &'static str {
        "recording"
    }
}

/// A memory-backed store that counts calls and can be told to fail
#[derive(Clone, Default)]
pub struct CountingStore {
    inner: MemoryVersionStore,
    cas_calls: Arc<Mutex<Vec<(String, String)>>>,
    close_calls: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose compare-and-set always fails
    pub fn failing() -> Self {
        let store = Self::default();
        store.fail_writes.store(true, Ordering::SeqCst);
        store
    }

    /// Every (key, value) passed to compare_and_set
    pub fn cas_calls(&self) -> Vec<(String, String)> {
        self.cas_calls.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn shared(&self) -> Arc<dyn VersionStore> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl VersionStore for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn compare_and_set(&self, key: &str, value: &str) -> Result<bool> {
        self.cas_calls
            .lock()
            .unwrap()
            .push((key.to_string(), value.to_string()));
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::store("disk on fire"));
        }
        self.inner.compare_and_set(key, value).await
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}

/// Snapshot of quota usage resetting `reset_in` from now
pub fn rate_limit(limit: u64, used: u64, reset_in: chrono::Duration) -> RateLimitSnapshot {
    RateLimitSnapshot {
        limit,
        remaining: limit.saturating_sub(used),
        used,
        reset_at: Utc::now() + reset_in,
    }
}

/// A primary rate-limit failure with telemetry resetting at `reset_at`
pub fn primary_rate_limited(limit: u64, reset_at: DateTime<Utc>) -> FetchOutcome {
    FetchOutcome::failed(
        FetchError::RateLimited {
            kind: RateLimitKind::Primary,
        },
        Some(RateLimitSnapshot {
            limit,
            remaining: 0,
            used: limit,
            reset_at,
        }),
    )
}

/// Poller settings with no per-repository delay and an hourly tick
pub fn fast_config(repositories: Vec<RepositoryTarget>) -> PollerConfig {
    PollerConfig::new(repositories)
        .with_tick_interval(Duration::from_secs(3600))
        .with_per_repo_delay(Duration::ZERO)
}

pub fn sources_of(source: &ScriptedSource) -> SourceMap {
    let mut sources = SourceMap::new();
    sources.insert(ReleaseSourceKind::Github, source.boxed());
    sources
}

pub fn channels_of(entries: &[(&str, &RecordingChannel)]) -> ChannelMap {
    entries
        .iter()
        .map(|(name, channel)| (name.to_string(), channel.boxed()))
        .collect()
}

/// Build a coordinator over the given doubles
pub fn coordinator(
    config: PollerConfig,
    source: &ScriptedSource,
    store: &CountingStore,
    channels: ChannelMap,
) -> (PollCoordinator, mpsc::Receiver<PollEvent>, Arc<Metrics>) {
    let metrics = Arc::new(Metrics::new());
    let (coordinator, events) = PollCoordinator::new(
        config,
        sources_of(source),
        store.shared(),
        channels,
        metrics.clone(),
    )
    .expect("coordinator construction succeeds");
    (coordinator, events, metrics)
}

/// Drain every event currently buffered
pub fn drain(events: &mut mpsc::Receiver<PollEvent>) -> Vec<PollEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
