//! Minimal embedding example for ghrelnoty-core
//!
//! This example drives `PollCoordinator` from a custom application with an
//! in-process release source, a stdout channel and the in-memory store.
//! The coordinator lifecycle is fully managed by the application.

use ghrelnoty_core::traits::{FetchOutcome, NotificationChannel, ReleaseObservation, ReleaseSource};
use ghrelnoty_core::{
    ChannelMap, FetchError, MemoryVersionStore, Metrics, PollCoordinator, PollerConfig,
    ReleaseSourceKind, RepositoryTarget, Result, SourceMap,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Release source backed by a map the application can edit
#[derive(Clone, Default)]
struct EmbeddedSource {
    releases: Arc<Mutex<HashMap<String, String>>>,
    fetch_calls: Arc<AtomicUsize>,
}

impl EmbeddedSource {
    /// Simulate a new upstream release
    async fn publish(&self, repository: &str, version: &str) {
        self.releases
            .lock()
            .await
            .insert(repository.to_string(), version.to_string());
    }

    fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ReleaseSource for EmbeddedSource {
    async fn fetch(&self, repository: &str) -> FetchOutcome {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        match self.releases.lock().await.get(repository) {
            Some(version) => FetchOutcome::ok(
                ReleaseObservation::new(repository, version.clone())
                    .with_url(format!("https://example.invalid/{}/{}", repository, version)),
                None,
            ),
            None => FetchOutcome::failed(
                FetchError::Unavailable(format!("{} has no releases", repository)),
                None,
            ),
        }
    }

    fn supports_repository(&self, repository: &str) -> bool {
        repository.contains('/')
    }

    fn source_name(&self) -> &'static str {
        "embedded"
    }
}

/// Channel printing every notification
struct StdoutChannel;

#[async_trait::async_trait]
impl NotificationChannel for StdoutChannel {
    async fn notify(&self, release: &ReleaseObservation) -> Result<()> {
        println!(
            "[Notify] {} {} ({})",
            release.repository, release.version, release.url
        );
        Ok(())
    }

    fn channel_name(&self) -> &'static str {
        "stdout"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("=== Embedded ghrelnoty-core Example ===\n");

    let source = EmbeddedSource::default();
    source.publish("acme/widget", "v1.0.0").await;
    source.publish("acme/gadget", "v0.3.1").await;

    let mut sources: SourceMap = HashMap::new();
    sources.insert(ReleaseSourceKind::Github, Box::new(source.clone()));

    let mut channels: ChannelMap = HashMap::new();
    channels.insert("console".to_string(), Box::new(StdoutChannel));

    let config = PollerConfig::new(vec![
        RepositoryTarget::new("acme/widget", "console"),
        RepositoryTarget::new("acme/gadget", "console"),
        RepositoryTarget::new("acme/unreleased", "console"),
    ])
    .with_tick_interval(Duration::from_millis(200))
    .with_per_repo_delay(Duration::ZERO)
    .with_event_channel_capacity(100);

    let metrics = Arc::new(Metrics::new());

    println!("1. Creating coordinator...");
    let (coordinator, mut event_rx) = PollCoordinator::new(
        config,
        sources,
        Arc::new(MemoryVersionStore::new()),
        channels,
        metrics.clone(),
    )?;

    let event_listener = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            println!("[Event] {:?}", event);
        }
        println!("Event listener stopped");
    });

    println!("2. Running one sweep by hand...");
    let report = coordinator.run_sweep().await;
    println!("   Sweep notified {} repositories\n", report.notified());

    println!("3. Starting coordinator in background...");
    let shutdown = CancellationToken::new();
    let handle = coordinator.spawn(shutdown.clone());

    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("\n4. Publishing acme/widget v1.1.0...\n");
    source.publish("acme/widget", "v1.1.0").await;

    tokio::time::sleep(Duration::from_millis(300)).await;

    println!("\n5. Cancelling coordinator...");
    shutdown.cancel();
    match handle.await {
        Ok(result) => result?,
        Err(e) => println!("Coordinator task failed: {}", e),
    }

    let _ = tokio::time::timeout(Duration::from_millis(100), event_listener).await;

    let snapshot = metrics.snapshot();
    println!("\n6. Coordinator stopped cleanly.");
    println!("   fetches:       {}", source.fetch_count());
    println!("   new releases:  {}", snapshot.new_releases_found);
    println!("   fetch errors:  {}", snapshot.release_get_errors);
    println!("\n=== Embedding Successful ===");

    Ok(())
}
