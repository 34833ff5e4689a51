// # ghrelnotyd - GitHub release notification daemon
//
// This is a THIN integration layer. Polling, rate limiting, change
// detection and routing all live in ghrelnoty-core.
//
// The daemon is responsible for:
// 1. Reading the YAML configuration
// 2. Initializing logging and the runtime
// 3. Registering release sources and notification channels
// 4. Opening the version store
// 5. Running the poll coordinator and the metrics endpoint until a signal
//
// ## Configuration
//
// The configuration file path comes from `--config-path` or the
// `GHRELNOTY_CONFIG_PATH` environment variable.
//
// ## Example
//
// ```bash
// ghrelnotyd --config-path /etc/ghrelnoty/config.yaml
// ```

mod metrics_server;

use anyhow::{Context, Result};
use clap::Parser;
use ghrelnoty_core::{AppConfig, Metrics, PollCoordinator, Registry, open_store};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Upper bound for in-flight work to finish after a signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GhrelnotyExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<GhrelnotyExitCode> for ExitCode {
    fn from(code: GhrelnotyExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "ghrelnotyd", version, about = "Notify about new GitHub releases")]
struct Args {
    /// Path of the YAML configuration file
    #[arg(long, env = "GHRELNOTY_CONFIG_PATH")]
    config_path: PathBuf,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // --help and --version also land here
            let _ = e.print();
            return if e.use_stderr() {
                GhrelnotyExitCode::ConfigError.into()
            } else {
                GhrelnotyExitCode::CleanShutdown.into()
            };
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to create tokio runtime: {}", e);
            return GhrelnotyExitCode::RuntimeError.into();
        }
    };

    let config = match rt.block_on(load_config(&args.config_path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return GhrelnotyExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::from(config.log_level))
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return GhrelnotyExitCode::ConfigError.into();
    }

    info!("Starting ghrelnotyd daemon");
    info!(
        repositories = config.repositories.len(),
        destinations = config.destinations.len(),
        "Configuration loaded"
    );

    let code = rt.block_on(async {
        let daemon = match Daemon::start(config).await {
            Ok(daemon) => daemon,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return GhrelnotyExitCode::ConfigError;
            }
        };

        match daemon.run_until_shutdown().await {
            Ok(()) => GhrelnotyExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                GhrelnotyExitCode::RuntimeError
            }
        }
    });

    code.into()
}

/// Read and validate the configuration file
async fn load_config(path: &Path) -> Result<AppConfig> {
    let config = AppConfig::load(path)
        .await
        .with_context(|| format!("Cannot load {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Build the adapter registry from the compiled-in features
fn registry() -> Registry {
    #[allow(unused_mut)]
    let mut registry = Registry::new();

    #[cfg(feature = "github")]
    {
        debug!("Registering GitHub release source");
        ghrelnoty_source_github::register(&mut registry);
    }

    #[cfg(feature = "smtp")]
    {
        debug!("Registering SMTP notification channel");
        ghrelnoty_channel_smtp::register(&mut registry);
    }

    debug!(
        sources = ?registry.source_kinds(),
        channels = ?registry.channel_kinds(),
        "Adapters registered"
    );
    registry
}

/// Running tasks of the daemon
struct Daemon {
    shutdown: CancellationToken,
    poller: JoinHandle<ghrelnoty_core::Result<()>>,
    server: JoinHandle<std::io::Result<()>>,
    event_log: JoinHandle<()>,
}

impl Daemon {
    /// Build every component and start the tasks
    ///
    /// Any error here means the service cannot start.
    async fn start(config: AppConfig) -> Result<Self> {
        let metrics = Arc::new(Metrics::new());
        let registry = registry();

        let sources = registry
            .create_sources(&config.sources)
            .context("Cannot create release sources")?;
        let channels = registry
            .create_channels(&config.destinations)
            .context("Cannot create notification channels")?;
        let store = open_store(&config.store, &metrics)
            .await
            .context("Cannot open version store")?;

        let (coordinator, mut events) = PollCoordinator::new(
            config.poller_config(),
            sources,
            store,
            channels,
            metrics.clone(),
        )?;
        let coordinator = coordinator.with_span(tracing::info_span!(
            "poller",
            repositories = config.repositories.len()
        ));

        let listener = metrics_server::bind(config.metrics_port).await?;
        info!(port = config.metrics_port, "Serving /metrics and /health");

        let shutdown = CancellationToken::new();
        let server = tokio::spawn(metrics_server::serve(
            listener,
            metrics.clone(),
            shutdown.clone(),
        ));
        let poller = coordinator.spawn(shutdown.clone());

        // Ends when the coordinator drops its sender
        let event_log = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                debug!(?event, "Poll event");
            }
        });

        Ok(Self {
            shutdown,
            poller,
            server,
            event_log,
        })
    }

    /// Wait for a signal, then stop every task
    async fn run_until_shutdown(mut self) -> Result<()> {
        tokio::select! {
            signal = wait_for_shutdown() => {
                let signal = signal?;
                info!(signal, "Received shutdown signal");
            }
            result = &mut self.server => {
                self.shutdown.cancel();
                let reason = match result {
                    Ok(Ok(())) => "exited".to_string(),
                    Ok(Err(e)) => e.to_string(),
                    Err(e) => e.to_string(),
                };
                anyhow::bail!("Metrics endpoint stopped unexpectedly: {}", reason);
            }
        }

        info!("Shutting down daemon");
        self.shutdown.cancel();

        let poller = tokio::time::timeout(SHUTDOWN_TIMEOUT, self.poller)
            .await
            .context("Poll coordinator did not stop in time")?
            .context("Poll coordinator task failed")?;
        poller.context("Poll coordinator stopped with an error")?;

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.server).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!(error = %e, "Metrics endpoint stopped with an error"),
            Ok(Err(e)) => warn!(error = %e, "Metrics endpoint task failed"),
            Err(_) => warn!("Metrics endpoint did not stop in time"),
        }

        let _ = self.event_log.await;
        info!("Daemon stopped");
        Ok(())
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"
store:
  type: memory
repositories:
  - name: acme/widget
    destination: ops
destinations:
  ops:
    type: smtp
    from: bot@example.com
    to: ops@example.com
    host: localhost
    security: none
"#;

    #[test]
    fn args_take_config_path_flag() {
        let args =
            Args::try_parse_from(["ghrelnotyd", "--config-path", "/etc/ghrelnoty.yaml"]).unwrap();
        assert_eq!(args.config_path, PathBuf::from("/etc/ghrelnoty.yaml"));
    }

    #[test]
    fn exit_codes_follow_systemd_conventions() {
        assert_eq!(GhrelnotyExitCode::CleanShutdown as u8, 0);
        assert_eq!(GhrelnotyExitCode::ConfigError as u8, 1);
        assert_eq!(GhrelnotyExitCode::RuntimeError as u8, 2);
    }

    #[tokio::test]
    async fn load_config_reads_and_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let config = load_config(file.path()).await.unwrap();
        assert_eq!(config.repositories.len(), 1);
    }

    #[tokio::test]
    async fn load_config_rejects_invalid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.replace("destination: ops", "destination: nowhere").as_bytes())
            .unwrap();

        assert!(load_config(file.path()).await.is_err());
    }

    #[tokio::test]
    async fn load_config_reports_missing_file() {
        let err = load_config(Path::new("/nonexistent/ghrelnoty.yaml"))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/ghrelnoty.yaml"));
    }

    #[cfg(all(feature = "github", feature = "smtp"))]
    #[test]
    fn registry_has_builtin_adapters() {
        use ghrelnoty_core::{ChannelKind, ReleaseSourceKind};

        let registry = registry();
        assert!(registry.has_source(ReleaseSourceKind::Github));
        assert!(registry.has_channel(ChannelKind::Smtp));
        assert_eq!(registry.source_kinds(), vec![ReleaseSourceKind::Github]);
        assert_eq!(registry.channel_kinds(), vec![ChannelKind::Smtp]);
    }
}
