// # ghrelnoty-core
//
// Core library for the GitHub release poll-detect-notify service.
//
// ## Architecture Overview
//
// - **ReleaseSource**: Trait for asking an upstream API for the latest release
// - **NotificationChannel**: Trait for delivering a detected release
// - **VersionStore**: Trait for the durable last-seen version per repository
// - **RateLimitGovernor**: Converts rate-limit telemetry into pauses
// - **PollCoordinator**: Sweeps repositories and drives fetch → compare → notify
// - **Registry**: Kind-keyed factories for sources and channels
//
// ## Design Principles
//
// 1. **Sequential sweeps**: one repository at a time shares one rate-limit quota
// 2. **Closed dispatch**: source and channel kinds are enums, not runtime type checks
// 3. **Library-First**: the daemon is a thin shell around this crate
// 4. **Explicit handles**: metrics and spans are passed in, never global

pub mod config;
pub mod coordinator;
pub mod error;
pub mod governor;
pub mod metrics;
pub mod registry;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use config::{
    AppConfig, ChannelConfig, ChannelKind, PollerConfig, ReleaseSourceConfig, ReleaseSourceKind,
    RepositoryTarget, StoreConfig,
};
pub use coordinator::{
    ChannelMap, PollCoordinator, PollEvent, RepoOutcome, RepoReport, SourceMap, SweepReport,
};
pub use error::{Error, FetchError, RateLimitKind, Result};
pub use governor::{Pause, PauseReason, RateLimitGovernor};
pub use metrics::Metrics;
pub use registry::Registry;
pub use store::{MemoryVersionStore, RedbVersionStore, open_store};
pub use traits::{
    FetchOutcome, NotificationChannel, RateLimitSnapshot, ReleaseObservation, ReleaseSource,
    VersionStore,
};
