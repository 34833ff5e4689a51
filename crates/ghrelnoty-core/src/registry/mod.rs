//! Kind-keyed adapter registry
//!
//! The registry maps each [`ReleaseSourceKind`] and [`ChannelKind`] to the
//! factory that builds it. Configuration is dispatched on those closed enums
//! rather than on runtime type inspection.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ghrelnoty_core::Registry;
//!
//! let mut registry = Registry::new();
//! ghrelnoty_source_github::register(&mut registry);
//! ghrelnoty_channel_smtp::register(&mut registry);
//!
//! let sources = registry.create_sources(&config.sources)?;
//! let channels = registry.create_channels(&config.destinations)?;
//! ```
//!
//! ## Registration
//!
//! Adapter crates expose a `register` function:
//!
//! ```rust,ignore
//! pub fn register(registry: &mut Registry) {
//!     registry.register_source(ReleaseSourceKind::Github, Box::new(GithubFactory));
//! }
//! ```

use std::collections::{BTreeMap, HashMap};

use crate::config::{ChannelConfig, ChannelKind, ReleaseSourceConfig, ReleaseSourceKind};
use crate::coordinator::{ChannelMap, SourceMap};
use crate::error::{Error, Result};
use crate::traits::{
    NotificationChannel, NotificationChannelFactory, ReleaseSource, ReleaseSourceFactory,
};

/// Registry of release source and notification channel factories
///
/// Registration happens once at startup, before any lookup, so the registry
/// is built through `&mut self` and read through `&self`.
#[derive(Default)]
pub struct Registry {
    sources: HashMap<ReleaseSourceKind, Box<dyn ReleaseSourceFactory>>,
    channels: HashMap<ChannelKind, Box<dyn NotificationChannelFactory>>,
}

impl Registry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a release source factory, replacing any previous one
    pub fn register_source(
        &mut self,
        kind: ReleaseSourceKind,
        factory: Box<dyn ReleaseSourceFactory>,
    ) {
        self.sources.insert(kind, factory);
    }

    /// Register a notification channel factory, replacing any previous one
    pub fn register_channel(
        &mut self,
        kind: ChannelKind,
        factory: Box<dyn NotificationChannelFactory>,
    ) {
        self.channels.insert(kind, factory);
    }

    /// Create a release source from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn ReleaseSource>)`: Created source instance
    /// - `Err(Error)`: If the kind is not registered or creation fails
    pub fn create_source(&self, config: &ReleaseSourceConfig) -> Result<Box<dyn ReleaseSource>> {
        let kind = config.kind();
        let factory = self
            .sources
            .get(&kind)
            .ok_or_else(|| Error::config(format!("Unknown release source type: {}", kind)))?;

        factory.create(config)
    }

    /// Create a notification channel from configuration
    pub fn create_channel(&self, config: &ChannelConfig) -> Result<Box<dyn NotificationChannel>> {
        let kind = config.kind();
        let factory = self
            .channels
            .get(&kind)
            .ok_or_else(|| Error::config(format!("Unknown destination type: {}", kind)))?;

        factory.create(config)
    }

    /// Build every configured source, keyed by kind
    pub fn create_sources(&self, configs: &[ReleaseSourceConfig]) -> Result<SourceMap> {
        let mut sources = SourceMap::new();
        for config in configs {
            let kind = config.kind();
            if sources.contains_key(&kind) {
                return Err(Error::config(format!(
                    "Release source '{}' configured more than once",
                    kind
                )));
            }
            sources.insert(kind, self.create_source(config)?);
        }
        Ok(sources)
    }

    /// Build every configured channel, keyed by destination name
    pub fn create_channels(&self, configs: &BTreeMap<String, ChannelConfig>) -> Result<ChannelMap> {
        let mut channels = ChannelMap::new();
        for (name, config) in configs {
            let channel = self
                .create_channel(config)
                .map_err(|e| Error::config(format!("Destination '{}': {}", name, e)))?;
            channels.insert(name.clone(), channel);
        }
        Ok(channels)
    }

    /// Registered source kinds, sorted
    pub fn source_kinds(&self) -> Vec<ReleaseSourceKind> {
        let mut kinds: Vec<_> = self.sources.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Registered channel kinds, sorted
    pub fn channel_kinds(&self) -> Vec<ChannelKind> {
        let mut kinds: Vec<_> = self.channels.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn has_source(&self, kind: ReleaseSourceKind) -> bool {
        self.sources.contains_key(&kind)
    }

    pub fn has_channel(&self, kind: ChannelKind) -> bool {
        self.channels.contains_key(&kind)
    }
}
