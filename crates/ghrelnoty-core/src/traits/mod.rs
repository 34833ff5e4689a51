//! Core traits for the ghrelnoty system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`ReleaseSource`]: Ask an upstream API for the latest release
//! - [`NotificationChannel`]: Deliver a detected release
//! - [`VersionStore`]: Durable last-seen version per repository

pub mod notification_channel;
pub mod release_source;
pub mod version_store;

pub use notification_channel::{NotificationChannel, NotificationChannelFactory};
pub use release_source::{
    FetchOutcome, RateLimitSnapshot, ReleaseObservation, ReleaseSource, ReleaseSourceFactory,
};
pub use version_store::{RELEASES_TABLE, VersionStore};
