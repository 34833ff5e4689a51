// # Notification Channel Trait
//
// Defines the interface for delivering a detected release to a human or
// another system.
//
// ## Implementations
//
// - SMTP email: `ghrelnoty-channel-smtp` crate

use async_trait::async_trait;

use super::release_source::ReleaseObservation;

/// Trait for notification channel implementations
///
/// A channel is constructed once from configuration and is immutable
/// afterwards. `notify` is single-shot: the coordinator does not retry
/// delivery, and channels must not retry internally either.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Deliver one release event
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Delivered
    /// - `Err(Error)`: Delivery failed (counted, not retried)
    async fn notify(&self, release: &ReleaseObservation) -> Result<(), crate::Error>;

    /// Channel name (for logging/debugging)
    fn channel_name(&self) -> &'static str;
}

/// Helper trait for constructing channels from configuration
pub trait NotificationChannelFactory: Send + Sync {
    /// Create a NotificationChannel instance from configuration
    fn create(
        &self,
        config: &crate::config::ChannelConfig,
    ) -> Result<Box<dyn NotificationChannel>, crate::Error>;
}
