// # Version Store Trait
//
// Defines the interface for the durable mapping of repository identifier to
// the last version a notification was attempted for.
//
// ## Implementations
//
// - redb: single-file embedded database (`RedbVersionStore`)
// - Memory: for tests and throwaway runs (`MemoryVersionStore`)
//
// ## Usage
//
// ```rust,no_run
// use ghrelnoty_core::{MemoryVersionStore, VersionStore};
//
// #[tokio::main]
// async fn main() -> ghrelnoty_core::Result<()> {
//     let store = MemoryVersionStore::new();
//
//     assert!(store.compare_and_set("acme/widget", "v1").await?);
//     assert!(!store.compare_and_set("acme/widget", "v1").await?);
//     assert_eq!(store.get("acme/widget").await?.as_deref(), Some("v1"));
//
//     store.close().await
// }
// ```

use async_trait::async_trait;

/// Name of the table/namespace holding the last-seen versions
pub const RELEASES_TABLE: &str = "releases";

/// Trait for version store implementations
///
/// # Thread Safety
///
/// The coordinator only calls the store from its own task, but
/// `compare_and_set` must stay atomic for any other concurrent caller: no
/// caller may observe the value between the compare and the write.
///
/// # Comparison
///
/// The stored value (or the empty string when nothing is stored) is compared
/// to the new value byte for byte. No trimming, case folding or version
/// parsing happens.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Get the stored version for a repository
    ///
    /// # Returns
    ///
    /// - `Ok(Some(version))`: A version is stored
    /// - `Ok(None)`: Nothing stored yet
    /// - `Err(Error)`: Storage error
    async fn get(&self, key: &str) -> Result<Option<String>, crate::Error>;

    /// Atomically replace the stored version if it differs
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: The value differed and was written
    /// - `Ok(false)`: The value was equal, nothing was written
    /// - `Err(Error)`: Storage error, nothing is known about the outcome
    async fn compare_and_set(&self, key: &str, value: &str) -> Result<bool, crate::Error>;

    /// Release underlying resources
    ///
    /// Called once at shutdown. Operations after `close` fail with a store
    /// error.
    async fn close(&self) -> Result<(), crate::Error>;
}
