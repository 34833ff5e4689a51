// # Version Store Implementations
//
// This module provides implementations of the VersionStore trait for
// different persistence strategies.

pub mod memory;
pub mod redb_store;

pub use memory::MemoryVersionStore;
pub use redb_store::RedbVersionStore;

use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::traits::VersionStore;

/// Open the version store described by `config`
///
/// Failure here is fatal for the service and is counted as a database open
/// error.
pub async fn open_store(config: &StoreConfig, metrics: &Metrics) -> Result<Arc<dyn VersionStore>> {
    match config {
        StoreConfig::Redb { path } => match RedbVersionStore::open(path).await {
            Ok(store) => Ok(Arc::new(store)),
            Err(e) => {
                metrics.db_open_error();
                Err(e)
            }
        },
        StoreConfig::Memory => {
            tracing::warn!("Using in-memory version store; state is lost on restart");
            Ok(Arc::new(MemoryVersionStore::new()))
        }
    }
}
