// # Memory Version Store
//
// In-memory implementation of VersionStore.
//
// ## Crash Behavior
//
// - All state is lost on restart/crash
// - First sweep after a restart treats every repository as changed and
//   notifies once per repository
//
// ## When to Use
//
// - Tests
// - Trial runs where duplicate notifications after a restart are harmless

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::VersionStore;

/// In-memory version store
///
/// Clones share the same underlying map, which lets tests keep a handle for
/// inspection while the coordinator owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryVersionStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryVersionStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored versions
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Whether `close()` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::store("memory store is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl VersionStore for MemoryVersionStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        self.ensure_open()?;
        let guard = self.inner.read().await;
        Ok(guard.get(key).cloned())
    }

    async fn compare_and_set(&self, key: &str, value: &str) -> Result<bool, Error> {
        self.ensure_open()?;
        // Write lock spans compare and insert
        let mut guard = self.inner.write().await;
        let current = guard.get(key).map(String::as_str).unwrap_or("");
        if current == value {
            return Ok(false);
        }
        guard.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn close(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
