// # redb Version Store
//
// Durable implementation of VersionStore on top of the redb embedded
// database.
//
// ## Purpose
//
// Keeps the last-seen version per repository across restarts so a restart
// does not re-announce releases that were already announced.
//
// ## Crash Recovery
//
// - Every compare-and-set that changes a value commits its own write
//   transaction with immediate durability
// - redb is copy-on-write: a crash mid-commit leaves the previous committed
//   state intact
//
// ## Layout
//
// One table, `releases`, mapping repository identifier (`&str`) to version
// (`&str`). No schema versioning.

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition, TableError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::Error;
use crate::traits::{RELEASES_TABLE, VersionStore};

const RELEASES: TableDefinition<&str, &str> = TableDefinition::new(RELEASES_TABLE);

/// redb-backed version store
///
/// redb runs at most one write transaction at a time, and compare-and-set
/// reads the current value inside that transaction, so concurrent callers on
/// the same key are serialized.
///
/// # Example
///
/// ```rust,no_run
/// use ghrelnoty_core::store::RedbVersionStore;
/// use ghrelnoty_core::traits::VersionStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = RedbVersionStore::open("/var/lib/ghrelnoty/releases.redb").await?;
///
///     let changed = store.compare_and_set("acme/widget", "v2.0.0").await?;
///     assert!(changed);
///
///     store.close().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct RedbVersionStore {
    path: PathBuf,
    db: RwLock<Option<Arc<Database>>>,
}

impl RedbVersionStore {
    /// Open (creating if needed) the database file at `path`
    ///
    /// Creates parent directories and the `releases` table so that later
    /// reads never hit a missing table.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    Error::store(format!(
                        "Failed to create store directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let open_path = path.clone();
        let db = tokio::task::spawn_blocking(move || -> Result<Database, redb::Error> {
            let db = Database::create(&open_path)?;
            let txn = db.begin_write()?;
            txn.open_table(RELEASES)?;
            txn.commit()?;
            Ok(db)
        })
        .await
        .map_err(|e| Error::store(format!("Store open task failed: {}", e)))?
        .map_err(|e| {
            Error::store(format!("Failed to open store {}: {}", path.display(), e))
        })?;

        tracing::debug!("Opened version store at {}", path.display());

        Ok(Self {
            path,
            db: RwLock::new(Some(Arc::new(db))),
        })
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn database(&self) -> Result<Arc<Database>, Error> {
        let guard = self
            .db
            .read()
            .map_err(|_| Error::store("store lock poisoned"))?;
        guard
            .as_ref()
            .cloned()
            .ok_or_else(|| Error::store(format!("store {} is closed", self.path.display())))
    }

    /// Run a blocking database operation off the async runtime
    async fn with_db<T, F>(&self, op: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, redb::Error> + Send + 'static,
    {
        let db = self.database()?;
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| Error::store(format!("Store task failed: {}", e)))?
            .map_err(Error::from)
    }
}

fn read_version(db: &Database, key: &str) -> Result<Option<String>, redb::Error> {
    let txn = db.begin_read()?;
    let table = match txn.open_table(RELEASES) {
        Ok(table) => table,
        Err(TableError::TableDoesNotExist(_)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let value = table.get(key)?.map(|v| v.value().to_string());
    Ok(value)
}

fn compare_and_write(db: &Database, key: &str, value: &str) -> Result<bool, redb::Error> {
    let txn = db.begin_write()?;
    let changed = {
        let mut table = txn.open_table(RELEASES)?;
        let current = table.get(key)?.map(|v| v.value().to_string());
        if current.as_deref().unwrap_or("") == value {
            false
        } else {
            table.insert(key, value)?;
            true
        }
    };

    if changed {
        txn.commit()?;
    } else {
        txn.abort()?;
    }
    Ok(changed)
}

#[async_trait]
impl VersionStore for RedbVersionStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let key = key.to_string();
        self.with_db(move |db| read_version(db, &key)).await
    }

    async fn compare_and_set(&self, key: &str, value: &str) -> Result<bool, Error> {
        let key = key.to_string();
        let value = value.to_string();
        let changed = self
            .with_db(move |db| compare_and_write(db, &key, &value))
            .await?;
        tracing::trace!("compare_and_set changed={}", changed);
        Ok(changed)
    }

    async fn close(&self) -> Result<(), Error> {
        let mut guard = self
            .db
            .write()
            .map_err(|_| Error::store("store lock poisoned"))?;
        // In-flight blocking operations hold their own Arc; the file is
        // released once the last of them finishes.
        if guard.take().is_some() {
            tracing::debug!("Closed version store at {}", self.path.display());
        }
        Ok(())
    }
}
