//! Persistent ledgers.
//!
//! A ledger is a single JSON object mapping a key to a record. [JsonStore] rewrites the whole
//! file on every change, so all mutations go through one lock per ledger.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::error::StoreError;

/// Every record of a ledger, keyed and sorted.
pub type Entries<V> = BTreeMap<String, V>;

/// Keyed record storage.
#[async_trait]
pub trait Repository<V: Send + 'static>: Send + Sync {
    /// Every record.
    async fn list(&self) -> Result<Entries<V>, StoreError>;

    /// Run `f` over all records and persist the result, without anyone else writing in between.
    async fn modify<R, F>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Entries<V>) -> R + Send,
        R: Send;

    async fn get(&self, key: &str) -> Result<Option<V>, StoreError>
    where
        V: Clone,
    {
        Ok(self.list().await?.get(key).cloned())
    }

    /// Insert or replace a record. Returns the previous one.
    async fn upsert(&self, key: &str, value: V) -> Result<Option<V>, StoreError> {
        let key = key.to_string();
        self.modify(move |entries| entries.insert(key, value)).await
    }

    /// Remove a record. Returns it if it existed.
    async fn delete(&self, key: &str) -> Result<Option<V>, StoreError> {
        let key = key.to_string();
        self.modify(move |entries| entries.remove(&key)).await
    }
}

/// A ledger stored as one pretty printed JSON file.
/// Internally uses an [Arc], so it's cheap to clone.
#[derive(Debug)]
pub struct JsonStore<V> {
    inner: Arc<Inner>,
    _record: PhantomData<fn() -> V>,
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    /// Held for the whole read-modify-write cycle.
    lock: Mutex<()>,
}

impl<V> Clone for JsonStore<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _record: PhantomData,
        }
    }
}

impl<V> JsonStore<V>
where
    V: Serialize + DeserializeOwned + Send + 'static,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let inner = Inner {
            path: path.into(),
            lock: Mutex::new(()),
        };
        Self {
            inner: Arc::new(inner),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Reads the file, creating it as `{}` (and its directory) if it doesn't exist.
    async fn read(&self) -> Result<Entries<V>, StoreError> {
        let path = self.path();
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("Creating empty ledger at {}", path.display());
                self.write(&Entries::new()).await?;
                return Ok(Entries::new());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        if content.trim().is_empty() {
            return Ok(Entries::new());
        }

        serde_json::from_str(&content).map_err(|source| StoreError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    /// Replaces the file through a temporary sibling so a crash never leaves half a ledger.
    async fn write(&self, entries: &Entries<V>) -> Result<(), StoreError> {
        let path = self.path();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_string_pretty(entries).map_err(|source| StoreError::Json {
            path: path.display().to_string(),
            source,
        })?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| self.io_error(e))
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path().display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl<V> Repository<V> for JsonStore<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn list(&self) -> Result<Entries<V>, StoreError> {
        let _guard = self.inner.lock.lock().await;
        self.read().await
    }

    #[instrument(level = "debug", skip_all, fields(ledger = %self.path().display()))]
    async fn modify<R, F>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Entries<V>) -> R + Send,
        R: Send,
    {
        let _guard = self.inner.lock.lock().await;
        // A failed read returns early, so a broken file is never replaced by an empty ledger.
        let mut entries = self.read().await?;
        let result = f(&mut entries);
        self.write(&entries).await?;
        Ok(result)
    }
}
