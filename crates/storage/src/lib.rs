//! Ordered key-value storage for the VICP registry.
//!
//! The registry keeps every record under two flat string keys, so the store only
//! needs point reads and writes plus prefix listing with cursor pagination. Two
//! backends are provided: a sled tree for durable deployments and an in-memory
//! map for tests and development runs.

use anyhow::Result;
use parking_lot::RwLock;
use sled::{Db, Tree};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Number of attempts made for each delete inside [`KeyValueStore::delete_pair`].
pub const PAIR_RETRY_ATTEMPTS: usize = 3;

/// Storage errors
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Stored bytes under key {key} are not valid UTF-8")]
    InvalidUtf8 { key: String },
}

/// One page of keys returned by [`KeyValueStore::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Present when more keys under the prefix follow this page.
    pub cursor: Option<String>,
}

/// Abstract key-value store.
///
/// Keys are ordered lexicographically. There are no multi-key transactions; the
/// pair operations below are the only place where two keys are written as one
/// logical unit, by compensation and retry rather than atomicity.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, value: &str) -> Result<()>;
    /// Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
    /// List keys starting with `prefix` that sort after `cursor`, at most `limit` of them.
    fn list(&self, prefix: &str, cursor: Option<&str>, limit: usize) -> Result<ListPage>;

    /// Write a primary entry and its secondary index entry.
    ///
    /// The primary is written first. If the secondary write fails the primary is
    /// removed again so no record is left without its index entry.
    fn put_pair(&self, primary: (&str, &str), secondary: (&str, &str)) -> Result<()> {
        self.put(primary.0, primary.1)?;

        if let Err(err) = self.put(secondary.0, secondary.1) {
            if let Err(undo_err) = self.delete(primary.0) {
                warn!(
                    "Failed to compensate primary key {} after secondary write error: {}",
                    primary.0, undo_err
                );
            }
            return Err(err);
        }

        Ok(())
    }

    /// Delete a secondary index entry and its primary entry.
    ///
    /// The secondary goes first: if anything fails the primary is still present and
    /// the whole call can be repeated. Each delete is retried a bounded number of
    /// times; deletes are idempotent so retries are safe.
    fn delete_pair(&self, primary: &str, secondary: Option<&str>) -> Result<()> {
        if let Some(secondary) = secondary {
            retry_delete(self, secondary)?;
        }
        retry_delete(self, primary)
    }
}

fn retry_delete<S: KeyValueStore + ?Sized>(store: &S, key: &str) -> Result<()> {
    let mut attempt = 1;
    loop {
        match store.delete(key) {
            Ok(()) => return Ok(()),
            Err(err) if attempt < PAIR_RETRY_ATTEMPTS => {
                warn!("Delete of {} failed (attempt {}): {}", key, attempt, err);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Sled-backed implementation
pub struct SledStore {
    db: Db,
    entries: Tree,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        let entries = db.open_tree("entries")?;
        Ok(Self { db, entries })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn decode(key: &[u8], bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            StorageError::InvalidUtf8 {
                key: String::from_utf8_lossy(key).into_owned(),
            }
            .into()
        })
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.entries
            .get(key.as_bytes())
            .map_err(StorageError::from)?
            .map(|v| Self::decode(key.as_bytes(), &v))
            .transpose()
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .insert(key.as_bytes(), value.as_bytes())
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries
            .remove(key.as_bytes())
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn list(&self, prefix: &str, cursor: Option<&str>, limit: usize) -> Result<ListPage> {
        let start = match cursor {
            Some(after) => Bound::Excluded(after.as_bytes().to_vec()),
            None => Bound::Included(prefix.as_bytes().to_vec()),
        };

        let mut keys = Vec::new();
        let mut has_more = false;
        for item in self.entries.range::<Vec<u8>, _>((start, Bound::Unbounded)) {
            let (key, _) = item.map_err(StorageError::from)?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            if keys.len() == limit {
                has_more = true;
                break;
            }
            keys.push(Self::decode(&key, &key)?);
        }

        Ok(page(keys, has_more))
    }
}

/// In-memory backend
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str, cursor: Option<&str>, limit: usize) -> Result<ListPage> {
        let entries = self.entries.read();
        let start = match cursor {
            Some(after) => Bound::Excluded(after),
            None => Bound::Included(prefix),
        };

        let mut matching = entries
            .range::<str, _>((start, Bound::Unbounded))
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix));

        let keys: Vec<String> = matching.by_ref().take(limit).cloned().collect();
        let has_more = matching.next().is_some();

        Ok(page(keys, has_more))
    }
}

fn page(keys: Vec<String>, has_more: bool) -> ListPage {
    let cursor = if has_more { keys.last().cloned() } else { None };
    ListPage { keys, cursor }
}
