use std::collections::{BTreeMap, BTreeSet};
use log::{debug, info};
use crate::engine::FileStore;
use crate::{validate_key, BlobStore, Error, Result, StorageKey, StoreConfig};

/// Adds transaction buffering to a [`FileStore`].
///
/// Writes and deletes accumulate in two disjoint caches until [`commit`]
/// flushes them; [`rollback`] drops them. Reads see the buffer first and fall
/// through to disk otherwise. One instance holds at most one open transaction
/// and does no locking of its own.
///
/// [`commit`]: BlobStore::commit
/// [`rollback`]: BlobStore::rollback
#[derive(Debug)]
pub struct TransactionalStore {
    inner: FileStore,
    enabled: bool,
    update_cache: BTreeMap<StorageKey, Vec<u8>>,
    delete_cache: BTreeSet<StorageKey>,
}

/// Puts the store back into buffering mode however `commit` exits.
struct FlushGuard<'a> {
    enabled: &'a mut bool,
}

impl<'a> FlushGuard<'a> {
    fn new(enabled: &'a mut bool) -> Self {
        *enabled = false;
        Self { enabled }
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        *self.enabled = true;
    }
}

impl TransactionalStore {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        Ok(Self::wrap(FileStore::new(config)?))
    }

    pub fn wrap(inner: FileStore) -> Self {
        Self {
            inner,
            enabled: true,
            update_cache: BTreeMap::new(),
            delete_cache: BTreeSet::new(),
        }
    }

    /// The wrapped store, bypassing the buffer.
    pub fn inner(&self) -> &FileStore {
        &self.inner
    }

    /// False only while a commit is flushing.
    pub fn is_buffering(&self) -> bool {
        self.enabled
    }

    pub fn pending_updates(&self) -> impl Iterator<Item = &str> {
        self.update_cache.keys().map(String::as_str)
    }

    pub fn pending_deletes(&self) -> impl Iterator<Item = &str> {
        self.delete_cache.iter().map(String::as_str)
    }

    fn clear(&mut self) {
        self.update_cache.clear();
        self.delete_cache.clear();
    }

    fn flush(inner: &mut FileStore, updates: &BTreeMap<StorageKey, Vec<u8>>, deletes: &BTreeSet<StorageKey>) -> Result<()> {
        for key in deletes {
            if inner.has(key)? {
                inner.delete(key)?;
            }
        }
        for (key, blob) in updates {
            inner.store(key, blob)?;
        }
        Ok(())
    }
}

impl BlobStore for TransactionalStore {
    fn store(&mut self, key: &str, blob: &[u8]) -> Result<StorageKey> {
        if !self.enabled {
            return self.inner.store(key, blob);
        }
        validate_key(key)?;
        self.delete_cache.remove(key);
        self.update_cache.insert(key.to_string(), blob.to_vec());
        debug!("buffered store of {}", key);
        Ok(key.to_string())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        if self.enabled {
            if self.delete_cache.contains(key) {
                return Err(Error::NotFound(key.to_string()));
            }
            if let Some(blob) = self.update_cache.get(key) {
                return Ok(blob.clone());
            }
        }
        self.inner.get(key)
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        if !self.enabled {
            return self.inner.delete(key);
        }
        if !self.has(key)? {
            return Err(Error::NotFound(key.to_string()));
        }
        self.update_cache.remove(key);
        self.delete_cache.insert(key.to_string());
        debug!("buffered delete of {}", key);
        Ok(())
    }

    fn has(&self, key: &str) -> Result<bool> {
        if self.enabled {
            if self.delete_cache.contains(key) {
                return Ok(false);
            }
            if self.update_cache.contains_key(key) {
                return Ok(true);
            }
        }
        self.inner.has(key)
    }

    fn keys(&self) -> Result<Vec<StorageKey>> {
        let mut keys: BTreeSet<StorageKey> = self
            .inner
            .keys()?
            .into_iter()
            .filter(|k| !self.delete_cache.contains(k))
            .collect();
        keys.extend(self.update_cache.keys().cloned());
        Ok(keys.into_iter().collect())
    }

    /// Starts a fresh transaction, discarding anything still buffered.
    fn begin(&mut self) {
        self.clear();
    }

    /// Applies buffered deletes, then buffered updates.
    ///
    /// On success the buffer is emptied. On failure the store is back in
    /// buffering mode with the buffer intact, so the commit can be retried or
    /// rolled back; whatever was already written to disk stays written.
    fn commit(&mut self) -> Result<()> {
        {
            let _flushing = FlushGuard::new(&mut self.enabled);
            Self::flush(&mut self.inner, &self.update_cache, &self.delete_cache)?;
        }
        info!(
            "committed {} updates and {} deletes to {:?}",
            self.update_cache.len(),
            self.delete_cache.len(),
            self.inner.root()
        );
        self.clear();
        Ok(())
    }

    fn rollback(&mut self) {
        self.clear();
    }
}
