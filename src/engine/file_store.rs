use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use log::debug;
use crate::{validate_key, BlobStore, Error, Result, StorageKey, StoreConfig};

/// Stores binary blobs as files, one file per key.
///
/// The file name is the key and the content is the raw blob: no header, no
/// checksum. Every call goes straight to disk and no file handle outlives the
/// call that opened it.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Opens a store at the configured path.
    ///
    /// If the directory does not exist, it will be created.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let root = config.root()?.to_path_buf();
        if !root.exists() {
            fs::create_dir_all(&root)?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

impl BlobStore for FileStore {
    fn store(&mut self, key: &str, blob: &[u8]) -> Result<StorageKey> {
        let path = self.path_for(key)?;
        fs::write(&path, blob).map_err(|source| Error::StorageIo { op: "store", key: key.to_string(), source })?;
        debug!("stored {} bytes under {}", blob.len(), key);
        Ok(key.to_string())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        fs::read(&path).map_err(|e| {
            debug!("could not read {:?}: {}", path, e);
            Error::NotFound(key.to_string())
        })
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("deleted {}", key);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(Error::StorageIo { op: "delete", key: key.to_string(), source }),
        }
    }

    fn has(&self, key: &str) -> Result<bool> {
        Ok(self.path_for(key)?.is_file())
    }

    fn keys(&self) -> Result<Vec<StorageKey>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                keys.push(name.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}
