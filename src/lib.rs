//! blobdb is the storage core of a file-backed document database.
//!
//! Documents live as raw blobs, one file per key, under a collection directory.
//! Writes are buffered in memory until a transaction commits, and queries hand
//! back lazily materialized, set-algebraic result sets.
//!
//! ## Core Components
//! - [`engine`]: blob persistence ([`engine::FileStore`]) and the buffering
//!   transaction layer on top of it ([`engine::TransactionalStore`]).
//! - [`query`]: the [`query::Backend`] capability and [`query::QueryResultSet`].
//! - [`backend`]: a JSON document backend wiring the two together.

pub mod backend;
pub mod config;
pub mod engine;
pub mod query;

pub use config::StoreConfig;

use thiserror::Error;

/// Opaque identifier of one blob within a collection.
pub type StorageKey = String;

/// Errors returned by blobdb.
#[derive(Error, Debug)]
pub enum Error {
    /// The store was constructed without a usable configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The key does not exist in the effective view of the store.
    #[error("key {0} not found")]
    NotFound(StorageKey),
    /// A filesystem operation on a specific key failed.
    #[error("{op} failed for key {key}: {source}")]
    StorageIo {
        op: &'static str,
        key: StorageKey,
        #[source]
        source: std::io::Error,
    },
    /// A filesystem error not tied to a single key.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The key cannot be used as a file name.
    #[error("invalid storage key {0:?}")]
    InvalidKey(String),
    /// The backend could not resolve an object to a storage key.
    #[error("object has no storage key")]
    IdentityUnresolved,
    /// Positional access past the end of a result set.
    #[error("index {index} out of range for result set of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    /// Set algebra across result sets of different logical types.
    #[error("cannot combine result sets of {left} and {right}")]
    IncompatibleSets { left: String, right: String },
    /// Error during JSON serialization or deserialization.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A specialized Result type for blobdb operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Raw key to bytes persistence.
///
/// `begin`, `commit` and `rollback` are no-ops by default; stores that buffer
/// writes override them.
pub trait BlobStore {
    /// Stores `blob` under `key`, replacing any previous content.
    fn store(&mut self, key: &str, blob: &[u8]) -> Result<StorageKey>;
    /// Returns the full content stored under `key`.
    fn get(&self, key: &str) -> Result<Vec<u8>>;
    /// Removes `key`.
    fn delete(&mut self, key: &str) -> Result<()>;
    /// Checks whether `key` exists.
    fn has(&self, key: &str) -> Result<bool>;
    /// Lists every key, sorted.
    fn keys(&self) -> Result<Vec<StorageKey>>;

    fn begin(&mut self) {}

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) {}
}

/// Rejects keys that would escape or alias the root directory.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0'])
    {
        return Err(Error::InvalidKey(key.to_string()));
    }
    Ok(())
}
