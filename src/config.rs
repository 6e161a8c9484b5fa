use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use serde::Deserialize;
use crate::{Error, Result};

/// Environment variable consulted by [`StoreConfig::from_env`].
pub const PATH_ENV: &str = "BLOBDB_PATH";

/// Options accepted by the stores.
///
/// Only `path` exists today; it is optional here so that a missing value
/// surfaces as [`Error::Configuration`] at construction rather than at parse time.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: Some(path.as_ref().to_path_buf()) }
    }

    /// Builds a config from string properties, e.g. `{"path": "/var/db"}`.
    pub fn from_properties(properties: &HashMap<String, String>) -> Self {
        Self { path: properties.get("path").map(PathBuf::from) }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_env() -> Self {
        Self {
            path: env::var(PATH_ENV).ok().filter(|p| !p.is_empty()).map(PathBuf::from),
        }
    }

    /// Returns a config rooted at `path/name`, used for per-collection stores.
    pub fn child(&self, name: &str) -> Result<Self> {
        Ok(Self::new(self.root()?.join(name)))
    }

    /// The configured root directory.
    pub fn root(&self) -> Result<&Path> {
        self.path
            .as_deref()
            .ok_or_else(|| Error::Configuration("you must specify a path when creating a store".to_string()))
    }
}
