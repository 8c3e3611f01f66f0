//! Byte payload cache.
//!
//! Entries are keyed by the agent's opaque payload id and written once: a
//! payload fetched while the agent was reachable keeps being served after it
//! goes away. Each service owns its cache; there is no process-wide instance.

use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("byte cache backend failed: {0}")]
    Backend(String),

    #[error("failed to create cache directory {path}: {source}")]
    Directory {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        CacheError::Backend(err.to_string())
    }
}

/// Key-value store for byte payloads.
///
/// `get` distinguishes "absent" (`None`) from "cached empty payload"
/// (`Some(vec![])`). Writing an id that is already present keeps the first
/// payload, so racing fetches of the same id are harmless.
pub trait ByteCache: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, CacheError>;

    fn put(&self, id: &str, contents: &[u8]) -> Result<(), CacheError>;

    fn len(&self) -> Result<usize, CacheError>;

    fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}

/// Cache that lives as long as the service does.
#[derive(Debug, Default)]
pub struct MemoryByteCache {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryByteCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ByteCache for MemoryByteCache {
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| CacheError::Backend("memory cache lock poisoned".to_string()))?;
        Ok(entries.get(id).cloned())
    }

    fn put(&self, id: &str, contents: &[u8]) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| CacheError::Backend("memory cache lock poisoned".to_string()))?;
        entries
            .entry(id.to_string())
            .or_insert_with(|| contents.to_vec());
        Ok(())
    }

    fn len(&self) -> Result<usize, CacheError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| CacheError::Backend("memory cache lock poisoned".to_string()))?;
        Ok(entries.len())
    }
}
