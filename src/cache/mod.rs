//! Dataset metadata cache.
//!
//! Column metadata is expensive to obtain (one probe query against the
//! dataset's connection) and only changes when the dataset's query text
//! changes. Entries are therefore keyed by dataset id and tagged with the
//! hash of the query they were built from; a lookup with a different hash
//! is a miss.
//!
//! The in-memory map is shared across requests. An optional SQLite store
//! (see [`PersistentStore`]) backs it so entries survive restarts.
//! Persistence failures are logged and otherwise ignored: the cache is
//! an optimization, never a source of truth.

mod hash;
mod store;

pub use hash::hash_query;
pub use store::{CacheStats, PersistentStore};

use std::sync::Arc;

use dashmap::DashMap;

use crate::model::DatasetMetadata;

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to determine cache directory")]
    NoCacheDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache store lock poisoned")]
    Poisoned,
}

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Clone)]
struct CachedMetadata {
    query_hash: String,
    metadata: Arc<DatasetMetadata>,
}

/// Process-wide metadata cache.
#[derive(Debug)]
pub struct MetadataCache {
    enabled: bool,
    entries: DashMap<String, CachedMetadata>,
    store: Option<PersistentStore>,
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl MetadataCache {
    /// Memory-only cache.
    pub fn in_memory() -> Self {
        Self {
            enabled: true,
            entries: DashMap::new(),
            store: None,
        }
    }

    /// Memory cache backed by a SQLite store.
    pub fn with_store(store: PersistentStore) -> Self {
        Self {
            store: Some(store),
            ..Self::in_memory()
        }
    }

    /// A cache that never hits. Every lookup goes to the database.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::in_memory()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Look up metadata for `dataset`, valid only for `query_hash`.
    pub fn get(&self, dataset: &str, query_hash: &str) -> Option<Arc<DatasetMetadata>> {
        if !self.enabled {
            return None;
        }

        if let Some(entry) = self.entries.get(dataset) {
            if entry.query_hash == query_hash {
                return Some(Arc::clone(&entry.metadata));
            }
        }

        let store = self.store.as_ref()?;
        match store.get(dataset) {
            Ok(Some((hash, metadata))) if hash == query_hash => {
                let metadata = Arc::new(metadata);
                self.entries.insert(
                    dataset.to_string(),
                    CachedMetadata {
                        query_hash: hash,
                        metadata: Arc::clone(&metadata),
                    },
                );
                tracing::debug!(dataset, "metadata loaded from persistent cache");
                Some(metadata)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(dataset, error = %e, "failed to read persistent metadata cache");
                None
            }
        }
    }

    /// Store metadata for `dataset` built from the query with `query_hash`.
    ///
    /// Replaces any previous entry for the dataset.
    pub fn insert(
        &self,
        dataset: &str,
        query_hash: &str,
        metadata: DatasetMetadata,
    ) -> Arc<DatasetMetadata> {
        let metadata = Arc::new(metadata);
        if !self.enabled {
            return metadata;
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.set(dataset, query_hash, &metadata) {
                tracing::warn!(dataset, error = %e, "failed to write persistent metadata cache");
            }
        }
        self.entries.insert(
            dataset.to_string(),
            CachedMetadata {
                query_hash: query_hash.to_string(),
                metadata: Arc::clone(&metadata),
            },
        );
        metadata
    }

    /// Drop the entry for `dataset`, in memory and on disk.
    pub fn invalidate(&self, dataset: &str) {
        self.entries.remove(dataset);
        if let Some(store) = &self.store {
            if let Err(e) = store.delete(dataset) {
                tracing::warn!(dataset, error = %e, "failed to delete persistent metadata cache entry");
            }
        }
    }

    /// Number of entries held in memory.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
