//! SQLite-backed persistence for dataset metadata.
//!
//! Lets classified column metadata survive restarts so a cold process does
//! not have to probe every dataset again.
//!
//! # Design
//!
//! - One row per dataset: `dataset -> (query_hash, metadata JSON)`
//! - No TTL - rows are replaced on refresh or when the query hash changes
//! - Versioned - auto-clears on version mismatch

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use super::{CacheError, CacheResult};
use crate::model::DatasetMetadata;

/// Current store schema version. Bump this when the stored format changes.
const CACHE_VERSION: i32 = 1;

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_size_bytes: usize,
}

/// On-disk metadata store.
pub struct PersistentStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for PersistentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentStore").finish_non_exhaustive()
    }
}

impl PersistentStore {
    /// Open or create the store at `path`.
    ///
    /// If the stored version doesn't match, all entries are dropped.
    pub fn open(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self {
            conn: Mutex::new(Connection::open(path)?),
        };
        store.init()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> CacheResult<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init()?;
        Ok(store)
    }

    /// Default location: `<config dir>/painel/metadata.db`.
    pub fn default_path() -> CacheResult<PathBuf> {
        let base = dirs::config_dir().ok_or(CacheError::NoCacheDir)?;
        Ok(base.join("painel").join("metadata.db"))
    }

    fn conn(&self) -> CacheResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CacheError::Poisoned)
    }

    fn init(&self) -> CacheResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS dataset_metadata (
                dataset TEXT PRIMARY KEY,
                query_hash TEXT NOT NULL,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;

        let stored_version: Option<i32> = conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
                let s: String = row.get(0)?;
                Ok(s.parse().unwrap_or(0))
            })
            .optional()?;

        if stored_version != Some(CACHE_VERSION) {
            if stored_version.is_some() {
                conn.execute("DELETE FROM dataset_metadata", [])?;
            }
            conn.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES ('version', ?)",
                params![CACHE_VERSION.to_string()],
            )?;
        }

        Ok(())
    }

    /// Load the entry for `dataset`, with the query hash it was built from.
    pub fn get(&self, dataset: &str) -> CacheResult<Option<(String, DatasetMetadata)>> {
        let row: Option<(String, String)> = self
            .conn()?
            .query_row(
                "SELECT query_hash, value FROM dataset_metadata WHERE dataset = ?",
                params![dataset],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((hash, json)) => Ok(Some((hash, serde_json::from_str(&json)?))),
            None => Ok(None),
        }
    }

    pub fn set(&self, dataset: &str, query_hash: &str, metadata: &DatasetMetadata) -> CacheResult<()> {
        let json = serde_json::to_string(metadata)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO dataset_metadata (dataset, query_hash, value) VALUES (?, ?, ?)",
            params![dataset, query_hash, json],
        )?;
        Ok(())
    }

    pub fn delete(&self, dataset: &str) -> CacheResult<bool> {
        let rows = self
            .conn()?
            .execute("DELETE FROM dataset_metadata WHERE dataset = ?", params![dataset])?;
        Ok(rows > 0)
    }

    pub fn clear_all(&self) -> CacheResult<()> {
        self.conn()?.execute("DELETE FROM dataset_metadata", [])?;
        Ok(())
    }

    pub fn stats(&self) -> CacheResult<CacheStats> {
        let conn = self.conn()?;
        let entry_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM dataset_metadata", [], |row| row.get(0))?;
        let total_size: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(value)), 0) FROM dataset_metadata",
            [],
            |row| row.get(0),
        )?;
        Ok(CacheStats {
            entry_count: entry_count as usize,
            total_size_bytes: total_size as usize,
        })
    }
}
