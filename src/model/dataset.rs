//! Dataset definitions.

use serde::{Deserialize, Serialize};

use crate::cache::hash_query;

/// A raw, user-authored SQL dataset bound to one connection.
///
/// The raw query is vetted at authoring time to be a single SELECT and is
/// never modified by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    /// Raw query body: a single `SELECT` or `WITH ... SELECT`.
    pub query: String,
    /// Id of the connection record this dataset runs against.
    pub connection: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl Dataset {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        query: impl Into<String>,
        connection: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            query: query.into(),
            connection: connection.into(),
            active: true,
        }
    }

    /// Hash of the raw query text; keys the metadata cache.
    pub fn query_hash(&self) -> String {
        hash_query(&self.query)
    }
}
