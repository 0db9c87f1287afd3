//! The `base` relation every compiled statement selects from.
//!
//! `base` is the dataset's raw query wrapped as a derived table, with the
//! tenant scope (and any trusted block predicate) applied as a `WHERE`
//! directly on it. Everything the compiler adds on top (grouping, ordering,
//! limits) reads from `base`, so no outer clause can drop the scope.

use crate::model::Dataset;
use crate::sql::{trusted_predicate, Cte, Expr, FromSource, Query};

use super::{CompileError, CompileResult};

/// Name of the CTE holding the scoped dataset rows.
pub const BASE: &str = "base";

/// Alias of the raw dataset body inside `base`.
const SOURCE_ALIAS: &str = "__source";

/// Row-level tenant restriction for one dashboard instance.
///
/// Constructed explicitly: either a vetted predicate or an explicit
/// "no restriction". There is no default.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantScope(Option<String>);

impl TenantScope {
    /// Restrict rows with a pre-vetted boolean predicate.
    ///
    /// A blank predicate restricts nothing.
    pub fn predicate(sql: impl Into<String>) -> Self {
        let sql = sql.into();
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            Self(None)
        } else {
            Self(Some(trimmed.to_string()))
        }
    }

    /// Apply no tenant restriction.
    pub fn unrestricted() -> Self {
        Self(None)
    }

    /// Scope from an instance's optional tenant filter.
    pub fn from_filter(filter: Option<&str>) -> Self {
        filter.map_or_else(Self::unrestricted, Self::predicate)
    }

    pub fn as_predicate(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn is_unrestricted(&self) -> bool {
        self.0.is_none()
    }
}

/// A dataset's raw query bound to the scope it must be read under.
#[derive(Debug, Clone)]
pub struct BaseRelation {
    dataset_id: String,
    raw_query: String,
    scope: TenantScope,
    block_filter: Option<String>,
}

impl BaseRelation {
    /// Bind `dataset` to `scope`. Fails for inactive datasets.
    pub fn new(dataset: &Dataset, scope: TenantScope) -> CompileResult<Self> {
        if !dataset.active {
            return Err(CompileError::DatasetInactive(dataset.id.clone()));
        }
        Ok(Self {
            dataset_id: dataset.id.clone(),
            raw_query: dataset.query.clone(),
            scope,
            block_filter: None,
        })
    }

    /// Narrow rows further with a trusted, admin-authored block predicate.
    #[must_use]
    pub fn with_block_filter(mut self, predicate: Option<&str>) -> Self {
        self.block_filter = predicate
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        self
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    pub fn scope(&self) -> &TenantScope {
        &self.scope
    }

    /// The `base` CTE, with `conditions` ANDed after the trusted predicates.
    pub(crate) fn to_cte(&self, conditions: Vec<Expr>) -> Cte {
        let mut query = Query::new()
            .select_star()
            .from(FromSource::subquery(&self.raw_query, SOURCE_ALIAS));

        if let Some(predicate) = self.scope.as_predicate() {
            query = query.filter(trusted_predicate(predicate));
        }
        if let Some(predicate) = &self.block_filter {
            query = query.filter(trusted_predicate(predicate));
        }
        for condition in conditions {
            query = query.filter(condition);
        }

        Cte::new(BASE, query)
    }
}
