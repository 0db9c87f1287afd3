//! # Painel
//!
//! A read-only semantic query engine for BI dashboards.
//!
//! ## Architecture
//!
//! Painel turns chart configurations over saved SQL datasets into safe,
//! parameterized aggregate queries and chart-ready payloads:
//!
//! ```text
//! catalog ──► metadata ──► compile ──► executor ──► normalize
//!  dataset     probe +      WITH base     SQLite or     axis / metric /
//!  block       classify     AS (...)      worker        table payload
//! ```
//!
//! [`dashboard::Engine`] orchestrates the pipeline per block and
//! [`web`] exposes it over HTTP.

pub mod cache;
pub mod compile;
pub mod config;
pub mod dashboard;
pub mod executor;
pub mod metadata;
pub mod model;
pub mod normalize;
pub mod sql;
pub mod validation;
pub mod web;
pub mod worker;

/// The types most callers need.
pub mod prelude {
    pub use crate::compile::{compile, resolve_intent, BaseRelation, CompileOptions, TenantScope};
    pub use crate::config::Settings;
    pub use crate::dashboard::{Catalog, DashboardResponse, Engine, EngineError, StaticCatalog};
    pub use crate::executor::{Executor, QueryBackend, RowSet};
    pub use crate::model::{
        BlockConfig, ColumnMetadata, DashboardBlock, Dataset, DatasetMetadata, SemanticType,
    };
    pub use crate::normalize::ChartPayload;
    pub use crate::sql::Dialect;
}

pub use dashboard::Engine;
pub use sql::Dialect;
