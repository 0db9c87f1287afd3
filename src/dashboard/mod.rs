//! Dashboard data orchestration.
//!
//! Resolves a dashboard instance's blocks and runs each through
//! compile → execute → normalize, independently and concurrently:
//!
//! ```text
//!              render_dashboard(instance)
//!                        │
//!        ┌───────────────┼───────────────┐
//!        ▼               ▼               ▼
//!   ┌─────────┐     ┌─────────┐     ┌─────────┐
//!   │ block A │     │ block B │     │ block C │   join_all, bounded by
//!   │ compile │     │ compile │     │ compile │   render_timeout
//!   │ execute │     │ execute │     │ execute │
//!   │normalize│     │normalize│     │normalize│
//!   └────┬────┘     └────┬────┘     └────┬────┘
//!        └───────────────┼───────────────┘
//!                        ▼
//!        {data, blocks: [{success, error?}], filters}
//! ```
//!
//! A failing block never fails the whole response.

mod catalog;
mod engine;
mod error;
mod response;

pub use catalog::{Catalog, CatalogError, CatalogResult, StaticCatalog};
pub use engine::{parse_filter_args, Engine};
pub use error::{EngineError, EngineResult};
pub use response::{
    AvailableFilter, BlockEntry, DashboardResponse, ErrorBody, FilterKind, FiltersBody,
    LayoutBody, RequestedFilter,
};
