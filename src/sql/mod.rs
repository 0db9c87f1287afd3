//! SQL rendering.
//!
//! - [`token`]: the lexical pieces and their per-dialect rendering
//! - [`expr`]: the closed expression set the compiler uses
//! - [`query`]: the `SELECT` builder
//! - [`dialect`]: PostgreSQL, DuckDB and SQLite differences

pub mod dialect;
pub mod expr;
pub mod query;
pub mod token;

pub use dialect::{Dialect, SqlDialect};
pub use expr::{col, param, trusted_predicate, CompareOp, Expr};
pub use query::{Cte, FromSource, Query, SelectItem, Sort};
pub use token::{Keyword, Token, TokenStream};
