//! Per-backend rendering rules.
//!
//! The three backends agree on most syntax. They differ in:
//!
//! - bind parameters: `$n` (PostgreSQL, DuckDB) vs `?n` (SQLite)
//! - time buckets: `DATE_TRUNC` vs `strftime`/`date` formulas
//! - median: an ordered-set aggregate vs a plain `MEDIAN`

mod duckdb;
mod postgres;
mod sqlite;

pub use duckdb::DuckDb;
pub use postgres::Postgres;
pub use sqlite::Sqlite;

use super::token::TokenStream;
use crate::model::Granularity;

/// How one backend spells the constructs the compiler emits.
pub trait SqlDialect: std::fmt::Debug + Sync {
    fn name(&self) -> &'static str;

    /// Double-quoted, with embedded quotes doubled, so any input stays a
    /// single identifier.
    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    /// Placeholder for the 1-based parameter `n`.
    fn placeholder(&self, n: usize) -> String;

    /// Start of the `unit` bucket containing `inner`.
    fn date_trunc(&self, unit: Granularity, inner: TokenStream) -> TokenStream;

    fn median(&self, inner: TokenStream) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.call("MEDIAN", [inner]);
        ts
    }
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    #[default]
    Postgres,
    DuckDb,
    Sqlite,
}

impl Dialect {
    pub fn rules(self) -> &'static dyn SqlDialect {
        match self {
            Dialect::Postgres => &Postgres,
            Dialect::DuckDb => &DuckDb,
            Dialect::Sqlite => &Sqlite,
        }
    }
}

impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.rules().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.rules().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.rules().quote_string(s)
    }

    fn placeholder(&self, n: usize) -> String {
        self.rules().placeholder(n)
    }

    fn date_trunc(&self, unit: Granularity, inner: TokenStream) -> TokenStream {
        self.rules().date_trunc(unit, inner)
    }

    fn median(&self, inner: TokenStream) -> TokenStream {
        self.rules().median(inner)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
