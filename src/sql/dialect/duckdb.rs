//! DuckDB takes PostgreSQL's placeholders and `DATE_TRUNC`, and has a
//! native `MEDIAN`.

use super::postgres::date_trunc_call;
use super::SqlDialect;
use crate::model::Granularity;
use crate::sql::token::TokenStream;

#[derive(Debug, Clone, Copy)]
pub struct DuckDb;

impl SqlDialect for DuckDb {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn placeholder(&self, n: usize) -> String {
        format!("${}", n)
    }

    fn date_trunc(&self, unit: Granularity, inner: TokenStream) -> TokenStream {
        date_trunc_call(unit, inner)
    }
}
