use super::SqlDialect;
use crate::model::Granularity;
use crate::sql::token::{Keyword, Token, TokenStream};

#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder(&self, n: usize) -> String {
        format!("${}", n)
    }

    fn date_trunc(&self, unit: Granularity, inner: TokenStream) -> TokenStream {
        date_trunc_call(unit, inner)
    }

    fn median(&self, inner: TokenStream) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Function("PERCENTILE_CONT"))
            .symbol("(0.5) WITHIN GROUP (")
            .keyword(Keyword::OrderBy)
            .space()
            .append(inner)
            .symbol(")");
        ts
    }
}

/// `DATE_TRUNC('<unit>', inner)`
pub(super) fn date_trunc_call(unit: Granularity, inner: TokenStream) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.call(
        "DATE_TRUNC",
        [TokenStream::from(Token::Str(unit.as_str().into())), inner],
    );
    ts
}
