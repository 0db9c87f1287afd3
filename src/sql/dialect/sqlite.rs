//! SQLite has no date type and no `DATE_TRUNC`.
//!
//! Buckets are built from `strftime`/`date` and come back as ISO-8601 text.
//! Weeks start on Monday and quarters truncate to their first month.
//! `MEDIAN` is registered on every connection the embedded backend opens.

use super::SqlDialect;
use crate::model::Granularity;
use crate::sql::token::{Token, TokenStream};

#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder(&self, n: usize) -> String {
        format!("?{}", n)
    }

    fn date_trunc(&self, unit: Granularity, inner: TokenStream) -> TokenStream {
        match unit {
            Granularity::Hour => strftime("%Y-%m-%d %H:00:00", inner),
            Granularity::Day => date(inner, &[]),
            Granularity::Week => date(inner, &["-6 days", "weekday 1"]),
            Granularity::Month => strftime("%Y-%m-01", inner),
            Granularity::Quarter => {
                let mut first_month = TokenStream::new();
                first_month
                    .symbol("((CAST(")
                    .append(strftime("%m", inner.clone()))
                    .symbol(" AS INTEGER) - 1) / 3) * 3 + 1");
                let mut ts = TokenStream::new();
                ts.call(
                    "PRINTF",
                    [text("%s-%02d-01"), strftime("%Y", inner), first_month],
                );
                ts
            }
            Granularity::Year => strftime("%Y-01-01", inner),
        }
    }
}

fn text(s: &str) -> TokenStream {
    TokenStream::from(Token::Str(s.into()))
}

fn strftime(format: &str, inner: TokenStream) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.call("STRFTIME", [text(format), inner]);
    ts
}

fn date(inner: TokenStream, modifiers: &[&str]) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.call(
        "DATE",
        std::iter::once(inner).chain(modifiers.iter().map(|m| text(m))),
    );
    ts
}
