//! `SELECT` statements, assembled with a fluent builder.
//!
//! Rendering is line-oriented so logged statements stay readable:
//!
//! ```text
//! WITH "base" AS (
//! SELECT
//!   *
//! FROM (
//! <dataset body>
//! ) AS "__source"
//! WHERE (<scope>) AND "f" >= $1
//! )
//! SELECT
//!   "produto" AS "__x",
//!   SUM("valor") AS "__m0"
//! FROM "base"
//! GROUP BY "produto"
//! ORDER BY "__x" ASC NULLS LAST
//! LIMIT 5001
//! ```

use super::dialect::Dialect;
use super::expr::Expr;
use super::token::{Keyword, Token, TokenStream};

/// A projected expression with an optional alias.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl From<Expr> for SelectItem {
    fn from(expr: Expr) -> Self {
        Self { expr, alias: None }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FromSource {
    /// A named relation, normally a CTE.
    Relation(String),
    /// A dataset body used as a derived table: `(<sql>) AS alias`.
    ///
    /// The body is emitted verbatim and must have passed raw-query
    /// validation.
    Subquery { sql: String, alias: String },
}

impl FromSource {
    pub fn table(name: &str) -> Self {
        FromSource::Relation(name.into())
    }

    pub fn subquery(sql: &str, alias: &str) -> Self {
        FromSource::Subquery {
            sql: sql.trim().into(),
            alias: alias.into(),
        }
    }

    fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();
        match self {
            FromSource::Relation(name) => {
                ts.ident(name);
            }
            FromSource::Subquery { sql, alias } => {
                ts.symbol("(")
                    .newline()
                    .push(Token::Trusted(sql.clone()))
                    .newline()
                    .symbol(")")
                    .space()
                    .keyword(Keyword::As)
                    .space()
                    .ident(alias);
            }
        }
        ts
    }
}

/// One `ORDER BY` key.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub expr: Expr,
    pub descending: bool,
    pub nulls_last: bool,
}

impl Sort {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            descending: false,
            nulls_last: false,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            descending: true,
            ..Self::asc(expr)
        }
    }

    #[must_use]
    pub fn nulls_last(mut self) -> Self {
        self.nulls_last = true;
        self
    }
}

/// A named subquery in the `WITH` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub query: Query,
}

impl Cte {
    pub fn new(name: &str, query: Query) -> Self {
        Self {
            name: name.into(),
            query,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
#[must_use = "a query does nothing until rendered with to_sql()"]
pub struct Query {
    ctes: Vec<Cte>,
    distinct: bool,
    projection: Vec<SelectItem>,
    from: Option<FromSource>,
    /// Joined with `AND`, in insertion order.
    conditions: Vec<Expr>,
    group_by: Vec<Expr>,
    order_by: Vec<Sort>,
    limit: Option<u64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cte(mut self, cte: Cte) -> Self {
        self.ctes.push(cte);
        self
    }

    pub fn select(mut self, items: Vec<SelectItem>) -> Self {
        self.projection = items;
        self
    }

    pub fn select_star(self) -> Self {
        self.select(vec![Expr::Star.into()])
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn from(mut self, source: FromSource) -> Self {
        self.from = Some(source);
        self
    }

    /// AND another condition onto `WHERE`.
    pub fn filter(mut self, condition: Expr) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn group_by(mut self, exprs: Vec<Expr>) -> Self {
        self.group_by = exprs;
        self
    }

    pub fn order_by(mut self, keys: Vec<Sort>) -> Self {
        self.order_by = keys;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        for (i, cte) in self.ctes.iter().enumerate() {
            if i == 0 {
                ts.keyword(Keyword::With).space();
            } else {
                ts.symbol(",").newline();
            }
            ts.ident(&cte.name)
                .space()
                .keyword(Keyword::As)
                .space()
                .symbol("(")
                .newline()
                .append(cte.query.to_tokens(dialect))
                .newline()
                .symbol(")");
        }
        if !self.ctes.is_empty() {
            ts.newline();
        }

        ts.keyword(Keyword::Select);
        if self.distinct {
            ts.space().keyword(Keyword::Distinct);
        }
        for (i, item) in self.projection.iter().enumerate() {
            if i > 0 {
                ts.symbol(",");
            }
            ts.newline().push(Token::Indent).append(item.expr.to_tokens(dialect));
            if let Some(alias) = &item.alias {
                ts.space().keyword(Keyword::As).space().ident(alias);
            }
        }

        if let Some(from) = &self.from {
            ts.newline()
                .keyword(Keyword::From)
                .space()
                .append(from.to_tokens());
        }

        if !self.conditions.is_empty() {
            ts.newline().keyword(Keyword::Where).space();
            for (i, condition) in self.conditions.iter().enumerate() {
                if i > 0 {
                    ts.space().keyword(Keyword::And).space();
                }
                ts.append(condition.to_tokens(dialect));
            }
        }

        if !self.group_by.is_empty() {
            ts.newline().keyword(Keyword::GroupBy).space();
            for (i, expr) in self.group_by.iter().enumerate() {
                if i > 0 {
                    ts.symbol(", ");
                }
                ts.append(expr.to_tokens(dialect));
            }
        }

        if !self.order_by.is_empty() {
            ts.newline().keyword(Keyword::OrderBy).space();
            for (i, key) in self.order_by.iter().enumerate() {
                if i > 0 {
                    ts.symbol(", ");
                }
                ts.append(key.expr.to_tokens(dialect)).space().keyword(if key.descending {
                    Keyword::Desc
                } else {
                    Keyword::Asc
                });
                if key.nulls_last {
                    ts.space().keyword(Keyword::NullsLast);
                }
            }
        }

        if let Some(limit) = self.limit {
            ts.newline()
                .keyword(Keyword::Limit)
                .space()
                .push(Token::Int(limit.min(i64::MAX as u64) as i64));
        }

        ts
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).render(dialect)
    }
}
