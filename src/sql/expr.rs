//! Expressions the compiler can place in a statement.
//!
//! The set is closed on purpose: column names only ever appear as quoted
//! identifiers, values only as placeholders, and the single way to emit
//! unquoted text is a [`Expr::Trusted`] predicate.

use super::dialect::{Dialect, SqlDialect};
use super::query::SelectItem;
use super::token::{Keyword, Token, TokenStream};
use crate::model::{AggregationVerb, Granularity};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Star,
    /// Positional bind parameter, 1-based.
    Param(usize),
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    /// `expr IN (values...)`. An empty list renders as `FALSE`.
    InList {
        expr: Box<Expr>,
        values: Vec<Expr>,
    },
    NotNull(Box<Expr>),
    Aggregate {
        verb: AggregationVerb,
        arg: Box<Expr>,
    },
    /// Start of the time bucket containing `expr`.
    Bucket {
        unit: Granularity,
        expr: Box<Expr>,
    },
    /// A vetted boolean predicate, emitted parenthesized and unescaped.
    ///
    /// Only tenant scopes and admin block filters become this variant.
    Trusted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => " = ",
            CompareOp::Gt => " > ",
            CompareOp::Gte => " >= ",
            CompareOp::Lt => " < ",
            CompareOp::Lte => " <= ",
        }
    }
}

pub fn col(name: &str) -> Expr {
    Expr::Column(name.into())
}

/// Bind parameter `n` (1-based).
pub fn param(n: usize) -> Expr {
    Expr::Param(n)
}

pub fn trusted_predicate(sql: &str) -> Expr {
    Expr::Trusted(sql.into())
}

impl Expr {
    pub fn aggregate(verb: AggregationVerb, arg: Expr) -> Expr {
        Expr::Aggregate {
            verb,
            arg: Box::new(arg),
        }
    }

    pub fn bucket(unit: Granularity, expr: Expr) -> Expr {
        Expr::Bucket {
            unit,
            expr: Box::new(expr),
        }
    }

    pub fn compare(self, op: CompareOp, right: Expr) -> Expr {
        Expr::Compare {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    pub fn in_list(self, values: Vec<Expr>) -> Expr {
        Expr::InList {
            expr: Box::new(self),
            values,
        }
    }

    pub fn is_not_null(self) -> Expr {
        Expr::NotNull(Box::new(self))
    }

    /// Project this expression under `name`.
    pub fn alias(self, name: &str) -> SelectItem {
        SelectItem {
            expr: self,
            alias: Some(name.into()),
        }
    }

    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        match self {
            Expr::Column(name) => {
                ts.ident(name);
            }
            Expr::Star => {
                ts.symbol("*");
            }
            Expr::Param(n) => {
                ts.push(Token::Param(*n));
            }
            Expr::Compare { left, op, right } => {
                ts.append(left.to_tokens(dialect))
                    .symbol(op.symbol())
                    .append(right.to_tokens(dialect));
            }
            Expr::InList { values, .. } if values.is_empty() => {
                ts.keyword(Keyword::False);
            }
            Expr::InList { expr, values } => {
                ts.append(expr.to_tokens(dialect))
                    .space()
                    .keyword(Keyword::In)
                    .space()
                    .symbol("(");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        ts.symbol(", ");
                    }
                    ts.append(value.to_tokens(dialect));
                }
                ts.symbol(")");
            }
            Expr::NotNull(expr) => {
                ts.append(expr.to_tokens(dialect))
                    .space()
                    .keyword(Keyword::IsNotNull);
            }
            Expr::Aggregate { verb, arg } => {
                let inner = arg.to_tokens(dialect);
                match verb {
                    AggregationVerb::Sum => ts.call("SUM", [inner]),
                    AggregationVerb::Avg => ts.call("AVG", [inner]),
                    AggregationVerb::Count => ts.call("COUNT", [inner]),
                    AggregationVerb::Min => ts.call("MIN", [inner]),
                    AggregationVerb::Max => ts.call("MAX", [inner]),
                    AggregationVerb::CountDistinct => ts
                        .push(Token::Function("COUNT"))
                        .symbol("(")
                        .keyword(Keyword::Distinct)
                        .space()
                        .append(inner)
                        .symbol(")"),
                    AggregationVerb::Median => ts.append(dialect.median(inner)),
                };
            }
            Expr::Bucket { unit, expr } => {
                ts.append(dialect.date_trunc(*unit, expr.to_tokens(dialect)));
            }
            Expr::Trusted(sql) => {
                ts.symbol("(")
                    .push(Token::Trusted(sql.clone()))
                    .symbol(")");
            }
        }
        ts
    }
}
