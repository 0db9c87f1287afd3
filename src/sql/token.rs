//! Lexical pieces of a rendered statement.
//!
//! Builders emit dialect-neutral tokens; only [`TokenStream::render`] looks
//! at the dialect, for identifier quoting and placeholder syntax.

use super::dialect::{Dialect, SqlDialect};

/// Reserved words the builders emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    With,
    As,
    Select,
    Distinct,
    From,
    Where,
    And,
    In,
    IsNotNull,
    GroupBy,
    OrderBy,
    Asc,
    Desc,
    NullsLast,
    Limit,
    False,
}

impl Keyword {
    pub const fn as_str(self) -> &'static str {
        match self {
            Keyword::With => "WITH",
            Keyword::As => "AS",
            Keyword::Select => "SELECT",
            Keyword::Distinct => "DISTINCT",
            Keyword::From => "FROM",
            Keyword::Where => "WHERE",
            Keyword::And => "AND",
            Keyword::In => "IN",
            Keyword::IsNotNull => "IS NOT NULL",
            Keyword::GroupBy => "GROUP BY",
            Keyword::OrderBy => "ORDER BY",
            Keyword::Asc => "ASC",
            Keyword::Desc => "DESC",
            Keyword::NullsLast => "NULLS LAST",
            Keyword::Limit => "LIMIT",
            Keyword::False => "FALSE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Keyword(Keyword),
    /// Fixed punctuation or operator text.
    Symbol(&'static str),
    Space,
    Newline,
    /// One level of select-list indentation.
    Indent,
    /// Column, alias or relation name. Always quoted on output.
    Ident(String),
    Int(i64),
    /// String literal, for dialect format arguments only.
    Str(String),
    /// Positional bind parameter, 1-based.
    Param(usize),
    Function(&'static str),
    /// Pre-vetted SQL emitted as is: dataset bodies and tenant or block
    /// predicates. Caller-supplied values never become this token.
    Trusted(String),
}

impl Token {
    fn write_to(&self, out: &mut String, dialect: Dialect) {
        match self {
            Token::Keyword(kw) => out.push_str(kw.as_str()),
            Token::Symbol(s) | Token::Function(s) => out.push_str(s),
            Token::Space => out.push(' '),
            Token::Newline => out.push('\n'),
            Token::Indent => out.push_str("  "),
            Token::Ident(name) => out.push_str(&dialect.quote_identifier(name)),
            Token::Int(n) => out.push_str(&n.to_string()),
            Token::Str(s) => out.push_str(&dialect.quote_string(s)),
            Token::Param(n) => out.push_str(&dialect.placeholder(*n)),
            Token::Trusted(sql) => out.push_str(sql),
        }
    }
}

/// An ordered run of tokens.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream(Vec<Token>);

impl TokenStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, token: Token) -> &mut Self {
        self.0.push(token);
        self
    }

    pub fn append(&mut self, other: TokenStream) -> &mut Self {
        self.0.extend(other.0);
        self
    }

    pub fn keyword(&mut self, kw: Keyword) -> &mut Self {
        self.push(Token::Keyword(kw))
    }

    pub fn symbol(&mut self, s: &'static str) -> &mut Self {
        self.push(Token::Symbol(s))
    }

    pub fn ident(&mut self, name: &str) -> &mut Self {
        self.push(Token::Ident(name.to_string()))
    }

    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }

    pub fn newline(&mut self) -> &mut Self {
        self.push(Token::Newline)
    }

    /// `NAME(arg, arg, ...)`
    pub fn call(
        &mut self,
        name: &'static str,
        args: impl IntoIterator<Item = TokenStream>,
    ) -> &mut Self {
        self.push(Token::Function(name)).symbol("(");
        for (i, arg) in args.into_iter().enumerate() {
            if i > 0 {
                self.symbol(", ");
            }
            self.append(arg);
        }
        self.symbol(")")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render to SQL text for `dialect`.
    pub fn render(&self, dialect: Dialect) -> String {
        let mut out = String::new();
        for token in &self.0 {
            token.write_to(&mut out, dialect);
        }
        out
    }
}

impl From<Token> for TokenStream {
    fn from(token: Token) -> Self {
        Self(vec![token])
    }
}
