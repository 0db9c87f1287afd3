//! Identifier validation.
//!
//! Every field name, aggregation verb and granularity that ends up in
//! generated SQL passes through here first, checked against the dataset's
//! own column metadata. Field names are handed to the compiler only as
//! [`ValidatedField`], which nothing outside this module can construct.
//!
//! The raw dataset body is trusted once it passes [`validate_raw_query`];
//! the same guard backs the executor's read-only check.

use once_cell::sync::Lazy;
use regex::Regex;
use sqlparser::ast::Statement;
use sqlparser::dialect::{DuckDbDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

use crate::model::{AggregationVerb, ColumnMetadata, DatasetMetadata, Granularity, SemanticType};
use crate::sql::{col, Dialect, Expr};

/// Validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Field is not an output column of the dataset.
    FieldNotFound { field: String },
    /// Verb is not one of the known aggregation verbs.
    UnknownAggregation { verb: String },
    /// Verb is known but not allowed for the column's semantic type.
    AggregationNotAllowed {
        verb: AggregationVerb,
        field: String,
        semantic_type: SemanticType,
    },
    /// Unit is not one of the known granularities.
    InvalidGranularity { unit: String },
    /// Granularity requested on a column that is not a datetime.
    GranularityNotApplicable { field: String },
    /// Raw dataset body is not a single read-only query.
    RawQueryRejected { reason: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::FieldNotFound { field } => {
                write!(f, "Field '{}' not found in dataset", field)
            }
            ValidationError::UnknownAggregation { verb } => {
                write!(f, "Unknown aggregation '{}'", verb)
            }
            ValidationError::AggregationNotAllowed {
                verb,
                field,
                semantic_type,
            } => {
                write!(
                    f,
                    "Aggregation '{}' not allowed on {} field '{}'",
                    verb,
                    semantic_type.as_str(),
                    field
                )
            }
            ValidationError::InvalidGranularity { unit } => {
                write!(f, "Invalid granularity '{}'", unit)
            }
            ValidationError::GranularityNotApplicable { field } => {
                write!(f, "Granularity requires a datetime field, '{}' is not", field)
            }
            ValidationError::RawQueryRejected { reason } => {
                write!(f, "Dataset query rejected: {}", reason)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    /// The offending field, when there is one.
    pub fn field(&self) -> Option<&str> {
        match self {
            ValidationError::FieldNotFound { field }
            | ValidationError::AggregationNotAllowed { field, .. }
            | ValidationError::GranularityNotApplicable { field } => Some(field),
            _ => None,
        }
    }
}

pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Fields, verbs, units
// =============================================================================

/// A column name proven to exist in a dataset's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedField {
    name: String,
    semantic_type: SemanticType,
    database_type: String,
}

impl ValidatedField {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn semantic_type(&self) -> SemanticType {
        self.semantic_type
    }

    pub fn database_type(&self) -> &str {
        &self.database_type
    }

    /// Quoted column reference for the SQL builder.
    pub fn column(&self) -> Expr {
        col(&self.name)
    }

    fn from_column(column: &ColumnMetadata) -> Self {
        Self {
            name: column.name.clone(),
            semantic_type: column.semantic_type,
            database_type: column.database_type.clone(),
        }
    }
}

/// Check that `name` is one of the dataset's columns.
pub fn validate_field(name: &str, metadata: &DatasetMetadata) -> ValidationResult<ValidatedField> {
    let column = metadata
        .get(name)
        .ok_or_else(|| ValidationError::FieldNotFound {
            field: name.to_string(),
        })?;
    Ok(ValidatedField::from_column(column))
}

/// Check that `name` exists and that `verb` may be applied to it.
pub fn validate_aggregated_field(
    name: &str,
    verb: AggregationVerb,
    metadata: &DatasetMetadata,
) -> ValidationResult<ValidatedField> {
    let column = metadata
        .get(name)
        .ok_or_else(|| ValidationError::FieldNotFound {
            field: name.to_string(),
        })?;
    validate_aggregation(verb, column)?;
    Ok(ValidatedField::from_column(column))
}

/// Parse a verb name into the closed verb set.
pub fn validate_verb_name(verb: &str) -> ValidationResult<AggregationVerb> {
    AggregationVerb::parse(verb).ok_or_else(|| ValidationError::UnknownAggregation {
        verb: verb.to_string(),
    })
}

/// Check that `verb` is allowed on `column`.
pub fn validate_aggregation(
    verb: AggregationVerb,
    column: &ColumnMetadata,
) -> ValidationResult<AggregationVerb> {
    if column.allows(verb) {
        Ok(verb)
    } else {
        Err(ValidationError::AggregationNotAllowed {
            verb,
            field: column.name.clone(),
            semantic_type: column.semantic_type,
        })
    }
}

/// Parse a granularity name into the closed unit set.
pub fn validate_granularity(unit: &str) -> ValidationResult<Granularity> {
    Granularity::parse(unit).ok_or_else(|| ValidationError::InvalidGranularity {
        unit: unit.to_string(),
    })
}

/// Check that a time bucket may be applied to `field`.
pub fn validate_granularity_for(field: &ValidatedField) -> ValidationResult<()> {
    if field.semantic_type == SemanticType::Datetime {
        Ok(())
    } else {
        Err(ValidationError::GranularityNotApplicable {
            field: field.name.clone(),
        })
    }
}

// =============================================================================
// Raw dataset bodies
// =============================================================================

static FORBIDDEN_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(insert|update|delete|drop|create|alter|truncate|grant|revoke|execute|call|merge|copy|attach|detach|pragma|vacuum)\b",
    )
    .expect("static regex")
});

static LEADING_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(select|with)\b").expect("static regex"));

fn reject(reason: impl Into<String>) -> ValidationError {
    ValidationError::RawQueryRejected {
        reason: reason.into(),
    }
}

/// Check that `sql` parses as exactly one query statement.
///
/// Shared with the executor, which runs it on every compiled statement.
pub fn ensure_single_query(sql: &str, dialect: Dialect) -> ValidationResult<()> {
    let parsed = match dialect {
        Dialect::Postgres => Parser::parse_sql(&PostgreSqlDialect {}, sql),
        Dialect::DuckDb => Parser::parse_sql(&DuckDbDialect {}, sql),
        Dialect::Sqlite => Parser::parse_sql(&SQLiteDialect {}, sql),
    }
    .map_err(|e| reject(format!("could not parse: {}", e)))?;

    match parsed.as_slice() {
        [Statement::Query(_)] => Ok(()),
        [] => Err(reject("empty statement")),
        [_] => Err(reject("statement is not a query")),
        _ => Err(reject("multiple statements")),
    }
}

/// Vet a raw dataset body at authoring time.
///
/// Returns the body with surrounding whitespace and one trailing `;`
/// removed.
pub fn validate_raw_query(sql: &str, dialect: Dialect) -> ValidationResult<String> {
    let trimmed = sql.trim();
    let body = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();

    if body.is_empty() {
        return Err(reject("empty query"));
    }
    if body.contains(';') {
        return Err(reject("statement separators are not allowed"));
    }
    if !LEADING_KEYWORD.is_match(body) {
        return Err(reject("query must start with SELECT or WITH"));
    }
    if let Some(m) = FORBIDDEN_KEYWORDS.find(body) {
        return Err(reject(format!(
            "forbidden keyword '{}'",
            m.as_str().to_uppercase()
        )));
    }
    ensure_single_query(body, dialect)?;

    Ok(body.to_string())
}
