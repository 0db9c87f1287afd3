//! Semantic classification of database column types.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::SemanticType;

const DATETIME_TYPES: &[&str] = &[
    "timestamp",
    "timestamptz",
    "timestamp with time zone",
    "timestamp without time zone",
    "date",
    "datetime",
    "time",
    "timetz",
    "interval",
];

const INTEGER_TYPES: &[&str] = &[
    "integer",
    "int",
    "int2",
    "int4",
    "int8",
    "bigint",
    "smallint",
    "mediumint",
    "tinyint",
    "hugeint",
    "utinyint",
    "usmallint",
    "uinteger",
    "ubigint",
    "uhugeint",
    "serial",
    "smallserial",
    "bigserial",
];

const FLOAT_TYPES: &[&str] = &[
    "decimal",
    "numeric",
    "real",
    "double",
    "double precision",
    "float",
    "float4",
    "float8",
    "money",
];

const BOOLEAN_TYPES: &[&str] = &["boolean", "bool"];

/// Broad family of a database type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Integer,
    Float,
    Boolean,
    Datetime,
    Other,
}

impl TypeFamily {
    pub fn is_numeric(self) -> bool {
        matches!(self, TypeFamily::Integer | TypeFamily::Float)
    }
}

static ID_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(id|.+_(id|key|pk|code|cod)|(id|cod)_.+)$").expect("static regex")
});

static PRECISION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)").expect("static regex"));

/// Lower-cased type name with any `(p,s)` suffix and extra whitespace
/// removed.
pub fn base_type(database_type: &str) -> String {
    let lowered = database_type.to_ascii_lowercase();
    PRECISION
        .replace_all(&lowered, "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Family of a reported type, matched on the whole base name.
pub fn type_family(database_type: &str) -> TypeFamily {
    let base = base_type(database_type);
    let base = base.as_str();
    if INTEGER_TYPES.contains(&base) {
        TypeFamily::Integer
    } else if FLOAT_TYPES.contains(&base) {
        TypeFamily::Float
    } else if BOOLEAN_TYPES.contains(&base) {
        TypeFamily::Boolean
    } else if DATETIME_TYPES.contains(&base) {
        TypeFamily::Datetime
    } else {
        TypeFamily::Other
    }
}

/// Whether a column name looks like a key.
pub fn is_identifier_name(name: &str) -> bool {
    ID_NAME.is_match(name)
}

/// Classify an output column by its name and reported type.
///
/// Numeric columns with key-like names are identifiers, other numeric
/// columns are measures. Unknown or empty types are dimensions.
pub fn classify(name: &str, database_type: &str) -> SemanticType {
    let family = type_family(database_type);
    if family == TypeFamily::Datetime {
        SemanticType::Datetime
    } else if family.is_numeric() {
        if is_identifier_name(name) {
            SemanticType::Identifier
        } else {
            SemanticType::Measure
        }
    } else {
        SemanticType::Dimension
    }
}
