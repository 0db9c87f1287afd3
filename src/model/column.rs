//! Column metadata derived from a dataset's output columns.

use serde::{Deserialize, Serialize};

use super::intent::{AggregationVerb, Granularity};

/// Semantic role of a dataset column.
///
/// Variant order is the listing order used by metadata responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Datetime,
    Measure,
    Identifier,
    Dimension,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::Datetime => "datetime",
            SemanticType::Measure => "measure",
            SemanticType::Identifier => "identifier",
            SemanticType::Dimension => "dimension",
        }
    }

    /// Aggregation verbs that make sense for this role.
    ///
    /// `count_distinct` is reserved for low-cardinality dimensions and
    /// identifiers, so measures get every other verb.
    pub fn allowed_aggregations(&self) -> Vec<AggregationVerb> {
        match self {
            SemanticType::Measure => AggregationVerb::ALL
                .into_iter()
                .filter(|verb| *verb != AggregationVerb::CountDistinct)
                .collect(),
            SemanticType::Datetime | SemanticType::Identifier | SemanticType::Dimension => {
                vec![AggregationVerb::Count, AggregationVerb::CountDistinct]
            }
        }
    }

    pub fn allowed_granularities(&self) -> Vec<Granularity> {
        match self {
            SemanticType::Datetime => Granularity::ALL.to_vec(),
            _ => Vec::new(),
        }
    }
}

/// Metadata for one output column of a dataset query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub semantic_type: SemanticType,
    /// Type name as reported by the database, lower-cased. Empty when the
    /// backend could not tell.
    pub database_type: String,
    pub allowed_aggregations: Vec<AggregationVerb>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_granularities: Vec<Granularity>,
}

impl ColumnMetadata {
    pub fn new(
        name: impl Into<String>,
        semantic_type: SemanticType,
        database_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            semantic_type,
            database_type: database_type.into(),
            allowed_aggregations: semantic_type.allowed_aggregations(),
            allowed_granularities: semantic_type.allowed_granularities(),
        }
    }

    pub fn allows(&self, verb: AggregationVerb) -> bool {
        self.allowed_aggregations.contains(&verb)
    }

    pub fn is_datetime(&self) -> bool {
        self.semantic_type == SemanticType::Datetime
    }
}

/// All column metadata for one dataset, in probe order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub columns: Vec<ColumnMetadata>,
}

impl DatasetMetadata {
    pub fn new(columns: Vec<ColumnMetadata>) -> Self {
        Self { columns }
    }

    /// Look up a column by exact name.
    pub fn get(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Columns ordered for display: datetime, measure, identifier,
    /// dimension, then by name.
    pub fn sorted(&self) -> Vec<ColumnMetadata> {
        let mut columns = self.columns.clone();
        columns.sort_by(|a, b| {
            a.semantic_type
                .cmp(&b.semantic_type)
                .then_with(|| a.name.cmp(&b.name))
        });
        columns
    }
}
