//! Dashboard templates, blocks and instances.
//!
//! Templates define the blocks; instances bind a template to one
//! organizational unit and carry that unit's tenant filter.

use serde::{Deserialize, Serialize};

use super::filter::FilterableFields;
use super::intent::BlockConfig;

fn default_true() -> bool {
    true
}

fn default_span() -> u16 {
    1
}

fn default_schema() -> serde_json::Value {
    serde_json::json!({ "grid": { "columns": 12 } })
}

/// Grid placement of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    #[serde(default = "default_span")]
    pub col_span: u16,
    #[serde(default = "default_span")]
    pub row_span: u16,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            col_span: 1,
            row_span: 1,
        }
    }
}

impl Layout {
    pub const GRID_COLUMNS: u16 = 12;

    /// Check spans against the grid: `col_span` in 1..=12, `row_span` >= 1.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=Self::GRID_COLUMNS).contains(&self.col_span) {
            return Err(format!(
                "col_span must be between 1 and {}, got {}",
                Self::GRID_COLUMNS,
                self.col_span
            ));
        }
        if self.row_span < 1 {
            return Err(format!("row_span must be at least 1, got {}", self.row_span));
        }
        Ok(())
    }
}

/// Display options for `metric` blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricFormat {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub decimal_places: Option<u8>,
}

/// One visual block of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardBlock {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub order: i32,
    /// Id of the dataset feeding this block.
    pub dataset: String,
    pub chart: BlockConfig,
    #[serde(default)]
    pub layout: Layout,
    /// Extra renderer configuration, passed through untouched.
    #[serde(default)]
    pub chart_options: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub metric_format: MetricFormat,
    /// Trusted, admin-authored predicate narrowing this block's rows.
    #[serde(default)]
    pub block_filter: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// A dashboard layout shared by many instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardTemplate {
    pub id: String,
    pub name: String,
    #[serde(default = "default_schema")]
    pub schema: serde_json::Value,
    #[serde(default)]
    pub filterable_fields: FilterableFields,
    #[serde(default)]
    pub blocks: Vec<DashboardBlock>,
}

impl DashboardTemplate {
    /// Active blocks in render order.
    pub fn active_blocks(&self) -> Vec<&DashboardBlock> {
        let mut blocks: Vec<_> = self.blocks.iter().filter(|b| b.active).collect();
        blocks.sort_by_key(|b| b.order);
        blocks
    }
}

/// The organizational unit an instance is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
}

/// A template bound to one unit and its tenant filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardInstance {
    pub id: String,
    pub template: String,
    pub unit: Unit,
    /// Pre-vetted boolean predicate restricting rows to this unit.
    #[serde(default)]
    pub tenant_filter: Option<String>,
    /// Principals allowed to see this instance. Empty means everyone.
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl DashboardInstance {
    pub fn visible_to(&self, principal: Option<&str>) -> bool {
        if self.users.is_empty() {
            return true;
        }
        principal.is_some_and(|p| self.users.iter().any(|u| u == p))
    }
}
