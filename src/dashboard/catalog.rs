//! Lookup of dashboard records, datasets and connections.
//!
//! The engine only reads these records. [`StaticCatalog`] loads them from a
//! TOML file:
//!
//! ```toml
//! # Principals allowed to read blocks and datasets outside any instance.
//! admins = ["operacao"]
//!
//! [[datasets]]
//! id = "vendas"
//! name = "Vendas"
//! connection = "local"
//! query = "SELECT produto, valor, data_venda, loja_id FROM vendas"
//!
//! [[templates]]
//! id = "comercial"
//! name = "Comercial"
//!
//! [templates.filterable_fields]
//! temporal = { field = "data_venda" }
//! categorical = [{ field = "produto", label = "Produto" }]
//!
//! [[templates.blocks]]
//! id = "receita-mensal"
//! title = "Receita mensal"
//! dataset = "vendas"
//! layout = { col_span = 6, row_span = 1 }
//! chart = { chart_type = "bar", x_axis_field = "data_venda", x_axis_granularity = "month", y_axis_fields = [{ field = "valor", aggregation = "sum", label = "Total" }] }
//!
//! [[instances]]
//! id = "comercial-sp"
//! template = "comercial"
//! unit = { id = "sp", name = "São Paulo", code = "SP" }
//! tenant_filter = "loja_id = 3"
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::ConnectionRecord;
use crate::model::{DashboardBlock, DashboardInstance, DashboardTemplate, Dataset};
use crate::validation::validate_raw_query;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Catalog file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read catalog: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid catalog: {0}")]
    Invalid(String),
}

impl CatalogError {
    fn not_found(kind: &'static str, id: &str) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Read access to the records a render needs.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn instance(&self, id: &str) -> CatalogResult<DashboardInstance>;
    async fn template(&self, id: &str) -> CatalogResult<DashboardTemplate>;
    /// A block and the id of the template that owns it.
    async fn block(&self, id: &str) -> CatalogResult<(String, DashboardBlock)>;
    async fn dataset(&self, id: &str) -> CatalogResult<Dataset>;
    async fn connection(&self, id: &str) -> CatalogResult<ConnectionRecord>;
    /// Whether `principal` may read data without an instance's tenant scope.
    async fn is_admin(&self, principal: &str) -> bool;
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    admins: Vec<String>,
    #[serde(default)]
    datasets: Vec<Dataset>,
    #[serde(default)]
    templates: Vec<DashboardTemplate>,
    #[serde(default)]
    instances: Vec<DashboardInstance>,
}

/// An in-memory catalog, usually loaded from TOML.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    datasets: HashMap<String, Dataset>,
    templates: HashMap<String, DashboardTemplate>,
    instances: HashMap<String, DashboardInstance>,
    /// block id -> template id
    block_owners: HashMap<String, String>,
    connections: HashMap<String, ConnectionRecord>,
    admins: HashSet<String>,
}

impl StaticCatalog {
    /// Load a catalog file, binding datasets to `connections`.
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        connections: Vec<ConnectionRecord>,
    ) -> CatalogResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CatalogError::FileNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content, connections)
    }

    pub fn from_toml_str(content: &str, connections: Vec<ConnectionRecord>) -> CatalogResult<Self> {
        let file: CatalogFile = toml::from_str(content)?;
        let mut catalog = Self {
            connections: connections
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect(),
            admins: file.admins.into_iter().collect(),
            ..Default::default()
        };
        for dataset in file.datasets {
            catalog.add_dataset(dataset)?;
        }
        for template in file.templates {
            catalog.add_template(template)?;
        }
        for instance in file.instances {
            catalog.add_instance(instance)?;
        }
        Ok(catalog)
    }

    pub fn add_admin(&mut self, principal: impl Into<String>) {
        self.admins.insert(principal.into());
    }

    pub fn add_connection(&mut self, record: ConnectionRecord) {
        self.connections.insert(record.id.clone(), record);
    }

    /// Register a dataset. Its raw query is vetted against the dialect of
    /// its connection and stored trimmed.
    pub fn add_dataset(&mut self, mut dataset: Dataset) -> CatalogResult<()> {
        let connection = self.connections.get(&dataset.connection).ok_or_else(|| {
            CatalogError::Invalid(format!(
                "dataset '{}' references unknown connection '{}'",
                dataset.id, dataset.connection
            ))
        })?;
        dataset.query = validate_raw_query(&dataset.query, connection.dialect())
            .map_err(|e| CatalogError::Invalid(format!("dataset '{}': {}", dataset.id, e)))?;
        if self.datasets.contains_key(&dataset.id) {
            return Err(CatalogError::Invalid(format!(
                "duplicate dataset '{}'",
                dataset.id
            )));
        }
        self.datasets.insert(dataset.id.clone(), dataset);
        Ok(())
    }

    pub fn add_template(&mut self, template: DashboardTemplate) -> CatalogResult<()> {
        if self.templates.contains_key(&template.id) {
            return Err(CatalogError::Invalid(format!(
                "duplicate template '{}'",
                template.id
            )));
        }
        let mut ids = HashSet::new();
        for block in &template.blocks {
            if !ids.insert(block.id.as_str()) || self.block_owners.contains_key(&block.id) {
                return Err(CatalogError::Invalid(format!("duplicate block '{}'", block.id)));
            }
            if !self.datasets.contains_key(&block.dataset) {
                return Err(CatalogError::Invalid(format!(
                    "block '{}' references unknown dataset '{}'",
                    block.id, block.dataset
                )));
            }
            block
                .layout
                .validate()
                .map_err(|e| CatalogError::Invalid(format!("block '{}': {}", block.id, e)))?;
        }
        for block in &template.blocks {
            self.block_owners
                .insert(block.id.clone(), template.id.clone());
        }
        self.templates.insert(template.id.clone(), template);
        Ok(())
    }

    pub fn add_instance(&mut self, instance: DashboardInstance) -> CatalogResult<()> {
        if !self.templates.contains_key(&instance.template) {
            return Err(CatalogError::Invalid(format!(
                "instance '{}' references unknown template '{}'",
                instance.id, instance.template
            )));
        }
        if self.instances.contains_key(&instance.id) {
            return Err(CatalogError::Invalid(format!(
                "duplicate instance '{}'",
                instance.id
            )));
        }
        self.instances.insert(instance.id.clone(), instance);
        Ok(())
    }

    /// Dataset ids, sorted.
    pub fn dataset_ids(&self) -> Vec<&str> {
        let mut ids: Vec<_> = self.datasets.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn instance(&self, id: &str) -> CatalogResult<DashboardInstance> {
        self.instances
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::not_found("Dashboard instance", id))
    }

    async fn template(&self, id: &str) -> CatalogResult<DashboardTemplate> {
        self.templates
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::not_found("Dashboard template", id))
    }

    async fn block(&self, id: &str) -> CatalogResult<(String, DashboardBlock)> {
        let owner = self
            .block_owners
            .get(id)
            .ok_or_else(|| CatalogError::not_found("Dashboard block", id))?;
        self.templates
            .get(owner)
            .and_then(|t| t.blocks.iter().find(|b| b.id == id))
            .map(|block| (owner.clone(), block.clone()))
            .ok_or_else(|| CatalogError::not_found("Dashboard block", id))
    }

    async fn dataset(&self, id: &str) -> CatalogResult<Dataset> {
        self.datasets
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::not_found("Dataset", id))
    }

    async fn connection(&self, id: &str) -> CatalogResult<ConnectionRecord> {
        self.connections
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::not_found("Connection", id))
    }

    async fn is_admin(&self, principal: &str) -> bool {
        self.admins.contains(principal)
    }
}
