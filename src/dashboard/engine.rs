//! Per-block compile → execute → normalize pipelines.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;

use crate::cache::{MetadataCache, PersistentStore};
use crate::compile::{
    compile, compile_filter_options, compile_preview, resolve_intent, BaseRelation,
    CompileOptions, CompiledChart, TenantScope,
};
use crate::config::{ConnectionRecord, ExecutorSettings, Settings, SettingsError};
use crate::executor::{Executor, RowSet, SharedWorker};
use crate::metadata::Inspector;
use crate::model::{
    DashboardBlock, DashboardInstance, Dataset, DatasetMetadata, DynamicFilter, FilterableFields,
};
use crate::normalize::{normalize, ChartPayload};
use crate::sql::Dialect;

use super::catalog::Catalog;
use super::error::{EngineError, EngineResult};
use super::response::{
    AvailableFilter, BlockEntry, DashboardResponse, FilterKind, FiltersBody, RequestedFilter,
};

/// The engine boundary: renders dashboards and blocks from catalog records.
pub struct Engine {
    catalog: Arc<dyn Catalog>,
    executor: Arc<Executor>,
    inspector: Inspector,
}

/// A block resolved to everything its pipeline needs.
struct BlockContext {
    dataset: Dataset,
    connection: ConnectionRecord,
    metadata: Arc<DatasetMetadata>,
}

impl Engine {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        executor: Arc<Executor>,
        cache: Arc<MetadataCache>,
    ) -> Self {
        let inspector = Inspector::new(Arc::clone(&executor), cache);
        Self {
            catalog,
            executor,
            inspector,
        }
    }

    /// Build the executor, worker and metadata cache described by
    /// `settings`.
    ///
    /// A persistent cache that cannot be opened falls back to memory.
    pub fn from_settings(settings: &Settings, catalog: Arc<dyn Catalog>) -> Result<Self, SettingsError> {
        let worker = SharedWorker::new(settings.worker_path()?, settings.worker.request_timeout());
        let executor = Executor::new(settings.executor.clone()).with_worker(worker);

        let cache = if !settings.cache.enabled {
            MetadataCache::disabled()
        } else if settings.cache.persistent {
            let store = match settings.cache_path()? {
                Some(path) => PersistentStore::open(&path),
                None => PersistentStore::default_path().and_then(|p| PersistentStore::open(&p)),
            };
            match store {
                Ok(store) => MetadataCache::with_store(store),
                Err(e) => {
                    tracing::warn!(error = %e, "persistent metadata cache unavailable, using memory");
                    MetadataCache::in_memory()
                }
            }
        } else {
            MetadataCache::in_memory()
        };

        Ok(Self::new(catalog, Arc::new(executor), Arc::new(cache)))
    }

    fn limits(&self) -> &ExecutorSettings {
        self.executor.settings()
    }

    pub fn catalog(&self) -> &dyn Catalog {
        self.catalog.as_ref()
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// An active instance visible to `principal`. Anything else is not found.
    pub async fn visible_instance(
        &self,
        id: &str,
        principal: Option<&str>,
    ) -> EngineResult<DashboardInstance> {
        let instance = self.catalog.instance(id).await?;
        if !instance.active || !instance.visible_to(principal) {
            return Err(EngineError::NotFound {
                kind: "Dashboard instance",
                id: id.to_string(),
            });
        }
        Ok(instance)
    }

    async fn dataset_context(&self, dataset_id: &str, refresh: bool) -> EngineResult<BlockContext> {
        let dataset = self.catalog.dataset(dataset_id).await?;
        let connection = self.catalog.connection(&dataset.connection).await?;
        let metadata = if refresh {
            self.inspector.refresh(&dataset, &connection).await?
        } else {
            self.inspector.inspect(&dataset, &connection).await?
        };
        Ok(BlockContext {
            dataset,
            connection,
            metadata,
        })
    }

    /// Column metadata for a dataset. `refresh` drops the cached entry first.
    pub async fn dataset_metadata(
        &self,
        dataset_id: &str,
        refresh: bool,
    ) -> EngineResult<Arc<DatasetMetadata>> {
        Ok(self.dataset_context(dataset_id, refresh).await?.metadata)
    }

    // ========================================================================
    // Filters
    // ========================================================================

    /// Parse `field__op=value` parameters against a template's filterable
    /// fields. Other parameters, and `in` lists with no items, are ignored.
    pub fn parse_filters(
        fields: &FilterableFields,
        params: &[(String, String)],
    ) -> Vec<RequestedFilter> {
        let mut filters = Vec::new();
        for (name, value) in params {
            let Some((field, op)) = DynamicFilter::split_param(name) else {
                continue;
            };
            if !fields.allows(field) {
                tracing::warn!(field, param = %name, "ignoring filter on a field that is not filterable");
                continue;
            }
            if !DynamicFilter::has_values(op, value) {
                tracing::debug!(field, param = %name, "ignoring empty filter list");
                continue;
            }
            filters.push(RequestedFilter {
                field: field.to_string(),
                op,
                value: value.clone(),
            });
        }
        filters
    }

    /// Cast requested filters for one dataset, dropping fields it lacks.
    fn filters_for(
        block_id: &str,
        metadata: &DatasetMetadata,
        requested: &[RequestedFilter],
    ) -> Vec<DynamicFilter> {
        requested
            .iter()
            .filter_map(|f| match metadata.get(&f.field) {
                Some(column) => Some(DynamicFilter::from_param(
                    &f.field,
                    f.op,
                    &f.value,
                    &column.database_type,
                )),
                None => {
                    tracing::debug!(block = block_id, field = %f.field, "filter field not in dataset, skipping");
                    None
                }
            })
            .collect()
    }

    async fn filter_values(
        &self,
        field: &str,
        scope: &TenantScope,
        blocks: &[&DashboardBlock],
    ) -> Vec<serde_json::Value> {
        for block in blocks {
            let Ok(ctx) = self.dataset_context(&block.dataset, false).await else {
                continue;
            };
            if !ctx.metadata.contains(field) {
                continue;
            }
            let result = async {
                let base = BaseRelation::new(&ctx.dataset, scope.clone())?;
                let query = compile_filter_options(
                    &base,
                    &ctx.metadata,
                    field,
                    self.limits().filter_options_limit,
                    ctx.connection.dialect(),
                )?;
                let limit = self.limits().filter_options_limit as usize;
                let rows = self
                    .executor
                    .execute_capped(&ctx.connection, &query, limit)
                    .await?;
                Ok::<_, EngineError>(
                    rows.rows
                        .into_iter()
                        .filter_map(|row| row.into_iter().next())
                        .collect::<Vec<_>>(),
                )
            }
            .await;
            return match result {
                Ok(values) => values,
                Err(e) => {
                    tracing::warn!(field, dataset = %ctx.dataset.id, error = %e, "failed to list filter values");
                    Vec::new()
                }
            };
        }
        Vec::new()
    }

    async fn available_filters(
        &self,
        fields: &FilterableFields,
        scope: &TenantScope,
        blocks: &[&DashboardBlock],
    ) -> Vec<AvailableFilter> {
        let mut available = Vec::new();
        if let Some(temporal) = &fields.temporal {
            available.push(AvailableFilter {
                field: temporal.field.clone(),
                label: temporal.label.clone().unwrap_or_else(|| temporal.field.clone()),
                kind: FilterKind::Temporal,
                values: Vec::new(),
            });
        }
        let categorical = join_all(
            fields
                .categorical
                .iter()
                .map(|f| self.filter_values(&f.field, scope, blocks)),
        )
        .await;
        for (field, values) in fields.categorical.iter().zip(categorical) {
            available.push(AvailableFilter {
                field: field.field.clone(),
                label: field.label.clone().unwrap_or_else(|| field.field.clone()),
                kind: FilterKind::Categorical,
                values,
            });
        }
        available
    }

    // ========================================================================
    // Pipelines
    // ========================================================================

    /// Resolve and compile a block without executing it.
    ///
    /// Configuration errors surface before the dataset is inspected.
    async fn compile_in(
        &self,
        block: &DashboardBlock,
        scope: &TenantScope,
        requested: &[RequestedFilter],
        dialect: Option<Dialect>,
    ) -> EngineResult<(BlockContext, CompiledChart)> {
        let intent = resolve_intent(&block.chart)?;
        let ctx = self.dataset_context(&block.dataset, false).await?;
        let base = BaseRelation::new(&ctx.dataset, scope.clone())?
            .with_block_filter(block.block_filter.as_deref());
        let filters = Self::filters_for(&block.id, &ctx.metadata, requested);
        let options = CompileOptions::default()
            .with_dialect(dialect.unwrap_or_else(|| ctx.connection.dialect()))
            .with_row_limit(self.limits().max_rows as u64 + 1);
        let compiled = compile(&base, &ctx.metadata, &intent, &filters, &options)?;
        Ok((ctx, compiled))
    }

    async fn run_pipeline(
        &self,
        block: &DashboardBlock,
        scope: &TenantScope,
        requested: &[RequestedFilter],
    ) -> EngineResult<(ChartPayload, usize)> {
        let (ctx, compiled) = self.compile_in(block, scope, requested, None).await?;
        let rows = self.executor.execute(&ctx.connection, &compiled.query).await?;
        let payload = normalize(&rows, &compiled.plan)?;
        Ok((payload, rows.row_count()))
    }

    /// Run one block, logging its outcome.
    async fn render_one(
        &self,
        block: &DashboardBlock,
        scope: &TenantScope,
        requested: &[RequestedFilter],
    ) -> EngineResult<ChartPayload> {
        let started = Instant::now();
        let result = self.run_pipeline(block, scope, requested).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok((_, rows)) => tracing::info!(
                block = %block.id,
                dataset = %block.dataset,
                elapsed_ms,
                rows,
                "rendered block"
            ),
            Err(e) => tracing::warn!(
                block = %block.id,
                dataset = %block.dataset,
                elapsed_ms,
                error_kind = e.kind(),
                error = %e,
                "block failed"
            ),
        }
        result.map(|(payload, _)| payload)
    }

    /// Render every active block of an instance concurrently.
    ///
    /// Block failures are reported per block. Blocks still running at the
    /// render deadline are dropped and reported as
    /// `RenderDeadlineExceeded`.
    pub async fn render_dashboard(
        &self,
        instance_id: &str,
        principal: Option<&str>,
        params: &[(String, String)],
    ) -> EngineResult<DashboardResponse> {
        let instance = self.visible_instance(instance_id, principal).await?;
        let template = self.catalog.template(&instance.template).await?;
        let scope = TenantScope::from_filter(instance.tenant_filter.as_deref());
        let requested = Self::parse_filters(&template.filterable_fields, params);
        let blocks = template.active_blocks();

        let render_timeout = self.limits().render_timeout();
        let deadline = tokio::time::Instant::now() + render_timeout;
        let timeout_ms = render_timeout.as_millis() as u64;

        let (scope_ref, requested_ref) = (&scope, &requested);
        let pipelines = blocks.iter().map(move |block| async move {
            tokio::time::timeout_at(deadline, self.render_one(block, scope_ref, requested_ref))
                .await
                .unwrap_or_else(|_| {
                    tracing::warn!(block = %block.id, timeout_ms, "block dropped at render deadline");
                    Err(EngineError::RenderDeadlineExceeded(timeout_ms))
                })
        });
        let filters = async {
            tokio::time::timeout_at(
                deadline,
                self.available_filters(&template.filterable_fields, &scope, &blocks),
            )
            .await
            .unwrap_or_default()
        };
        let (outcomes, available) = tokio::join!(join_all(pipelines), filters);

        let mut data = BTreeMap::new();
        let mut entries = Vec::with_capacity(blocks.len());
        for (block, outcome) in blocks.iter().zip(&outcomes) {
            data.insert(block.id.clone(), outcome.as_ref().ok().cloned());
            entries.push(BlockEntry::new(block, outcome));
        }

        tracing::info!(
            instance = %instance.id,
            blocks = entries.len(),
            failed = entries.iter().filter(|e| !e.success).count(),
            "rendered dashboard"
        );

        Ok(DashboardResponse {
            id: instance.id,
            template_name: template.name,
            unit: instance.unit,
            schema: template.schema,
            data,
            blocks: entries,
            filters: FiltersBody {
                available,
                applied: requested,
            },
        })
    }

    /// The unrestricted scope, granted only to catalog admins. Anyone else
    /// gets the same not-found answer as for a missing record.
    async fn unscoped(
        &self,
        principal: Option<&str>,
        kind: &'static str,
        id: &str,
    ) -> EngineResult<TenantScope> {
        let admin = match principal {
            Some(p) => self.catalog.is_admin(p).await,
            None => false,
        };
        if !admin {
            tracing::warn!(kind, id, principal, "unscoped read refused");
            return Err(EngineError::NotFound {
                kind,
                id: id.to_string(),
            });
        }
        Ok(TenantScope::unrestricted())
    }

    /// An active block, with the id of its template.
    async fn active_block(&self, block_id: &str) -> EngineResult<(String, DashboardBlock)> {
        let (template_id, block) = self.catalog.block(block_id).await?;
        if !block.active {
            return Err(EngineError::NotFound {
                kind: "Dashboard block",
                id: block_id.to_string(),
            });
        }
        Ok((template_id, block))
    }

    /// The tenant scope of an instance visible to `principal` that renders
    /// `template_id`.
    async fn instance_scope(
        &self,
        instance_id: &str,
        template_id: &str,
        block_id: &str,
        principal: Option<&str>,
    ) -> EngineResult<TenantScope> {
        let instance = self.visible_instance(instance_id, principal).await?;
        if instance.template != template_id {
            return Err(EngineError::NotFound {
                kind: "Dashboard block",
                id: block_id.to_string(),
            });
        }
        Ok(TenantScope::from_filter(instance.tenant_filter.as_deref()))
    }

    /// Render a single block, for incremental refresh.
    ///
    /// With an instance, the block must belong to its template and the
    /// instance's tenant scope applies. Without one, only an admin principal
    /// may read the block's unscoped rows.
    pub async fn render_block(
        &self,
        block_id: &str,
        instance_id: Option<&str>,
        principal: Option<&str>,
    ) -> EngineResult<ChartPayload> {
        let (template_id, block) = self.active_block(block_id).await?;
        let scope = match instance_id {
            Some(id) => self.instance_scope(id, &template_id, block_id, principal).await?,
            None => self.unscoped(principal, "Dashboard block", block_id).await?,
        };
        let timeout = self.limits().render_timeout();
        tokio::time::timeout(timeout, self.render_one(&block, &scope, &[]))
            .await
            .unwrap_or_else(|_| Err(EngineError::RenderDeadlineExceeded(timeout.as_millis() as u64)))
    }

    /// Compile a block's statement without running it.
    ///
    /// Only statement text comes back, so no principal is needed for the
    /// unscoped form.
    pub async fn compile_block(
        &self,
        block_id: &str,
        instance_id: Option<&str>,
        dialect: Option<Dialect>,
    ) -> EngineResult<CompiledChart> {
        let (template_id, block) = self.active_block(block_id).await?;
        let scope = match instance_id {
            Some(id) => self.instance_scope(id, &template_id, block_id, None).await?,
            None => TenantScope::unrestricted(),
        };
        let (_, compiled) = self.compile_in(&block, &scope, &[], dialect).await?;
        Ok(compiled)
    }

    /// The first rows of a dataset, unaggregated, for authoring blocks.
    ///
    /// With an instance, its tenant scope applies; without one the principal
    /// must be an admin. `limit` is clamped to `max_rows`.
    pub async fn preview_dataset(
        &self,
        dataset_id: &str,
        instance_id: Option<&str>,
        principal: Option<&str>,
        limit: usize,
    ) -> EngineResult<RowSet> {
        let scope = match instance_id {
            Some(id) => {
                let instance = self.visible_instance(id, principal).await?;
                TenantScope::from_filter(instance.tenant_filter.as_deref())
            }
            None => self.unscoped(principal, "Dataset", dataset_id).await?,
        };
        let dataset = self.catalog.dataset(dataset_id).await?;
        let connection = self.catalog.connection(&dataset.connection).await?;
        let limit = limit.min(self.limits().max_rows).max(1);

        let base = BaseRelation::new(&dataset, scope)?;
        let query = compile_preview(&base, limit as u64, connection.dialect());
        let rows = self.executor.execute_capped(&connection, &query, limit).await?;
        tracing::debug!(dataset = dataset_id, rows = rows.row_count(), "previewed dataset");
        Ok(rows)
    }
}

/// Parse `a__op=v` pairs from CLI `--filter` arguments.
pub fn parse_filter_args(args: &[String]) -> Vec<(String, String)> {
    args.iter()
        .filter_map(|arg| arg.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .collect()
}
