// src/pipeline/mod.rs
use crate::checkpoint::{is_done, partition_units};
use crate::config::PipelineConfig;
use crate::duck::CatalogLoader;
use crate::error::Result;
use crate::fetch::{download_to, UnitOfWork};
use crate::process::{convert_to_parquet, ConversionSummary};
use reqwest::Client;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Converted file already present; nothing fetched.
    Skipped,
    Converted(ConversionSummary),
}

/// Rebuilt catalog table and its row count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLoad {
    pub table: String,
    pub rows: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub skipped: usize,
    pub converted: usize,
    pub tables: Vec<TableLoad>,
}

/// Download, convert and catalog every unit of a [`PipelineConfig`], one at a
/// time.
pub struct Pipeline {
    config: PipelineConfig,
    client: Client,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, client: Client) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Every unit of the run, validated up front.
    pub fn units(&self) -> Result<Vec<UnitOfWork>> {
        self.config.validate()
    }

    /// Fetch and convert one unit unless its converted file already exists.
    ///
    /// The raw download is deleted once converted. If conversion fails it is
    /// kept and the error returned.
    pub async fn process_unit(&self, unit: &UnitOfWork) -> Result<UnitOutcome> {
        let data_dir = &self.config.data_dir;
        let converted = unit.converted_path(data_dir);
        if is_done(&converted) {
            info!(unit = %unit, path = %converted.display(), "already converted, skipping");
            return Ok(UnitOutcome::Skipped);
        }

        let raw = unit.raw_path(data_dir);
        let url = unit.url(&self.config.base_url)?;
        download_to(&self.client, url.as_str(), &raw).await?;

        let source = self.config.schema.clone();
        let batch_size = self.config.batch_size;
        // offload the parse to the blocking pool
        let summary = tokio::task::spawn_blocking(move || {
            convert_to_parquet(&raw, &converted, &source, batch_size)
        })
        .await??;
        Ok(UnitOutcome::Converted(summary))
    }

    /// Rebuild `{catalog_schema}.{type}_tripdata` for every dataset type from
    /// its converted files.
    pub fn load_catalog(config: &PipelineConfig) -> Result<Vec<TableLoad>> {
        let mut catalog = CatalogLoader::open(&config.database)?;
        catalog.ensure_schema(&config.catalog_schema)?;

        let total = config.dataset_types.len();
        let mut tables = Vec::with_capacity(total);
        for (i, dataset_type) in config.dataset_types.iter().enumerate() {
            let table = PipelineConfig::table_name(dataset_type);
            let rows = catalog.replace_table_from_glob(
                &config.catalog_schema,
                &table,
                &config.converted_glob(dataset_type),
            )?;
            info!(
                "[{}/{}] {}.{} loaded ({} rows)",
                i + 1,
                total,
                config.catalog_schema,
                table,
                rows
            );
            tables.push(TableLoad {
                table: format!("{}.{}", config.catalog_schema, table),
                rows,
            });
        }
        Ok(tables)
    }

    /// Run every unit in order, then rebuild the catalog tables.
    ///
    /// The first error aborts the run; units converted before it stay on disk
    /// and are skipped next time.
    pub async fn run(&self) -> Result<RunReport> {
        let start = Instant::now();
        let units = self.units()?;
        let total = units.len();
        let (done, pending) = partition_units(units.iter().cloned(), &self.config.data_dir);
        info!(total, done = done.len(), pending = pending.len(), "starting run");
        let mut report = RunReport::default();

        for (i, unit) in units.iter().enumerate() {
            info!("[{}/{}] {}", i + 1, total, unit);
            match self.process_unit(unit).await {
                Ok(UnitOutcome::Skipped) => report.skipped += 1,
                Ok(UnitOutcome::Converted(summary)) => {
                    report.converted += 1;
                    info!(
                        "[{}/{}] {} converted ({} rows)",
                        i + 1,
                        total,
                        unit,
                        summary.rows
                    );
                }
                Err(err) => {
                    warn!(unit = %unit, "aborting run: {}", err);
                    return Err(err);
                }
            }
        }

        let config = self.config.clone();
        report.tables = tokio::task::spawn_blocking(move || Self::load_catalog(&config)).await??;

        info!(
            skipped = report.skipped,
            converted = report.converted,
            elapsed = ?start.elapsed(),
            "run complete"
        );
        Ok(report)
    }
}
