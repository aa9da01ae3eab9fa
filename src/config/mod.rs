// src/config/mod.rs
use crate::duck::{validate_identifier, DEFAULT_CATALOG_SCHEMA};
use crate::error::{IngestError, Result};
use crate::fetch::{enumerate_units, UnitOfWork, DEFAULT_BASE_URL};
use crate::process::DEFAULT_BATCH_SIZE;
use crate::schema::SchemaSource;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Settings for one catalog pipeline run. Built once, then read-only.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Root of `{type}/…` raw and converted files.
    pub data_dir: PathBuf,
    pub base_url: String,
    pub dataset_types: Vec<String>,
    pub years: Vec<i32>,
    pub months: Vec<u32>,
    /// DuckDB file the catalog tables are rebuilt in.
    pub database: PathBuf,
    pub catalog_schema: String,
    pub schema: SchemaSource,
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            base_url: DEFAULT_BASE_URL.to_string(),
            dataset_types: vec!["fhv".to_string()],
            years: vec![2019],
            months: (1..=12).collect(),
            database: PathBuf::from("taxi_rides_ny.duckdb"),
            catalog_schema: DEFAULT_CATALOG_SCHEMA.to_string(),
            schema: SchemaSource::Inferred,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl PipelineConfig {
    /// Read a YAML file; keys that are left out keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| IngestError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_yaml::from_str(&content).map_err(|e| IngestError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Check everything that can be checked without I/O and return the units
    /// the run will cover.
    pub fn validate(&self) -> Result<Vec<UnitOfWork>> {
        if self.batch_size == 0 {
            return Err(IngestError::parameter("batch_size must be at least 1"));
        }
        validate_identifier(&self.catalog_schema)?;
        let units = enumerate_units(&self.dataset_types, &self.years, &self.months)?;
        if units.is_empty() {
            return Err(IngestError::parameter(
                "nothing to do: dataset_types, years and months must all be non-empty",
            ));
        }
        Ok(units)
    }

    /// `prod.{type}_tripdata`-style table name for a dataset type.
    pub fn table_name(dataset_type: &str) -> String {
        format!("{dataset_type}_tripdata")
    }

    /// Glob matching every converted file of `dataset_type`.
    pub fn converted_glob(&self, dataset_type: &str) -> String {
        self.data_dir
            .join(dataset_type)
            .join("*.parquet")
            .to_string_lossy()
            .into_owned()
    }
}
