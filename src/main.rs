use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Client;
use std::path::{Path, PathBuf};
use taxingest::{config::PipelineConfig, gitignore, logging, pipeline::Pipeline};
use tracing::info;

/// Download monthly taxi trip files, convert them to Parquet and rebuild the
/// DuckDB catalog tables.
#[derive(Parser, Debug)]
#[command(name = "taxingest", version, about, long_about = None)]
struct Cli {
    /// YAML pipeline config; flags given here override it
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Dataset type, e.g. fhv, green, yellow (repeatable)
    #[arg(long = "taxi-type", value_name = "TYPE")]
    taxi_types: Vec<String>,

    /// Year to ingest (repeatable)
    #[arg(long = "year", value_name = "YEAR")]
    years: Vec<i32>,

    /// Month to ingest (repeatable, default all twelve)
    #[arg(long = "month", value_name = "MONTH", value_parser = clap::value_parser!(u32).range(1..=12))]
    months: Vec<u32>,

    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// DuckDB database file
    #[arg(long, value_name = "FILE")]
    database: Option<PathBuf>,

    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Leave .gitignore untouched
    #[arg(long)]
    skip_gitignore: bool,
}

impl Cli {
    fn into_config(self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_yaml_file(path)?,
            None => PipelineConfig::default(),
        };
        if !self.taxi_types.is_empty() {
            config.dataset_types = self.taxi_types;
        }
        if !self.years.is_empty() {
            config.years = self.years;
        }
        if !self.months.is_empty() {
            config.months = self.months;
        }
        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        if let Some(db) = self.database {
            config.database = db;
        }
        if let Some(url) = self.base_url {
            config.base_url = url;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let skip_gitignore = cli.skip_gitignore;
    let config = cli.into_config()?;

    let units = config.validate()?;
    info!(
        units = units.len(),
        types = ?config.dataset_types,
        database = %config.database.display(),
        "startup"
    );

    if !skip_gitignore {
        let dir = config.data_dir.to_string_lossy().into_owned();
        gitignore::ensure_ignored(Path::new(".gitignore"), &dir)
            .context("updating .gitignore")?;
    }

    let pipeline = Pipeline::new(config, Client::new());
    let report = pipeline.run().await.context("ingestion run failed")?;

    for table in &report.tables {
        info!(table = %table.table, rows = table.rows, "table ready");
    }
    info!(
        skipped = report.skipped,
        converted = report.converted,
        "all done"
    );
    Ok(())
}
