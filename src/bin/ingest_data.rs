use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Client;
use taxingest::{
    fetch::{download_to, UnitOfWork, DEFAULT_BASE_URL},
    logging,
    pg::{LoadOptions, PgConfig, PgLoader},
    process::{ChunkedCsvReader, DEFAULT_BATCH_SIZE},
    schema::{presets, SchemaSource},
};
use tracing::info;

/// Load one month of yellow taxi trips into Postgres, chunk by chunk.
#[derive(Parser, Debug)]
#[command(name = "ingest_data", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    pg: PgConfig,

    #[arg(long, default_value_t = 2021)]
    year: i32,

    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=12))]
    month: u32,

    #[arg(long, default_value = "yellow_taxi_data")]
    table_name: String,

    /// Rows per chunk read from the CSV and appended to the table
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    chunksize: usize,

    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Commit every statement on its own instead of one transaction
    #[arg(long)]
    no_transaction: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let unit = UnitOfWork::new("yellow", cli.year, cli.month)?;
    let url = unit.url(&cli.base_url)?;

    // the raw file only lives as long as this run
    let scratch = tempfile::tempdir().context("creating scratch dir")?;
    let raw = unit.raw_path(scratch.path());
    download_to(&Client::new(), url.as_str(), &raw)
        .await
        .with_context(|| format!("downloading {url}"))?;

    let source = SchemaSource::Explicit(presets::yellow_tripdata());
    let reader = ChunkedCsvReader::open(&raw, &source, cli.chunksize)?;
    let schema = reader.schema();

    let loader = PgLoader::connect(&cli.pg).await?;
    let options = LoadOptions {
        transactional: !cli.no_transaction,
        with_index: true,
    };
    let summary = loader
        .load_chunks(&cli.table_name, schema, reader, &options)
        .await
        .with_context(|| format!("loading {} into {}", unit, cli.table_name))?;

    info!(
        table = %cli.table_name,
        rows = summary.rows,
        chunks = summary.chunks,
        "finished ingesting data into the postgres database"
    );
    Ok(())
}
