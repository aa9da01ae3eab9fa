use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Client;
use taxingest::{
    fetch::{download_to, TAXI_ZONE_LOOKUP_URL},
    logging,
    pg::{LoadOptions, PgConfig, PgLoader},
    process::{ChunkedCsvReader, DEFAULT_BATCH_SIZE},
    schema::{presets, SchemaSource},
};
use tracing::info;

/// Load the taxi zone lookup table into Postgres.
#[derive(Parser, Debug)]
#[command(name = "ingest_taxi_zones", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    pg: PgConfig,

    #[arg(long, default_value = "taxi_zone_lookup")]
    table_name: String,

    #[arg(long, default_value = TAXI_ZONE_LOOKUP_URL)]
    url: String,

    /// Commit every statement on its own instead of one transaction
    #[arg(long)]
    no_transaction: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    info!(url = %cli.url, "downloading zone lookup");
    let scratch = tempfile::tempdir().context("creating scratch dir")?;
    let csv = scratch.path().join("taxi_zone_lookup.csv");
    download_to(&Client::new(), &cli.url, &csv)
        .await
        .with_context(|| format!("downloading {}", cli.url))?;

    let source = SchemaSource::Explicit(presets::taxi_zone_lookup());
    let reader = ChunkedCsvReader::open(&csv, &source, DEFAULT_BATCH_SIZE)?;
    let schema = reader.schema();

    info!("writing data to postgres");
    let loader = PgLoader::connect(&cli.pg).await?;
    let options = LoadOptions {
        transactional: !cli.no_transaction,
        with_index: true,
    };
    let summary = loader
        .load_chunks(&cli.table_name, schema, reader, &options)
        .await
        .with_context(|| format!("loading {}", cli.table_name))?;

    println!(
        "✅ Table `{}` successfully ingested ({} rows)",
        cli.table_name, summary.rows
    );
    Ok(())
}
