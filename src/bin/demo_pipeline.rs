use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::print_batches;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use taxingest::process::write_parquet_atomic;

/// Write a two-row sample frame for one month to `output_data_{MONTH}.parquet`.
#[derive(Parser, Debug)]
#[command(name = "demo_pipeline", version, about, long_about = None)]
struct Cli {
    /// Kept as typed: it names the output file
    #[arg(value_parser = integer_arg)]
    month: String,
    year: i64,
}

fn integer_arg(raw: &str) -> std::result::Result<String, String> {
    raw.trim()
        .parse::<i64>()
        .map(|_| raw.to_string())
        .map_err(|e| format!("`{raw}` is not an integer: {e}"))
}

fn output_path(month_arg: &str) -> PathBuf {
    PathBuf::from(format!("output_data_{month_arg}.parquet"))
}

fn sample_frame(month: i64, year: i64) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("day", DataType::Int64, false),
        Field::new("passenger_number", DataType::Int64, false),
        Field::new("month", DataType::Int64, false),
        Field::new("year", DataType::Int64, false),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(vec![1, 2])),
        Arc::new(Int64Array::from(vec![3, 4])),
        Arc::new(Int64Array::from(vec![month; 2])),
        Arc::new(Int64Array::from(vec![year; 2])),
    ];
    Ok(RecordBatch::try_new(schema, columns)?)
}

fn main() -> Result<()> {
    println!("arguments: {:?}", std::env::args().collect::<Vec<_>>());
    let cli = Cli::parse();

    let month: i64 = cli.month.trim().parse().context("month")?;
    let frame = sample_frame(month, cli.year)?;
    print_batches(&[frame.clone()])?;

    let output = output_path(&cli.month);
    write_parquet_atomic(&output, frame.schema(), [Ok(frame)])
        .with_context(|| format!("writing {}", output.display()))?;

    println!(
        "Processing data for month = {}, year = {}",
        month, cli.year
    );
    Ok(())
}
