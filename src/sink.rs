// src/sink.rs
use crate::error::Result;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use std::time::Instant;
use tracing::{info, warn};

/// Destination of a chunked, replace-then-append load.
#[allow(async_fn_in_trait)]
pub trait ChunkSink {
    /// (Re)create the destination with `schema` and no rows.
    async fn create_schema(&mut self, schema: &SchemaRef) -> Result<()>;

    /// Append every row of `batch`; returns the number of rows written.
    async fn append(&mut self, batch: &RecordBatch) -> Result<u64>;

    /// Called once after the last chunk with the total rows appended.
    async fn finish(&mut self, rows: u64) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadSummary {
    pub chunks: usize,
    pub rows: u64,
}

/// Drive `batches` into `sink` in arrival order.
///
/// The destination schema is created from the first chunk before any row is
/// written, and the first chunk is then appended like every other. An input
/// with no chunks still creates an empty destination from `declared`.
pub async fn load_batches<S, I>(sink: &mut S, declared: SchemaRef, batches: I) -> Result<LoadSummary>
where
    S: ChunkSink,
    I: IntoIterator<Item = Result<RecordBatch>>,
{
    let start = Instant::now();
    let mut summary = LoadSummary::default();

    for batch in batches {
        let batch = batch?;
        if summary.chunks == 0 {
            sink.create_schema(&batch.schema()).await?;
        }
        let written = sink.append(&batch).await?;
        summary.chunks += 1;
        summary.rows += written;
        info!(
            chunk = summary.chunks,
            rows = written,
            total = summary.rows,
            elapsed = ?start.elapsed(),
            "inserted chunk"
        );
    }

    if summary.chunks == 0 {
        warn!("input had no rows; creating empty destination");
        sink.create_schema(&declared).await?;
    }

    sink.finish(summary.rows).await?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ChunkedCsvReader;
    use crate::schema::{ColumnTypeMap, ScalarType, SchemaSource};
    use arrow::compute::concat_batches;
    use arrow::datatypes::DataType;
    use std::fmt::Write as _;
    use tempfile::tempdir;

    /// Keeps everything in memory so loads can be compared.
    #[derive(Default)]
    struct MemorySink {
        schema: Option<SchemaRef>,
        batches: Vec<RecordBatch>,
        events: Vec<String>,
        finished_with: Option<u64>,
    }

    impl ChunkSink for MemorySink {
        async fn create_schema(&mut self, schema: &SchemaRef) -> Result<()> {
            self.events.push("create".into());
            self.schema = Some(schema.clone());
            self.batches.clear();
            Ok(())
        }

        async fn append(&mut self, batch: &RecordBatch) -> Result<u64> {
            self.events.push(format!("append {}", batch.num_rows()));
            self.batches.push(batch.clone());
            Ok(batch.num_rows() as u64)
        }

        async fn finish(&mut self, rows: u64) -> Result<()> {
            self.events.push("finish".into());
            self.finished_with = Some(rows);
            Ok(())
        }
    }

    fn source() -> SchemaSource {
        SchemaSource::Explicit(
            ColumnTypeMap::new()
                .with("VendorID", ScalarType::Int64)
                .with("trip_distance", ScalarType::Float64)
                .with("passenger_count", ScalarType::Int64),
        )
    }

    #[tokio::test]
    async fn schema_is_created_before_first_append() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("t.csv");
        std::fs::write(
            &path,
            "VendorID,trip_distance,passenger_count\n1,1.0,1\n2,2.0,2\n3,3.0,\n",
        )?;

        let reader = ChunkedCsvReader::open(&path, &source(), 2)?;
        let mut sink = MemorySink::default();
        let summary = load_batches(&mut sink, reader.schema(), reader).await?;

        assert_eq!(summary, LoadSummary { chunks: 2, rows: 3 });
        assert_eq!(sink.events, vec!["create", "append 2", "append 1", "finish"]);
        assert_eq!(sink.finished_with, Some(3));
        Ok(())
    }

    #[tokio::test]
    async fn header_only_input_creates_empty_destination() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("t.csv");
        std::fs::write(&path, "VendorID,trip_distance,passenger_count\n")?;

        let reader = ChunkedCsvReader::open(&path, &source(), 10)?;
        let mut sink = MemorySink::default();
        let summary = load_batches(&mut sink, reader.schema(), reader).await?;

        assert_eq!(summary.rows, 0);
        assert_eq!(sink.events, vec!["create", "finish"]);
        let schema = sink.schema.expect("schema created");
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        Ok(())
    }

    #[tokio::test]
    async fn chunk_size_does_not_change_the_loaded_table() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("big.csv");
        let rows = 230_001;
        let mut csv = String::from("VendorID,trip_distance,passenger_count\n");
        for i in 0..rows {
            let passengers = if i % 7 == 0 { String::new() } else { (i % 5).to_string() };
            writeln!(csv, "{},{}.5,{}", i % 3, i % 100, passengers)?;
        }
        std::fs::write(&path, csv)?;

        let chunked = ChunkedCsvReader::open(&path, &source(), 100_000)?;
        let mut a = MemorySink::default();
        let sa = load_batches(&mut a, chunked.schema(), chunked).await?;

        let whole = ChunkedCsvReader::open(&path, &source(), rows)?;
        let mut b = MemorySink::default();
        let sb = load_batches(&mut b, whole.schema(), whole).await?;

        assert_eq!(sa.chunks, 3);
        assert_eq!(sb.chunks, 1);
        assert_eq!(sa.rows, rows as u64);
        assert_eq!(sa.rows, sb.rows);

        let schema_a = a.schema.clone().expect("schema");
        let schema_b = b.schema.clone().expect("schema");
        assert_eq!(schema_a, schema_b);

        let table_a = concat_batches(&schema_a, &a.batches)?;
        let table_b = concat_batches(&schema_b, &b.batches)?;
        assert_eq!(table_a, table_b);
        Ok(())
    }
}
