use crate::error::{ConversionError, IngestError, Result};
use crate::process::date_parser::parse_timestamp_micros;
use crate::process::reader::ChunkedCsvReader;
use crate::schema::SchemaSource;
use arrow::array::{Array, ArrayRef, StringArray, TimestampMicrosecondBuilder};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one CSV → Parquet conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConversionSummary {
    pub rows: u64,
    pub batches: usize,
    pub parquet_bytes: u64,
}

/// Convert the Utf8 columns at `date_columns` to microsecond timestamps, giving
/// the batch the final `schema`. `row_offset` is the number of data rows that
/// preceded this batch, used only for error reporting.
pub fn convert_date_columns(
    batch: RecordBatch,
    schema: &SchemaRef,
    date_columns: &[usize],
    row_offset: usize,
) -> Result<RecordBatch> {
    if date_columns.is_empty() {
        return Ok(batch
            .with_schema(schema.clone())
            .map_err(ConversionError::from)?);
    }

    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
    for &idx in date_columns {
        let name = schema.field(idx).name();
        let strings = columns[idx]
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| ConversionError::Timestamp {
                column: name.clone(),
                row: row_offset,
                value: format!("<{} column>", columns[idx].data_type()),
            })?;

        let mut builder = TimestampMicrosecondBuilder::with_capacity(strings.len());
        for (row, value) in strings.iter().enumerate() {
            match value {
                None => builder.append_null(),
                Some(s) if s.trim().is_empty() => builder.append_null(),
                Some(s) => match parse_timestamp_micros(s) {
                    Some(ts) => builder.append_value(ts),
                    None => {
                        return Err(ConversionError::Timestamp {
                            column: name.clone(),
                            row: row_offset + row,
                            value: s.to_string(),
                        }
                        .into())
                    }
                },
            }
        }
        columns[idx] = Arc::new(builder.finish());
    }

    Ok(RecordBatch::try_new(schema.clone(), columns).map_err(ConversionError::from)?)
}

fn writer_props() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build()
}

/// Sibling path the output is written to before it is moved into place.
pub fn tmp_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    output.with_file_name(name)
}

fn write_batches<I>(path: &Path, schema: SchemaRef, batches: I) -> Result<ConversionSummary>
where
    I: IntoIterator<Item = Result<RecordBatch>>,
{
    let parquet_err = |source: ParquetError| ConversionError::Parquet {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(|source| ConversionError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer =
        ArrowWriter::try_new(file, schema, Some(writer_props())).map_err(parquet_err)?;

    let mut summary = ConversionSummary::default();
    for batch in batches {
        let batch = batch?;
        writer.write(&batch).map_err(parquet_err)?;
        summary.rows += batch.num_rows() as u64;
        summary.batches += 1;
        debug!(batch = summary.batches, rows = batch.num_rows(), "wrote batch");
    }
    writer.close().map_err(parquet_err)?;

    summary.parquet_bytes = fs::metadata(path)
        .map_err(|source| ConversionError::Write {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    Ok(summary)
}

/// Write `batches` to `output` through a `.tmp` sibling, so `output` only ever
/// appears complete.
pub fn write_parquet_atomic<I>(output: &Path, schema: SchemaRef, batches: I) -> Result<ConversionSummary>
where
    I: IntoIterator<Item = Result<RecordBatch>>,
{
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|e| IngestError::io(parent, e))?;
    }

    let tmp = tmp_path(output);
    let summary = match write_batches(&tmp, schema, batches) {
        Ok(summary) => summary,
        Err(err) => {
            if let Err(e) = fs::remove_file(&tmp) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(tmp = %tmp.display(), "could not remove temp file: {}", e);
                }
            }
            return Err(err);
        }
    };

    fs::rename(&tmp, output).map_err(|e| IngestError::io(output, e))?;
    Ok(summary)
}

/// Bulk mode: convert the whole CSV at `input` into a Parquet file at `output`,
/// then delete `input`.
///
/// On failure `output` does not exist and `input` is left untouched.
#[tracing::instrument(level = "info", skip_all, fields(input = %input.display()))]
pub fn convert_to_parquet(
    input: &Path,
    output: &Path,
    source: &SchemaSource,
    batch_size: usize,
) -> Result<ConversionSummary> {
    let reader = ChunkedCsvReader::open(input, source, batch_size)?;
    let schema = reader.schema();
    let summary = write_parquet_atomic(output, schema, reader)?;

    fs::remove_file(input).map_err(|e| IngestError::io(input, e))?;
    info!(
        rows = summary.rows,
        bytes = summary.parquet_bytes,
        output = %output.display(),
        "converted"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnTypeMap, ScalarType};
    use arrow::datatypes::{DataType, TimeUnit};
    use arrow::record_batch::RecordBatchReader;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use tempfile::tempdir;

    fn trip_map() -> SchemaSource {
        SchemaSource::Explicit(
            ColumnTypeMap::new()
                .with("VendorID", ScalarType::Int64)
                .with("trip_distance", ScalarType::Float64)
                .with_parse_dates(["pickup"]),
        )
    }

    #[test]
    fn success_writes_output_and_removes_input() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("t.csv");
        let output = dir.path().join("out/t.parquet");
        std::fs::write(
            &input,
            "VendorID,pickup,trip_distance\n1,2021-01-01 00:00:01,1.5\n2,2021-01-01 00:00:02,\n",
        )?;

        let summary = convert_to_parquet(&input, &output, &trip_map(), 1)?;
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.batches, 2);
        assert!(summary.parquet_bytes > 0);
        assert!(!input.exists());
        assert!(!tmp_path(&output).exists());

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&output)?)?.build()?;
        let schema = reader.schema();
        assert_eq!(
            schema.field(1).data_type(),
            &DataType::Timestamp(TimeUnit::Microsecond, None)
        );
        let rows: usize = reader.map(|b| b.map(|b| b.num_rows())).sum::<std::result::Result<usize, _>>()?;
        assert_eq!(rows, 2);
        Ok(())
    }

    #[test]
    fn failure_keeps_input_and_leaves_no_output() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("t.csv");
        let output = dir.path().join("t.parquet");
        std::fs::write(
            &input,
            "VendorID,pickup,trip_distance\n1,2021-01-01 00:00:01,1.5\nx,2021-01-01 00:00:02,2.0\n",
        )?;

        let err = convert_to_parquet(&input, &output, &trip_map(), 1).unwrap_err();
        assert!(matches!(err, IngestError::Conversion(_)), "{err}");
        assert!(input.exists());
        assert!(!output.exists());
        assert!(!tmp_path(&output).exists());
        Ok(())
    }
}
