// src/process/reader.rs
use crate::error::{ConversionError, IngestError, Result};
use crate::process::convert::convert_date_columns;
use crate::schema::{build_arrow_schema, make_read_schema, SchemaSource};
use arrow::csv::reader::{BufReader as CsvBufReader, Format};
use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Rows per record batch when nothing else is asked for.
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

type Input = Box<dyn BufRead + Send>;

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"))
}

/// Open `path` for reading, decompressing on the fly when it ends in `.gz`.
fn open_input(path: &Path) -> Result<Input> {
    let file = File::open(path).map_err(|source| ConversionError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if is_gzip(path) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

fn csv_format() -> Format {
    Format::default().with_header(true)
}

/// Resolve the output schema of `path` under `source`.
fn resolve_schema(path: &Path, source: &SchemaSource) -> Result<SchemaRef> {
    let csv_err = |source: ArrowError| ConversionError::Csv {
        path: path.to_path_buf(),
        source,
    };

    match source {
        SchemaSource::Inferred => {
            // full scan; a sampled guess breaks on late type changes
            let (schema, records) = csv_format()
                .infer_schema(open_input(path)?, None)
                .map_err(csv_err)?;
            debug!(records, fields = schema.fields().len(), "inferred schema");
            Ok(SchemaRef::new(schema))
        }
        SchemaSource::Explicit(map) => {
            // zero records: only the header names are needed
            let (header, _) = csv_format()
                .infer_schema(open_input(path)?, Some(0))
                .map_err(csv_err)?;
            let names: Vec<String> = header.fields().iter().map(|f| f.name().clone()).collect();
            Ok(build_arrow_schema(&names, map))
        }
    }
}

/// Lazy, strictly ordered sequence of record batches read from a CSV file.
///
/// Each batch holds at most `batch_size` rows and already carries the final
/// column types. The sequence can only be restarted by opening the file
/// again.
pub struct ChunkedCsvReader {
    path: PathBuf,
    schema: SchemaRef,
    date_columns: Vec<usize>,
    inner: CsvBufReader<Input>,
    batches_read: usize,
    rows_read: u64,
}

impl ChunkedCsvReader {
    pub fn open(path: impl AsRef<Path>, source: &SchemaSource, batch_size: usize) -> Result<Self> {
        let path = path.as_ref();
        if batch_size == 0 {
            return Err(IngestError::parameter("batch size must be at least 1"));
        }

        let schema = resolve_schema(path, source)?;
        let (read_schema, date_columns) = match source {
            SchemaSource::Inferred => (schema.clone(), Vec::new()),
            SchemaSource::Explicit(_) => {
                let dates = schema
                    .fields()
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| matches!(f.data_type(), DataType::Timestamp(_, _)))
                    .map(|(i, _)| i)
                    .collect();
                (make_read_schema(&schema), dates)
            }
        };

        let inner: CsvBufReader<Input> = ReaderBuilder::new(read_schema)
            .with_format(csv_format())
            .with_batch_size(batch_size)
            .build_buffered(open_input(path)?)
            .map_err(|source| ConversionError::Csv {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            schema,
            date_columns,
            inner,
            batches_read: 0,
            rows_read: 0,
        })
    }

    /// Final (post-conversion) schema of every batch.
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    pub fn batches_read(&self) -> usize {
        self.batches_read
    }

    fn convert(&mut self, raw: RecordBatch) -> Result<RecordBatch> {
        let row_offset = self.rows_read as usize;
        let batch = convert_date_columns(raw, &self.schema, &self.date_columns, row_offset)?;
        self.batches_read += 1;
        self.rows_read += batch.num_rows() as u64;
        Ok(batch)
    }
}

impl Iterator for ChunkedCsvReader {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw = self.inner.next()?;
        Some(
            raw.map_err(|source| {
                ConversionError::Csv {
                    path: self.path.clone(),
                    source,
                }
                .into()
            })
            .and_then(|batch| self.convert(batch)),
        )
    }
}
