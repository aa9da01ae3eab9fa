// src/error.rs

use arrow::datatypes::DataType;
use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

/// Top-level failure of an ingestion run. Any variant aborts the run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("invalid parameter: {0}")]
    Parameter(String),

    #[error(transparent)]
    SinkWrite(#[from] SinkWriteError),

    #[error("config {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IngestError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        IngestError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn parameter(msg: impl Into<String>) -> Self {
        IngestError::Parameter(msg.into())
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GET {url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("GET {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: ArrowError,
    },

    #[error("column `{column}` row {row}: cannot parse {value:?} as a timestamp")]
    Timestamp {
        column: String,
        row: usize,
        value: String,
    },

    #[error("building record batch: {0}")]
    Arrow(#[from] ArrowError),

    #[error("writing parquet {path}: {source}")]
    Parquet {
        path: PathBuf,
        #[source]
        source: ParquetError,
    },

    #[error("writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum SinkWriteError {
    #[error("duckdb: {0}")]
    Duck(#[from] duckdb::Error),

    #[error("postgres: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("invalid identifier `{0}`")]
    Identifier(String),

    #[error("no converted files match {0}")]
    NoInput(String),

    #[error("column `{column}` has unsupported type {data_type}")]
    UnsupportedType { column: String, data_type: DataType },

    #[error("chunk schema does not match the schema of table `{0}`")]
    SchemaMismatch(String),

    #[error("table `{table}` holds {found} rows after load, expected {expected}")]
    RowCount {
        table: String,
        expected: u64,
        found: i64,
    },
}
