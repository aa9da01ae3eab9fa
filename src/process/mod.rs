// src/process/mod.rs
pub mod convert;
pub mod date_parser;
pub mod reader;

pub use convert::{convert_to_parquet, write_parquet_atomic, ConversionSummary};
pub use reader::{ChunkedCsvReader, DEFAULT_BATCH_SIZE};
