// src/schema/arrow.rs

use arrow::datatypes::{DataType, Field as ArrowField, Schema as ArrowSchema, TimeUnit};
use std::sync::Arc;

use super::types::{ColumnTypeMap, ScalarType};

/// Map a scalar column type into an Arrow DataType.
///
/// - Int64     → Int64 (nullable)
/// - Float64   → Float64
/// - Text      → Utf8
/// - Timestamp → Timestamp(µs, no zone)
pub fn map_to_arrow_type(ty: ScalarType) -> DataType {
    match ty {
        ScalarType::Int64 => DataType::Int64,
        ScalarType::Float64 => DataType::Float64,
        ScalarType::Text => DataType::Utf8,
        ScalarType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
    }
}

/// Build the output ArrowSchema for a file with `headers`, typing each column
/// from `map`.
pub fn build_arrow_schema(headers: &[String], map: &ColumnTypeMap) -> Arc<ArrowSchema> {
    let fields: Vec<ArrowField> = headers
        .iter()
        .map(|name| ArrowField::new(name, map_to_arrow_type(map.type_of(name)), true))
        .collect();

    Arc::new(ArrowSchema::new(fields))
}

/// Build the "read" schema handed to the CSV reader: timestamp fields are read
/// as Utf8 and converted afterwards.
pub fn make_read_schema(base: &ArrowSchema) -> Arc<ArrowSchema> {
    let fields: Vec<ArrowField> = base
        .fields()
        .iter()
        .map(|f| {
            let dt = match f.data_type() {
                DataType::Timestamp(_, _) => DataType::Utf8,
                other => other.clone(),
            };
            ArrowField::new(f.name(), dt, f.is_nullable())
        })
        .collect();

    Arc::new(ArrowSchema::new(fields))
}
