// src/schema/types.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Semantic scalar type of a source column.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    /// Nullable 64-bit integer.
    #[serde(alias = "int", alias = "Int64")]
    Int64,
    #[serde(alias = "float", alias = "double")]
    Float64,
    #[serde(alias = "string", alias = "str")]
    Text,
    #[serde(alias = "datetime")]
    Timestamp,
}

/// Fixed mapping from source column name to scalar type, plus the columns
/// that are parsed as timestamps regardless of their dtype entry.
///
/// Columns that appear in a file but not in the map are read as text.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct ColumnTypeMap {
    #[serde(default)]
    pub dtypes: BTreeMap<String, ScalarType>,
    #[serde(default)]
    pub parse_dates: Vec<String>,
}

impl ColumnTypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, ty: ScalarType) -> Self {
        self.dtypes.insert(column.into(), ty);
        self
    }

    pub fn with_parse_dates<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parse_dates.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn type_of(&self, column: &str) -> ScalarType {
        if self.parse_dates.iter().any(|c| c == column) {
            return ScalarType::Timestamp;
        }
        self.dtypes.get(column).copied().unwrap_or(ScalarType::Text)
    }
}

/// Where the converter gets its column types from.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchemaSource {
    Explicit(ColumnTypeMap),
    /// Detect types from file content.
    #[default]
    Inferred,
}
