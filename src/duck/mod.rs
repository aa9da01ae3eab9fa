// src/duck/mod.rs
use crate::error::{Result, SinkWriteError};
use duckdb::{params, Connection};
use std::path::Path;
use tracing::{debug, info};

/// Schema the rebuilt trip tables live in.
pub const DEFAULT_CATALOG_SCHEMA: &str = "prod";

/// Table and schema names are spliced into SQL, so keep them to
/// `[A-Za-z0-9_]` and not starting with a digit.
pub fn validate_identifier(ident: &str) -> Result<&str> {
    let mut chars = ident.chars();
    let ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(ident)
    } else {
        Err(SinkWriteError::Identifier(ident.to_string()).into())
    }
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Embedded analytical catalog backed by a single DuckDB file.
pub struct CatalogLoader {
    conn: Connection,
}

impl CatalogLoader {
    /// Open a DuckDB database on disk at `path`, creating the file if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(SinkWriteError::from)?;
        Ok(Self { conn })
    }

    /// Open a DuckDB in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(SinkWriteError::from)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn ensure_schema(&self, schema: &str) -> Result<()> {
        let schema = validate_identifier(schema)?;
        self.conn
            .execute_batch(&format!("CREATE SCHEMA IF NOT EXISTS {schema};"))
            .map_err(SinkWriteError::from)?;
        Ok(())
    }

    /// Rebuild `schema.table` from every Parquet file matching `pattern`,
    /// unioning columns by name (columns a file lacks become NULL).
    ///
    /// Runs in one transaction: if the rebuild fails the previous table stays.
    /// Returns the new row count.
    #[tracing::instrument(level = "info", skip(self))]
    pub fn replace_table_from_glob(&mut self, schema: &str, table: &str, pattern: &str) -> Result<u64> {
        let schema = validate_identifier(schema)?;
        let table = validate_identifier(table)?;

        let matched = glob::glob(pattern)
            .map_err(|_| SinkWriteError::NoInput(pattern.to_string()))?
            .filter_map(|entry| entry.ok())
            .count();
        if matched == 0 {
            return Err(SinkWriteError::NoInput(pattern.to_string()).into());
        }
        debug!(matched, "parquet files matched");

        let sql = format!(
            "CREATE OR REPLACE TABLE {schema}.{table} AS \
             SELECT * FROM read_parquet({}, union_by_name=true);",
            quote_literal(pattern)
        );

        let tx = self.conn.transaction().map_err(SinkWriteError::from)?;
        tx.execute_batch(&sql).map_err(SinkWriteError::from)?;
        let rows: i64 = tx
            .query_row(&format!("SELECT COUNT(*) FROM {schema}.{table}"), [], |r| r.get(0))
            .map_err(SinkWriteError::from)?;
        tx.commit().map_err(SinkWriteError::from)?;

        info!(rows, files = matched, "table rebuilt");
        Ok(rows as u64)
    }

    pub fn row_count(&self, schema: &str, table: &str) -> Result<u64> {
        let schema = validate_identifier(schema)?;
        let table = validate_identifier(table)?;
        let rows: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {schema}.{table}"), [], |r| r.get(0))
            .map_err(SinkWriteError::from)?;
        Ok(rows as u64)
    }

    /// `(column_name, data_type)` pairs in table order, as DuckDB reports them.
    pub fn column_types(&self, schema: &str, table: &str) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT column_name, data_type FROM information_schema.columns \
                 WHERE table_schema = ? AND table_name = ? ORDER BY ordinal_position",
            )
            .map_err(SinkWriteError::from)?;
        let rows = stmt
            .query_map(params![schema, table], |r| Ok((r.get(0)?, r.get(1)?)))
            .map_err(SinkWriteError::from)?
            .collect::<std::result::Result<Vec<(String, String)>, _>>()
            .map_err(SinkWriteError::from)?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use crate::process::write_parquet_atomic;
    use arrow::array::{ArrayRef, Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn write_parquet(path: &Path, columns: Vec<(&str, ArrayRef)>) -> anyhow::Result<()> {
        let fields: Vec<Field> = columns
            .iter()
            .map(|(name, arr)| Field::new(*name, arr.data_type().clone(), true))
            .collect();
        let schema = Arc::new(Schema::new(fields));
        let batch = RecordBatch::try_new(schema.clone(), columns.into_iter().map(|(_, a)| a).collect())?;
        write_parquet_atomic(path, schema, [Ok(batch)])?;
        Ok(())
    }

    #[test]
    fn union_by_name_fills_missing_columns_with_null() -> anyhow::Result<()> {
        let dir = tempdir()?;
        write_parquet(
            &dir.path().join("a.parquet"),
            vec![
                ("x", Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef),
                ("y", Arc::new(StringArray::from(vec!["a", "b"])) as ArrayRef),
            ],
        )?;
        write_parquet(
            &dir.path().join("b.parquet"),
            vec![
                ("x", Arc::new(Int64Array::from(vec![3])) as ArrayRef),
                ("z", Arc::new(Int64Array::from(vec![30])) as ArrayRef),
            ],
        )?;

        let mut catalog = CatalogLoader::open_in_memory()?;
        catalog.ensure_schema("prod")?;
        let pattern = format!("{}/*.parquet", dir.path().display());
        let rows = catalog.replace_table_from_glob("prod", "t", &pattern)?;
        assert_eq!(rows, 3);

        let mut names: Vec<String> = catalog
            .column_types("prod", "t")?
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["x", "y", "z"]);

        let conn = catalog.connection();
        let null_z: i64 = conn.query_row(
            "SELECT COUNT(*) FROM prod.t WHERE x IN (1, 2) AND z IS NULL AND y IS NOT NULL",
            [],
            |r| r.get(0),
        )?;
        let null_y: i64 = conn.query_row(
            "SELECT COUNT(*) FROM prod.t WHERE x = 3 AND y IS NULL AND z = 30",
            [],
            |r| r.get(0),
        )?;
        assert_eq!(null_z, 2);
        assert_eq!(null_y, 1);
        Ok(())
    }

    #[test]
    fn parquet_reader_works_without_extension_downloads() -> anyhow::Result<()> {
        let dir = tempdir()?;
        write_parquet(
            &dir.path().join("a.parquet"),
            vec![("x", Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef)],
        )?;

        let mut catalog = CatalogLoader::open_in_memory()?;
        catalog.connection().execute_batch(
            "SET autoinstall_known_extensions = false; SET autoload_known_extensions = false;",
        )?;
        catalog.ensure_schema("prod")?;
        let pattern = format!("{}/*.parquet", dir.path().display());
        assert_eq!(catalog.replace_table_from_glob("prod", "t", &pattern)?, 2);
        Ok(())
    }

    #[test]
    fn rebuild_is_idempotent_and_tracks_file_set() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let one = || Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef;
        write_parquet(&dir.path().join("m01.parquet"), vec![("x", one())])?;

        let mut catalog = CatalogLoader::open(dir.path().join("catalog.duckdb"))?;
        catalog.ensure_schema("prod")?;
        let pattern = format!("{}/*.parquet", dir.path().display());
        assert_eq!(catalog.replace_table_from_glob("prod", "t", &pattern)?, 3);
        assert_eq!(catalog.replace_table_from_glob("prod", "t", &pattern)?, 3);

        write_parquet(&dir.path().join("m02.parquet"), vec![("x", one())])?;
        assert_eq!(catalog.replace_table_from_glob("prod", "t", &pattern)?, 6);
        assert_eq!(catalog.row_count("prod", "t")?, 6);
        Ok(())
    }

    #[test]
    fn empty_glob_keeps_previous_table() -> anyhow::Result<()> {
        let dir = tempdir()?;
        write_parquet(
            &dir.path().join("a.parquet"),
            vec![("x", Arc::new(Int64Array::from(vec![1])) as ArrayRef)],
        )?;

        let mut catalog = CatalogLoader::open_in_memory()?;
        catalog.ensure_schema("prod")?;
        let good = format!("{}/*.parquet", dir.path().display());
        catalog.replace_table_from_glob("prod", "t", &good)?;

        let missing = format!("{}/nothing/*.parquet", dir.path().display());
        let err = catalog.replace_table_from_glob("prod", "t", &missing).unwrap_err();
        assert!(
            matches!(err, IngestError::SinkWrite(SinkWriteError::NoInput(_))),
            "{err}"
        );
        assert_eq!(catalog.row_count("prod", "t")?, 1);
        Ok(())
    }

    #[test]
    fn failed_rebuild_rolls_back() -> anyhow::Result<()> {
        let dir = tempdir()?;
        write_parquet(
            &dir.path().join("a.parquet"),
            vec![("x", Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef)],
        )?;
        let mut catalog = CatalogLoader::open_in_memory()?;
        catalog.ensure_schema("prod")?;
        catalog.replace_table_from_glob("prod", "t", &format!("{}/*.parquet", dir.path().display()))?;

        // matches the glob but is not a parquet file
        std::fs::write(dir.path().join("broken.parquet"), b"not parquet")?;
        let err = catalog
            .replace_table_from_glob("prod", "t", &format!("{}/*.parquet", dir.path().display()))
            .unwrap_err();
        assert!(matches!(err, IngestError::SinkWrite(SinkWriteError::Duck(_))), "{err}");
        assert_eq!(catalog.row_count("prod", "t")?, 2);
        Ok(())
    }

    #[test]
    fn identifiers_are_validated() {
        assert!(validate_identifier("fhv_tripdata").is_ok());
        assert!(validate_identifier("_x1").is_ok());
        assert!(validate_identifier("1abc").is_err());
        assert!(validate_identifier("t; DROP TABLE x").is_err());
        assert!(validate_identifier("").is_err());
    }
}
