// src/pg/mod.rs
use crate::error::{IngestError, Result, SinkWriteError};
use crate::sink::{load_batches, ChunkSink, LoadSummary};
use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Date32Type, Float64Type, Int64Type, SchemaRef, TimeUnit, TimestampMicrosecondType};
use arrow::record_batch::RecordBatch;
use chrono::DateTime;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::query_builder::Separated;
use sqlx::{Postgres, QueryBuilder, Transaction};
use tracing::{debug, info};
use url::Url;

/// Postgres caps a statement at this many bind parameters.
const MAX_BIND_PARAMS: usize = 65_535;

/// Name of the optional leading row-number column.
pub const INDEX_COLUMN: &str = "index";

/// Connection settings, defaulting to the local docker setup. Doubles as the
/// `--pg-*` flags of the loader binaries.
#[derive(Debug, Clone, PartialEq, Eq, clap::Args)]
pub struct PgConfig {
    #[arg(long = "pg-user", default_value = "root")]
    pub user: String,
    #[arg(long = "pg-password", default_value = "root")]
    pub password: String,
    #[arg(long = "pg-host", default_value = "localhost")]
    pub host: String,
    #[arg(long = "pg-port", default_value_t = 5432)]
    pub port: u16,
    #[arg(long = "pg-database", default_value = "ny_taxi")]
    pub database: String,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            user: "root".into(),
            password: "root".into(),
            host: "localhost".into(),
            port: 5432,
            database: "ny_taxi".into(),
        }
    }
}

impl PgConfig {
    /// `postgres://{user}:{password}@{host}:{port}/{database}`, with the
    /// credentials percent-encoded.
    pub fn connection_string(&self) -> Result<String> {
        let mut url = Url::parse(&format!("postgres://{}:{}/{}", self.host, self.port, self.database))
            .map_err(|e| IngestError::parameter(format!("postgres host `{}`: {e}", self.host)))?;
        url.set_username(&self.user)
            .map_err(|_| IngestError::parameter(format!("postgres user `{}`", self.user)))?;
        url.set_password(Some(&self.password))
            .map_err(|_| IngestError::parameter("postgres password"))?;
        Ok(url.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Run drop, create and every insert in one transaction.
    pub transactional: bool,
    /// Prepend an `"index" BIGINT` column numbering rows from 0.
    pub with_index: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            transactional: true,
            with_index: false,
        }
    }
}

/// `"name"` with embedded quotes doubled.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Column type used for an Arrow type, if the loader can write it.
pub fn pg_type(data_type: &DataType) -> Option<&'static str> {
    match data_type {
        DataType::Int64 => Some("BIGINT"),
        DataType::Float64 => Some("DOUBLE PRECISION"),
        DataType::Utf8 => Some("TEXT"),
        DataType::Timestamp(_, None) => Some("TIMESTAMP"),
        DataType::Boolean => Some("BOOLEAN"),
        DataType::Date32 => Some("DATE"),
        _ => None,
    }
}

pub fn create_table_sql(table: &str, schema: &SchemaRef, with_index: bool) -> Result<String> {
    let mut columns = Vec::with_capacity(schema.fields().len() + 1);
    if with_index {
        columns.push(format!("{} BIGINT", quote_ident(INDEX_COLUMN)));
    }
    for field in schema.fields() {
        let ty = pg_type(field.data_type()).ok_or_else(|| SinkWriteError::UnsupportedType {
            column: field.name().clone(),
            data_type: field.data_type().clone(),
        })?;
        columns.push(format!("{} {ty}", quote_ident(field.name())));
    }
    Ok(format!("CREATE TABLE {} ({})", quote_ident(table), columns.join(", ")))
}

fn insert_prefix(table: &str, schema: &SchemaRef, with_index: bool) -> String {
    let mut names: Vec<String> = Vec::with_capacity(schema.fields().len() + 1);
    if with_index {
        names.push(quote_ident(INDEX_COLUMN));
    }
    names.extend(schema.fields().iter().map(|f| quote_ident(f.name())));
    format!("INSERT INTO {} ({}) ", quote_ident(table), names.join(", "))
}

/// Rows per `INSERT` that keep the statement under the bind limit.
pub fn rows_per_statement(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns.max(1)).max(1)
}

/// A batch column downcast once, so rows can be bound without re-checking types.
enum PgColumn {
    Int64(Int64Array),
    Float64(Float64Array),
    Text(StringArray),
    Timestamp(TimestampMicrosecondArray),
    Boolean(BooleanArray),
    Date(Date32Array),
}

impl PgColumn {
    fn from_array(name: &str, array: &ArrayRef) -> Result<Self> {
        let unsupported = || SinkWriteError::UnsupportedType {
            column: name.to_string(),
            data_type: array.data_type().clone(),
        };
        let column = match array.data_type() {
            DataType::Int64 => PgColumn::Int64(array.as_primitive::<Int64Type>().clone()),
            DataType::Float64 => PgColumn::Float64(array.as_primitive::<Float64Type>().clone()),
            DataType::Utf8 => PgColumn::Text(array.as_string::<i32>().clone()),
            DataType::Boolean => PgColumn::Boolean(array.as_boolean().clone()),
            DataType::Date32 => PgColumn::Date(array.as_primitive::<Date32Type>().clone()),
            DataType::Timestamp(TimeUnit::Microsecond, None) => {
                PgColumn::Timestamp(array.as_primitive::<TimestampMicrosecondType>().clone())
            }
            DataType::Timestamp(_, None) => {
                let micros = cast(array, &DataType::Timestamp(TimeUnit::Microsecond, None))
                    .map_err(|_| unsupported())?;
                PgColumn::Timestamp(micros.as_primitive::<TimestampMicrosecondType>().clone())
            }
            _ => return Err(unsupported().into()),
        };
        Ok(column)
    }

    fn bind(&self, row: &mut Separated<'_, '_, Postgres, &'static str>, i: usize) {
        match self {
            PgColumn::Int64(a) => {
                row.push_bind(a.is_valid(i).then(|| a.value(i)));
            }
            PgColumn::Float64(a) => {
                row.push_bind(a.is_valid(i).then(|| a.value(i)));
            }
            PgColumn::Text(a) => {
                row.push_bind(a.is_valid(i).then(|| a.value(i).to_owned()));
            }
            PgColumn::Timestamp(a) => {
                let ts = a
                    .is_valid(i)
                    .then(|| DateTime::from_timestamp_micros(a.value(i)).map(|d| d.naive_utc()))
                    .flatten();
                row.push_bind(ts);
            }
            PgColumn::Boolean(a) => {
                row.push_bind(a.is_valid(i).then(|| a.value(i)));
            }
            PgColumn::Date(a) => {
                row.push_bind(a.is_valid(i).then(|| a.value_as_date(i)).flatten());
            }
        }
    }
}

enum Session {
    Tx(Transaction<'static, Postgres>),
    Direct(PoolConnection<Postgres>),
}

impl Session {
    fn conn(&mut self) -> &mut PgConnection {
        match self {
            Session::Tx(tx) => &mut **tx,
            Session::Direct(conn) => &mut **conn,
        }
    }

    async fn commit(self) -> Result<()> {
        if let Session::Tx(tx) = self {
            tx.commit().await.map_err(SinkWriteError::from)?;
        }
        Ok(())
    }
}

/// Same column names and types, in the same order.
fn same_columns(table: &SchemaRef, chunk: &SchemaRef) -> bool {
    table.fields().len() == chunk.fields().len()
        && table
            .fields()
            .iter()
            .zip(chunk.fields())
            .all(|(a, b)| a.name() == b.name() && a.data_type() == b.data_type())
}

/// Numbers rows of the `index` column continuously across chunks.
#[derive(Debug, Default)]
struct RowIndex {
    next: i64,
}

impl RowIndex {
    /// First index of a chunk of `rows` rows; advances past the chunk.
    fn claim(&mut self, rows: usize) -> i64 {
        let base = self.next;
        self.next += rows as i64;
        base
    }
}

/// Replace-then-append load of one table.
struct PgTableSink {
    table: String,
    session: Session,
    schema: Option<SchemaRef>,
    index: Option<RowIndex>,
}

impl PgTableSink {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        let done = sqlx::query(sql)
            .execute(self.session.conn())
            .await
            .map_err(SinkWriteError::from)?;
        Ok(done.rows_affected())
    }
}

impl ChunkSink for PgTableSink {
    async fn create_schema(&mut self, schema: &SchemaRef) -> Result<()> {
        let create = create_table_sql(&self.table, schema, self.index.is_some())?;
        self.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(&self.table)))
            .await?;
        debug!(sql = %create, "creating table");
        self.execute(&create).await?;
        self.schema = Some(schema.clone());
        if let Some(index) = self.index.as_mut() {
            *index = RowIndex::default();
        }
        Ok(())
    }

    async fn append(&mut self, batch: &RecordBatch) -> Result<u64> {
        let schema = self
            .schema
            .clone()
            .ok_or_else(|| SinkWriteError::SchemaMismatch(self.table.clone()))?;
        if !same_columns(&schema, &batch.schema()) {
            return Err(SinkWriteError::SchemaMismatch(self.table.clone()).into());
        }

        let columns = schema
            .fields()
            .iter()
            .zip(batch.columns())
            .map(|(field, array)| PgColumn::from_array(field.name(), array))
            .collect::<Result<Vec<_>>>()?;

        let with_index = self.index.is_some();
        let width = columns.len() + usize::from(with_index);
        let step = rows_per_statement(width);
        let prefix = insert_prefix(&self.table, &schema, with_index);
        let index_base = self.index.as_mut().map(|index| index.claim(batch.num_rows()));

        let mut written = 0u64;
        let mut start = 0;
        while start < batch.num_rows() {
            let end = (start + step).min(batch.num_rows());

            let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(prefix.as_str());
            qb.push_values(start..end, |mut row, i| {
                if let Some(base) = index_base {
                    row.push_bind(base + i as i64);
                }
                for column in &columns {
                    column.bind(&mut row, i);
                }
            });
            let done = qb
                .build()
                .execute(self.session.conn())
                .await
                .map_err(SinkWriteError::from)?;
            written += done.rows_affected();
            start = end;
        }
        Ok(written)
    }

    async fn finish(&mut self, rows: u64) -> Result<()> {
        let found: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quote_ident(&self.table)))
            .fetch_one(self.session.conn())
            .await
            .map_err(SinkWriteError::from)?;
        if found != rows as i64 {
            return Err(SinkWriteError::RowCount {
                table: self.table.clone(),
                expected: rows,
                found,
            }
            .into());
        }
        Ok(())
    }
}

/// Relational sink backed by a single pooled Postgres connection.
pub struct PgLoader {
    pool: PgPool,
}

impl PgLoader {
    pub async fn connect(config: &PgConfig) -> Result<Self> {
        info!(host = %config.host, port = config.port, database = %config.database, "connecting to postgres");
        Self::connect_url(&config.connection_string()?).await
    }

    pub async fn connect_url(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(SinkWriteError::from)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Drop and recreate `table` from the first chunk's schema, then append
    /// every chunk in order and check the final row count.
    ///
    /// With `options.transactional` nothing is visible to other sessions until
    /// the count check passes; otherwise a failure leaves the chunks already
    /// appended.
    #[tracing::instrument(level = "info", skip(self, schema, batches))]
    pub async fn load_chunks<I>(
        &self,
        table: &str,
        schema: SchemaRef,
        batches: I,
        options: &LoadOptions,
    ) -> Result<LoadSummary>
    where
        I: IntoIterator<Item = Result<RecordBatch>>,
    {
        let session = if options.transactional {
            Session::Tx(self.pool.begin().await.map_err(SinkWriteError::from)?)
        } else {
            Session::Direct(self.pool.acquire().await.map_err(SinkWriteError::from)?)
        };
        let mut sink = PgTableSink {
            table: table.to_string(),
            session,
            schema: None,
            index: options.with_index.then(RowIndex::default),
        };

        let summary = load_batches(&mut sink, schema, batches).await?;
        sink.session.commit().await?;
        info!(table, rows = summary.rows, chunks = summary.chunks, "load complete");
        Ok(summary)
    }
}
