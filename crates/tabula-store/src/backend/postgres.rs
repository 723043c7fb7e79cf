//! `PostgreSQL` backend.
//!
//! Uses [`sqlx`] with runtime query construction (not compile-time checked)
//! so no live database is needed at build time. Every value is bound as a
//! parameter.
//!
//! Values are bound with their natural `PostgreSQL` types (`BOOL`, `INT8`,
//! `FLOAT8`, `TEXT`, `TIMESTAMPTZ`, `JSONB`, `BYTEA`). `NULL` is sent
//! untyped so the server infers the column type.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{
    PgArgumentBuffer, PgArguments, PgConnectOptions, PgPoolOptions, PgRow, PgTypeInfo, Postgres,
};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Row, TypeInfo, ValueRef};
use tokio::sync::Mutex;

use super::{Backend, Executor, TransactionControl, TxHandles};
use crate::config::DatabaseConfig;
use crate::dialect::Dialect;
use crate::error::StoreError;
use crate::query::CompiledQuery;
use crate::record::Record;
use crate::value::{SqlArg, Value};

/// Connection pool handle to `PostgreSQL`.
#[derive(Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    /// Connect using the pool settings in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the URL cannot be parsed and
    /// [`StoreError::Database`] if the connection fails.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let connect_options: PgConnectOptions = config
            .url
            .parse()
            .map_err(|e: sqlx::Error| StoreError::Config(format!("Invalid database URL: {e}")))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_millis(config.connect_timeout_ms))
            .idle_timeout(Duration::from_millis(config.idle_timeout_ms))
            .connect_with(connect_options)
            .await?;

        tracing::info!(
            max_connections = config.max_connections,
            "Connected to PostgreSQL"
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Return a reference to the underlying [`PgPool`].
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl std::fmt::Debug for PostgresBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresBackend")
            .field("size", &self.pool.size())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Executor for PostgresBackend {
    fn dialect(&self) -> Dialect {
        Dialect::POSTGRES
    }

    async fn fetch_all(&self, query: &CompiledQuery) -> Result<Vec<Record>, StoreError> {
        let rows = bind(query)?.fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, query: &CompiledQuery) -> Result<u64, StoreError> {
        let result = bind(query)?.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn execute_script(&self, sql: &str) -> Result<(), StoreError> {
        sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Backend for PostgresBackend {
    async fn begin(&self) -> Result<TxHandles, StoreError> {
        let tx = self.pool.begin().await?;
        let handle = std::sync::Arc::new(PgTransaction {
            tx: Mutex::new(Some(tx)),
        });
        Ok(TxHandles {
            executor: handle.clone(),
            control: handle,
        })
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL pool closed");
    }
}

/// An open transaction holding one pooled connection.
struct PgTransaction {
    tx: Mutex<Option<sqlx::Transaction<'static, Postgres>>>,
}

#[async_trait]
impl Executor for PgTransaction {
    fn dialect(&self) -> Dialect {
        Dialect::POSTGRES
    }

    async fn fetch_all(&self, query: &CompiledQuery) -> Result<Vec<Record>, StoreError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or(StoreError::TransactionClosed)?;
        let rows = bind(query)?.fetch_all(&mut **tx).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, query: &CompiledQuery) -> Result<u64, StoreError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or(StoreError::TransactionClosed)?;
        let result = bind(query)?.execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }

    async fn execute_script(&self, sql: &str) -> Result<(), StoreError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or(StoreError::TransactionClosed)?;
        sqlx::Executor::execute(&mut **tx, sqlx::raw_sql(sql)).await?;
        Ok(())
    }
}

#[async_trait]
impl TransactionControl for PgTransaction {
    async fn commit(&self) -> Result<(), StoreError> {
        let tx = self.tx.lock().await.take().ok_or(StoreError::TransactionClosed)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), StoreError> {
        let tx = self.tx.lock().await.take().ok_or(StoreError::TransactionClosed)?;
        tx.rollback().await?;
        Ok(())
    }

    fn abandon(&self) {
        // Dropping an unfinished sqlx transaction queues its rollback.
        if let Ok(mut guard) = self.tx.try_lock() {
            drop(guard.take());
        }
    }
}

/// A `NULL` with no declared type; the server infers it from context.
struct UntypedNull;

impl sqlx::Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl sqlx::Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

fn bind(query: &CompiledQuery) -> Result<Query<'_, Postgres, PgArguments>, StoreError> {
    let mut q = sqlx::query(&query.sql);
    for arg in &query.args {
        q = match arg {
            SqlArg::Null => q.bind(UntypedNull),
            SqlArg::Bool(b) => q.bind(*b),
            SqlArg::Int(i) => q.bind(*i),
            SqlArg::Float(f) => q.bind(*f),
            SqlArg::Text(s) => q.bind(s.as_str()),
            SqlArg::Timestamp(t) => q.bind(*t),
            SqlArg::Json(json) => q.bind(serde_json::from_str::<serde_json::Value>(json)?),
            SqlArg::Bytes(bytes) => q.bind(bytes.as_slice()),
        };
    }
    Ok(q)
}

/// Materialize a row by column type. Unknown types fall back to text, then
/// raw bytes.
fn decode_row(row: &PgRow) -> Result<Record, StoreError> {
    let mut record = Record::new();
    for column in row.columns() {
        let idx = column.ordinal();
        if row.try_get_raw(idx)?.is_null() {
            record.insert(column.name(), Value::Null);
            continue;
        }

        let value = match column.type_info().name() {
            "BOOL" => Value::Bool(row.try_get(idx)?),
            "INT2" => Value::Int(i64::from(row.try_get::<i16, _>(idx)?)),
            "INT4" => Value::Int(i64::from(row.try_get::<i32, _>(idx)?)),
            "INT8" => Value::Int(row.try_get(idx)?),
            "FLOAT4" => Value::Float(f64::from(row.try_get::<f32, _>(idx)?)),
            "FLOAT8" => Value::Float(row.try_get(idx)?),
            "NUMERIC" => Value::Text(row.try_get::<Decimal, _>(idx)?.to_string()),
            "UUID" => Value::Text(row.try_get::<uuid::Uuid, _>(idx)?.to_string()),
            "TIMESTAMPTZ" => Value::Timestamp(row.try_get::<DateTime<Utc>, _>(idx)?),
            "TIMESTAMP" => Value::Timestamp(row.try_get::<NaiveDateTime, _>(idx)?.and_utc()),
            "DATE" => Value::Text(row.try_get::<NaiveDate, _>(idx)?.to_string()),
            "JSON" | "JSONB" => Value::from(row.try_get::<serde_json::Value, _>(idx)?),
            "BYTEA" => Value::Bytes(row.try_get(idx)?),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => Value::Text(row.try_get(idx)?),
            _ => match row.try_get_unchecked::<String, _>(idx) {
                Ok(text) => Value::Text(text),
                Err(_) => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
            },
        };
        record.insert(column.name(), value);
    }
    Ok(record)
}
