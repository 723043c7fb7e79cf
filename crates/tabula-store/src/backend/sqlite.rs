//! `SQLite` backend.
//!
//! `SQLite` has no timestamp or JSON storage classes, so both travel as
//! text: timestamps as RFC 3339, JSON documents as their serialized form.
//! On the way back, text in a `DATETIME`/`TIMESTAMP` column becomes a
//! timestamp, text that holds a JSON object or array becomes JSON, and
//! integers in a `BOOLEAN` column become booleans.
//!
//! An in-memory database (`sqlite::memory:`) exists once per connection, so
//! its pool is pinned to a single connection that is never recycled.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Row, Sqlite, TypeInfo, ValueRef};
use tokio::sync::Mutex;

use super::{Backend, Executor, TransactionControl, TxHandles};
use crate::config::DatabaseConfig;
use crate::dialect::Dialect;
use crate::error::StoreError;
use crate::query::CompiledQuery;
use crate::record::Record;
use crate::value::{SqlArg, Value, format_timestamp, parse_timestamp};

/// Connection pool handle to `SQLite`.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
    dialect: Dialect,
}

impl SqliteBackend {
    /// Open (creating if missing) the database named by `config.url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the URL cannot be parsed and
    /// [`StoreError::Database`] if the database cannot be opened.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let connect_options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| StoreError::Config(format!("Invalid database URL: {e}")))?
            .create_if_missing(true);

        let in_memory = config.url.contains(":memory:") || config.url.contains("mode=memory");
        let options = SqlitePoolOptions::new().acquire_timeout(Duration::from_millis(
            config.connect_timeout_ms,
        ));
        let options = if in_memory {
            options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            options
                .max_connections(config.max_connections)
                .idle_timeout(Duration::from_millis(config.idle_timeout_ms))
        };

        let pool = options.connect_with(connect_options).await?;

        tracing::info!(
            in_memory,
            max_connections = pool.options().get_max_connections(),
            "Connected to SQLite"
        );

        Ok(Self::from_pool(pool))
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if `SQLite` cannot be opened.
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect(&DatabaseConfig::default().with_url("sqlite::memory:")).await
    }

    /// Wrap an existing pool.
    pub const fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            dialect: Dialect::SQLITE,
        }
    }

    /// Use a different dialect, e.g. [`Dialect::SQLITE`] with `RETURNING`
    /// switched on.
    #[must_use]
    pub const fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Return a reference to the underlying [`SqlitePool`].
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("dialect", &self.dialect)
            .field("size", &self.pool.size())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Executor for SqliteBackend {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn fetch_all(&self, query: &CompiledQuery) -> Result<Vec<Record>, StoreError> {
        let rows = bind(query).fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, query: &CompiledQuery) -> Result<u64, StoreError> {
        let result = bind(query).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn execute_script(&self, sql: &str) -> Result<(), StoreError> {
        sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn begin(&self) -> Result<TxHandles, StoreError> {
        let tx = self.pool.begin().await?;
        let handle = Arc::new(SqliteTransaction {
            tx: Mutex::new(Some(tx)),
            dialect: self.dialect,
        });
        Ok(TxHandles {
            executor: handle.clone(),
            control: handle,
        })
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("SQLite pool closed");
    }
}

/// An open transaction holding the pool's connection.
struct SqliteTransaction {
    tx: Mutex<Option<sqlx::Transaction<'static, Sqlite>>>,
    dialect: Dialect,
}

#[async_trait]
impl Executor for SqliteTransaction {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn fetch_all(&self, query: &CompiledQuery) -> Result<Vec<Record>, StoreError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or(StoreError::TransactionClosed)?;
        let rows = bind(query).fetch_all(&mut **tx).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, query: &CompiledQuery) -> Result<u64, StoreError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or(StoreError::TransactionClosed)?;
        let result = bind(query).execute(&mut **tx).await?;
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
impl TransactionControl for SqliteTransaction {
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
        if let Ok(mut guard) = self.tx.try_lock() {
            drop(guard.take());
        }
    }
}

fn bind(query: &CompiledQuery) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    let mut q = sqlx::query(&query.sql);
    for arg in &query.args {
        q = match arg {
            SqlArg::Null => q.bind(Option::<String>::None),
            SqlArg::Bool(b) => q.bind(*b),
            SqlArg::Int(i) => q.bind(*i),
            SqlArg::Float(f) => q.bind(*f),
            SqlArg::Text(s) | SqlArg::Json(s) => q.bind(s.as_str()),
            SqlArg::Timestamp(t) => q.bind(format_timestamp(t)),
            SqlArg::Bytes(bytes) => q.bind(bytes.as_slice()),
        };
    }
    q
}

/// Materialize a row by storage class, refined by the declared column type.
fn decode_row(row: &SqliteRow) -> Result<Record, StoreError> {
    let mut record = Record::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let storage = {
            let raw = row.try_get_raw(idx)?;
            if raw.is_null() {
                None
            } else {
                Some(raw.type_info().name().to_owned())
            }
        };
        let declared = column.type_info().name();

        let value = match storage.as_deref() {
            None => Value::Null,
            Some("INTEGER") => {
                let i = row.try_get_unchecked::<i64, _>(idx)?;
                if declared == "BOOLEAN" {
                    Value::Bool(i != 0)
                } else {
                    Value::Int(i)
                }
            }
            Some("REAL") => Value::Float(row.try_get_unchecked::<f64, _>(idx)?),
            Some("BLOB") => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
            Some(_) => decode_text(row.try_get_unchecked::<String, _>(idx)?, declared),
        };
        record.insert(column.name(), value);
    }
    Ok(record)
}

fn decode_text(text: String, declared: &str) -> Value {
    if matches!(declared, "DATETIME" | "DATE") {
        if let Some(t) = parse_timestamp(&text) {
            return Value::Timestamp(t);
        }
    }
    if text.starts_with('{') || text.starts_with('[') {
        if let Ok(json @ (serde_json::Value::Object(_) | serde_json::Value::Array(_))) =
            serde_json::from_str::<serde_json::Value>(&text)
        {
            return Value::Json(json);
        }
    }
    Value::Text(text)
}
