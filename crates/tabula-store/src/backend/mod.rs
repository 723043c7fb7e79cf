//! Database backends.
//!
//! The store talks to a database only through these traits:
//!
//! - [`Executor`] runs compiled statements. Both a pool and an open
//!   transaction are executors, so a [`Collection`](crate::Collection) works
//!   the same way against either.
//! - [`Backend`] is a pool: it can start transactions and be closed.
//! - [`TransactionControl`] finishes a transaction started by
//!   [`Backend::begin`].
//!
//! Two implementations ship: [`PostgresBackend`] and [`SqliteBackend`].
//! Tests substitute their own (for example a spy that records every
//! statement).

mod postgres;
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;

use crate::dialect::Dialect;
use crate::error::StoreError;
use crate::query::CompiledQuery;
use crate::record::Record;

pub use postgres::PostgresBackend;
pub use sqlite::SqliteBackend;

/// Runs compiled statements.
#[async_trait]
pub trait Executor: Send + Sync {
    /// SQL dialect this executor speaks.
    fn dialect(&self) -> Dialect;

    /// Run a query and materialize every returned row.
    async fn fetch_all(&self, query: &CompiledQuery) -> Result<Vec<Record>, StoreError>;

    /// Run a statement and return the number of affected rows.
    async fn execute(&self, query: &CompiledQuery) -> Result<u64, StoreError>;

    /// Run a multi-statement script without arguments.
    async fn execute_script(&self, sql: &str) -> Result<(), StoreError>;
}

/// Finishes a transaction.
#[async_trait]
pub trait TransactionControl: Send + Sync {
    /// Commit. Fails with [`StoreError::TransactionClosed`] if already
    /// finished.
    async fn commit(&self) -> Result<(), StoreError>;

    /// Roll back. Fails with [`StoreError::TransactionClosed`] if already
    /// finished.
    async fn rollback(&self) -> Result<(), StoreError>;

    /// Give up on the transaction without waiting. The connection rolls
    /// back when released. Does nothing if already finished.
    fn abandon(&self);
}

/// The two halves of an open transaction.
#[derive(Clone)]
pub struct TxHandles {
    /// Runs statements on the transaction's connection.
    pub executor: Arc<dyn Executor>,
    /// Commits or rolls back.
    pub control: Arc<dyn TransactionControl>,
}

impl std::fmt::Debug for TxHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxHandles")
            .field("dialect", &self.executor.dialect().name)
            .finish_non_exhaustive()
    }
}

/// A connection pool.
#[async_trait]
pub trait Backend: Executor {
    /// Start a transaction on a dedicated connection.
    async fn begin(&self) -> Result<TxHandles, StoreError>;

    /// Close every connection.
    async fn close(&self);
}
