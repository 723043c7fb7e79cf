//! The store: backend lifecycle, shared hooks, and collection factory.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tabula_hooks::Dispatcher;
use tracing::info;

use crate::backend::{Backend, Executor, PostgresBackend, SqliteBackend};
use crate::clock::{Clock, IdGenerator, SystemClock, UuidV7Generator};
use crate::collection::{Collection, RecordFields, Shared};
use crate::config::{DatabaseConfig, TabulaConfig};
use crate::dialect::Dialect;
use crate::error::StoreError;
use crate::events::DatabaseHooks;
use crate::transaction::Transaction;

/// Default bound on one statement round-trip.
pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Entry point: owns the connection pool and the lifecycle hooks.
pub struct Store {
    backend: Arc<dyn Backend>,
    executor: Arc<dyn Executor>,
    shared: Arc<Shared>,
}

impl Store {
    /// Connect to the database named by `config.database.url` and apply
    /// the rest of `config`.
    ///
    /// `postgres://` and `postgresql://` select `PostgreSQL`; `sqlite:`
    /// selects `SQLite`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] for an unsupported scheme or
    /// malformed URL and [`StoreError::Database`] if connecting fails.
    pub async fn connect(config: &TabulaConfig) -> Result<Self, StoreError> {
        let builder = connect_backend(&config.database).await?;
        Ok(builder.with_config(config).build())
    }

    /// Start building a store around an existing backend.
    pub fn with_backend<B>(backend: Arc<B>) -> StoreBuilder
    where
        B: Backend + 'static,
    {
        StoreBuilder::new(backend)
    }

    /// A collection bound to `name` on the pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if `name` is not a valid table
    /// name.
    pub fn collection(&self, name: &str) -> Result<Collection, StoreError> {
        Collection::new(name, Arc::clone(&self.executor), Arc::clone(&self.shared))
    }

    /// Begin a transaction on a dedicated connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if no connection can be acquired.
    pub async fn tx(&self) -> Result<Transaction, StoreError> {
        let handles = self.backend.begin().await?;
        Ok(Transaction::new(handles, Arc::clone(&self.shared)))
    }

    /// Run a multi-statement script, typically idempotent schema DDL.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if any statement fails.
    pub async fn exec(&self, sql: &str) -> Result<(), StoreError> {
        self.executor.execute_script(sql).await
    }

    /// The lifecycle hooks shared by every collection.
    pub fn hooks(&self) -> &DatabaseHooks {
        &self.shared.hooks
    }

    /// The dialect of the connected database.
    pub fn dialect(&self) -> Dialect {
        self.executor.dialect()
    }

    /// The clock used for timestamps.
    pub fn clock(&self) -> &dyn Clock {
        self.shared.clock.as_ref()
    }

    /// Names of the automatically stamped fields.
    pub fn record_fields(&self) -> &RecordFields {
        &self.shared.fields
    }

    /// Stop async hook handlers, then close every connection.
    pub async fn close(&self) {
        self.shared.hooks.dispatcher().shutdown().await;
        self.backend.close().await;
        info!("Store closed");
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("dialect", &self.dialect().name)
            .field("fields", &self.shared.fields)
            .field("statement_timeout", &self.shared.statement_timeout)
            .finish_non_exhaustive()
    }
}

async fn connect_backend(config: &DatabaseConfig) -> Result<StoreBuilder, StoreError> {
    let url = config.url.as_str();
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        let backend = PostgresBackend::connect(config).await?;
        Ok(Store::with_backend(Arc::new(backend)))
    } else if url.starts_with("sqlite:") {
        let backend = SqliteBackend::connect(config).await?;
        Ok(Store::with_backend(Arc::new(backend)))
    } else {
        let scheme = url.split(':').next().unwrap_or_default();
        Err(StoreError::Config(format!(
            "unsupported database URL scheme: {scheme:?}"
        )))
    }
}

/// Builder for [`Store`].
pub struct StoreBuilder {
    backend: Arc<dyn Backend>,
    executor: Arc<dyn Executor>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    fields: RecordFields,
    statement_timeout: Duration,
    dispatcher: Option<Dispatcher>,
}

impl StoreBuilder {
    /// Defaults: system clock, UUID v7 ids, `id`/`created_at`/`updated_at`
    /// fields, a 30 s statement timeout, and a fresh dispatcher.
    pub fn new<B>(backend: Arc<B>) -> Self
    where
        B: Backend + 'static,
    {
        let executor: Arc<dyn Executor> = backend.clone();
        let backend: Arc<dyn Backend> = backend;
        Self {
            backend,
            executor,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidV7Generator),
            fields: RecordFields::default(),
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT,
            dispatcher: None,
        }
    }

    /// Apply record fields, statement timeout and hook concurrency from
    /// `config`.
    #[must_use]
    pub fn with_config(self, config: &TabulaConfig) -> Self {
        self.with_record_fields(RecordFields::from(&config.records))
            .with_statement_timeout(config.database.statement_timeout())
            .with_dispatcher(Dispatcher::new(config.hooks.max_async_concurrency))
    }

    /// Use `clock` for `created_at`/`updated_at`.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use `ids` for new primary keys.
    #[must_use]
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Override the stamped field names.
    #[must_use]
    pub fn with_record_fields(mut self, fields: RecordFields) -> Self {
        self.fields = fields;
        self
    }

    /// Bound every statement round-trip.
    #[must_use]
    pub const fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// Run async hook handlers on `dispatcher`.
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Finish building.
    pub fn build(self) -> Store {
        let hooks = DatabaseHooks::new(self.dispatcher.unwrap_or_default());
        info!(
            dialect = self.executor.dialect().name,
            statement_timeout_ms = u64::try_from(self.statement_timeout.as_millis()).unwrap_or(u64::MAX),
            "Store ready"
        );
        Store {
            backend: self.backend,
            executor: self.executor,
            shared: Arc::new(Shared {
                hooks: Arc::new(hooks),
                clock: self.clock,
                ids: self.ids,
                fields: self.fields,
                statement_timeout: self.statement_timeout,
            }),
        }
    }
}

impl fmt::Debug for StoreBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreBuilder")
            .field("fields", &self.fields)
            .field("statement_timeout", &self.statement_timeout)
            .finish_non_exhaustive()
    }
}
