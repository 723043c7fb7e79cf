//! Table-scoped CRUD and query operations.
//!
//! A [`Collection`] is bound to one table and one [`Executor`]: the pool
//! when obtained from [`Store::collection`](crate::Store::collection), or a
//! transaction's connection when obtained from
//! [`Transaction::collection`](crate::Transaction::collection). It behaves
//! identically either way.
//!
//! # Mutation protocol
//!
//! 1. The statement is compiled (validation errors surface here).
//! 2. For updates and deletes of a single row, the current row is read.
//! 3. The Before event is raised. A veto returns immediately; no write is
//!    issued.
//! 4. The write runs.
//! 5. The After event is raised. A failure here is reported as
//!    [`StoreError::AfterHook`], carrying the persisted row; the write is
//!    not undone.
//!
//! Both events carry the raising collection as their
//! [`source`](crate::DatabaseEvent::source), so a handler's reads run on
//! the same executor as the write.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::backend::Executor;
use crate::clock::{Clock, IdGenerator};
use crate::config::RecordsConfig;
use crate::error::StoreError;
use crate::events::{DatabaseEvent, DatabaseHooks, EventKind};
use crate::filter::{Filter, Predicate};
use crate::options::{FindOption, FindOptions, List, Metadata, Pagination};
use crate::query::{CompiledQuery, QueryCompiler};
use crate::record::Record;

/// Names of the fields the store fills in on write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFields {
    /// Primary key, generated on create when absent.
    pub id: String,
    /// Set on create when absent.
    pub created_at: Option<String>,
    /// Set on create and on every update.
    pub updated_at: Option<String>,
}

impl Default for RecordFields {
    fn default() -> Self {
        Self::from(&RecordsConfig::default())
    }
}

impl From<&RecordsConfig> for RecordFields {
    fn from(config: &RecordsConfig) -> Self {
        Self {
            id: config.id_field.clone(),
            created_at: config.created_at_field.clone(),
            updated_at: config.updated_at_field.clone(),
        }
    }
}

/// State shared by every collection of a store.
pub(crate) struct Shared {
    pub(crate) hooks: Arc<DatabaseHooks>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) fields: RecordFields,
    pub(crate) statement_timeout: Duration,
}

/// CRUD and queries against one table.
#[derive(Clone)]
pub struct Collection {
    compiler: QueryCompiler,
    executor: Arc<dyn Executor>,
    shared: Arc<Shared>,
}

impl Collection {
    pub(crate) fn new(
        table: &str,
        executor: Arc<dyn Executor>,
        shared: Arc<Shared>,
    ) -> Result<Self, StoreError> {
        let compiler = QueryCompiler::new(executor.dialect(), table)?;
        Ok(Self {
            compiler,
            executor,
            shared,
        })
    }

    /// The table name.
    pub fn name(&self) -> &str {
        self.compiler.table()
    }

    /// The compiler this collection uses.
    pub const fn compiler(&self) -> &QueryCompiler {
        &self.compiler
    }

    // =====================================================================
    // Reads
    // =====================================================================

    /// Fetch the row whose id field equals `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no row has that id.
    pub async fn get_record(&self, id: &str) -> Result<Record, StoreError> {
        let options = FindOptions {
            predicate: Some(self.id_predicate(id)),
            ..FindOptions::default()
        };
        let query = self.compiler.select(&options)?;
        self.fetch(&query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| self.missing_id(id))
    }

    /// Fetch a row by id and decode it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent and [`StoreError::Decode`]
    /// if the row does not fit `T`.
    pub async fn get_as<T: DeserializeOwned>(&self, id: &str) -> Result<T, StoreError> {
        self.get_record(id).await?.decode()
    }

    /// Fetch the first row matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when nothing matches.
    pub async fn find_one(&self, filter: impl Into<Predicate>) -> Result<Record, StoreError> {
        let options = FindOptions {
            predicate: Some(filter.into()),
            pagination: Some(Pagination {
                limit: 1,
                offset: 0,
            }),
            ..FindOptions::default()
        };
        let query = self.compiler.select(&options)?;
        self.fetch(&query).await?.into_iter().next().ok_or_else(|| {
            StoreError::not_found(self.name(), "no record matches the filter")
        })
    }

    /// Fetch rows per `options`, applied in order.
    ///
    /// When pagination is requested the result carries [`Metadata`],
    /// computed by a second `COUNT` over the same predicate.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for invalid options.
    pub async fn find(
        &self,
        options: impl IntoIterator<Item = FindOption>,
    ) -> Result<List, StoreError> {
        self.find_with(&FindOptions::from_options(options)).await
    }

    /// [`find`](Self::find) with prebuilt options.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for invalid options.
    pub async fn find_with(&self, options: &FindOptions) -> Result<List, StoreError> {
        let query = self.compiler.select(options)?;
        let count = match options.pagination {
            Some(page) => Some((self.compiler.count(options.predicate.as_ref())?, page)),
            None => None,
        };

        let records = self.fetch(&query).await?;
        let meta = match count {
            Some((count, page)) => Some(Metadata::new(self.fetch_count(&count).await?, page)),
            None => None,
        };

        Ok(List { records, meta })
    }

    /// Number of rows matching `filter`. An empty filter counts every row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for an invalid filter.
    pub async fn count(&self, filter: impl Into<Predicate>) -> Result<u64, StoreError> {
        let query = self.compiler.count(Some(&filter.into()))?;
        self.fetch_count(&query).await
    }

    /// Whether any row matches `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for an invalid filter.
    pub async fn exists(&self, filter: impl Into<Predicate>) -> Result<bool, StoreError> {
        let query = self.compiler.exists(Some(&filter.into()))?;
        Ok(!self.fetch(&query).await?.is_empty())
    }

    // =====================================================================
    // Writes
    // =====================================================================

    /// Insert a row and return it as stored.
    ///
    /// The id, `created_at` and `updated_at` fields are filled in from the
    /// store's id generator and clock when configured and absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Rejected`] if a Before-create handler vetoes,
    /// [`StoreError::AfterHook`] if an After-create handler fails (the row
    /// was inserted), or a validation/database error.
    pub async fn create_record(&self, mut record: Record) -> Result<Record, StoreError> {
        self.stamp_create(&mut record);
        let query = self.compiler.insert(&record)?;

        self.raise(DatabaseEvent::new(
            EventKind::BeforeCreate,
            self.name(),
            record.clone(),
        ))
        .await?;

        let created = if self.compiler.dialect().returning {
            self.fetch(&query)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| StoreError::not_found(self.name(), "insert returned no row"))?
        } else {
            self.execute(&query).await?;
            let id_field = &self.shared.fields.id;
            match record.has(id_field).then(|| record.string(id_field)) {
                Some(id) => self.get_record(&id).await?,
                None => record,
            }
        };

        self.raise_after(
            DatabaseEvent::new(EventKind::AfterCreate, self.name(), created.clone()),
            Some(&created),
        )
        .await?;

        debug!(table = self.name(), "Record created");
        Ok(created)
    }

    /// Set the fields in `changes` on the row with `id` and return the row
    /// as stored. The id field itself is never changed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the id is absent,
    /// [`StoreError::Rejected`] on a Before-update veto, or
    /// [`StoreError::AfterHook`] if an After-update handler fails.
    pub async fn update_record(&self, id: &str, mut changes: Record) -> Result<Record, StoreError> {
        changes.remove(&self.shared.fields.id);
        self.stamp_update(&mut changes);
        let predicate = self.id_predicate(id);
        let query = self.compiler.update(&changes, &predicate, true)?;

        let old = self.get_record(id).await?;
        let mut candidate = old.clone();
        candidate.merge(&changes);

        self.raise(
            DatabaseEvent::new(EventKind::BeforeUpdate, self.name(), candidate)
                .with_old_record(old.clone()),
        )
        .await?;

        let updated = if self.compiler.dialect().returning {
            self.fetch(&query)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| self.missing_id(id))?
        } else {
            if self.execute(&query).await? == 0 {
                return Err(self.missing_id(id));
            }
            self.get_record(id).await?
        };

        self.raise_after(
            DatabaseEvent::new(EventKind::AfterUpdate, self.name(), updated.clone())
                .with_old_record(old),
            Some(&updated),
        )
        .await?;

        Ok(updated)
    }

    /// Set the fields in `changes` on every row matching `filter` and
    /// return how many rows changed.
    ///
    /// Events carry `changes` as the record and the filter as their scope.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for an empty filter or nothing to
    /// set, [`StoreError::Rejected`] on a veto, or
    /// [`StoreError::AfterHook`] if an After-update handler fails.
    pub async fn update(
        &self,
        mut changes: Record,
        filter: impl Into<Predicate>,
    ) -> Result<u64, StoreError> {
        let predicate = filter.into();
        self.stamp_update(&mut changes);
        let query = self.compiler.update(&changes, &predicate, false)?;

        let event = DatabaseEvent::new(EventKind::BeforeUpdate, self.name(), changes)
            .with_filter(predicate);
        self.raise(event.clone()).await?;

        let rows = self.execute(&query).await?;

        self.raise_after(event.into_kind(EventKind::AfterUpdate), None)
            .await?;
        debug!(table = self.name(), rows, "Bulk update applied");
        Ok(rows)
    }

    /// Delete the row with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the id is absent,
    /// [`StoreError::Rejected`] on a Before-delete veto, or
    /// [`StoreError::AfterHook`] if an After-delete handler fails.
    pub async fn delete_record(&self, id: &str) -> Result<(), StoreError> {
        let query = self.compiler.delete(&self.id_predicate(id))?;
        let old = self.get_record(id).await?;

        let event = DatabaseEvent::new(EventKind::BeforeDelete, self.name(), old.clone());
        self.raise(event.clone()).await?;

        if self.execute(&query).await? == 0 {
            return Err(self.missing_id(id));
        }

        self.raise_after(event.into_kind(EventKind::AfterDelete), Some(&old))
            .await
    }

    /// Delete every row matching `filter` and return how many went. Zero
    /// is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for an empty filter,
    /// [`StoreError::Rejected`] on a veto, or [`StoreError::AfterHook`] if
    /// an After-delete handler fails.
    pub async fn delete_records(&self, filter: impl Into<Predicate>) -> Result<u64, StoreError> {
        let predicate = filter.into();
        let query = self.compiler.delete(&predicate)?;

        let event = DatabaseEvent::new(EventKind::BeforeDelete, self.name(), Record::new())
            .with_filter(predicate);
        self.raise(event.clone()).await?;

        let rows = self.execute(&query).await?;

        self.raise_after(event.into_kind(EventKind::AfterDelete), None)
            .await?;
        debug!(table = self.name(), rows, "Bulk delete applied");
        Ok(rows)
    }

    // =====================================================================
    // Internals
    // =====================================================================

    fn id_predicate(&self, id: &str) -> Predicate {
        Predicate::Simple(Filter::new().eq(self.shared.fields.id.as_str(), id))
    }

    fn missing_id(&self, id: &str) -> StoreError {
        StoreError::not_found(self.name(), format!("{} = {id}", self.shared.fields.id))
    }

    fn stamp_create(&self, record: &mut Record) {
        let fields = &self.shared.fields;
        if !record.has(&fields.id) {
            record.insert(fields.id.as_str(), self.shared.ids.next_id());
        }
        let now = self.shared.clock.now();
        for field in [&fields.created_at, &fields.updated_at].into_iter().flatten() {
            if !record.has(field) {
                record.insert(field.as_str(), now);
            }
        }
    }

    fn stamp_update(&self, changes: &mut Record) {
        if let Some(field) = &self.shared.fields.updated_at {
            changes.insert(field.as_str(), self.shared.clock.now());
        }
    }

    async fn raise(&self, event: DatabaseEvent) -> Result<(), StoreError> {
        self.shared.hooks.raise(event.with_source(self.clone())).await
    }

    async fn raise_after(
        &self,
        event: DatabaseEvent,
        committed: Option<&Record>,
    ) -> Result<(), StoreError> {
        self.shared
            .hooks
            .raise(event.with_source(self.clone()))
            .await
            .map_err(|source| StoreError::AfterHook {
                table: self.name().to_owned(),
                committed: committed.cloned(),
                source: Box::new(source),
            })
    }

    async fn fetch(&self, query: &CompiledQuery) -> Result<Vec<Record>, StoreError> {
        let started = Instant::now();
        let rows = self
            .bounded(self.executor.fetch_all(query))
            .await?;
        debug!(
            table = self.name(),
            sql = %query.sql,
            rows = rows.len(),
            elapsed_ms = elapsed_ms(started),
            "Query executed"
        );
        Ok(rows)
    }

    async fn execute(&self, query: &CompiledQuery) -> Result<u64, StoreError> {
        let started = Instant::now();
        let rows = self.bounded(self.executor.execute(query)).await?;
        debug!(
            table = self.name(),
            sql = %query.sql,
            rows,
            elapsed_ms = elapsed_ms(started),
            "Statement executed"
        );
        Ok(rows)
    }

    async fn fetch_count(&self, query: &CompiledQuery) -> Result<u64, StoreError> {
        let rows = self.fetch(query).await?;
        let count = rows.first().map_or(0, |row| row.int64("count"));
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn bounded<T>(
        &self,
        work: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let limit = self.shared.statement_timeout;
        match tokio::time::timeout(limit, work).await {
            Ok(result) => result,
            Err(_elapsed) => Err(StoreError::Timeout(limit)),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("table", &self.name())
            .field("dialect", &self.compiler.dialect().name)
            .finish_non_exhaustive()
    }
}
