//! Shared fixtures for the store integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tabula_store::{
    Backend, CompiledQuery, Dialect, Executor, ManualClock, Record, SequentialIds, SqliteBackend,
    Store, StoreError, TxHandles,
};

/// Schema used by every test.
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS organisations (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    plan        TEXT,
    seq         INTEGER NOT NULL DEFAULT 0,
    seats       INTEGER NOT NULL DEFAULT 1,
    active      BOOLEAN NOT NULL DEFAULT 1,
    settings    TEXT,
    created_at  DATETIME,
    updated_at  DATETIME
);
";

/// Fixed starting instant for the manual clock.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// In-memory `SQLite` store with a manual clock and sequential ids.
pub async fn store() -> (Store, Arc<ManualClock>) {
    let backend = SqliteBackend::in_memory().await.expect("open sqlite");
    build(Arc::new(backend)).await
}

/// Build a deterministic store around any backend and apply the schema.
pub async fn build<B: Backend + 'static>(backend: Arc<B>) -> (Store, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(epoch()));
    let store = Store::with_backend(backend)
        .with_clock(clock.clone())
        .with_id_generator(Arc::new(SequentialIds::new("org_")))
        .build();
    store.exec(SCHEMA).await.expect("apply schema");
    (store, clock)
}

/// An organisation row without id or timestamps.
pub fn org(name: &str, seq: i64) -> Record {
    Record::new()
        .with("name", name)
        .with("seq", seq)
        .with("plan", if seq % 2 == 0 { "pro" } else { "free" })
}

/// A backend that records every statement before delegating to `SQLite`.
pub struct Spy {
    inner: SqliteBackend,
    statements: Mutex<Vec<String>>,
}

impl Spy {
    pub async fn new() -> Arc<Self> {
        let inner = SqliteBackend::in_memory().await.expect("open sqlite");
        Arc::new(Self {
            inner,
            statements: Mutex::new(Vec::new()),
        })
    }

    /// Statements seen so far.
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    /// Forget everything recorded so far.
    pub fn reset(&self) {
        self.statements.lock().clear();
    }

    /// Whether any recorded statement starts with `verb`.
    pub fn saw(&self, verb: &str) -> bool {
        self.statements
            .lock()
            .iter()
            .any(|sql| sql.trim_start().starts_with(verb))
    }
}

#[async_trait]
impl Executor for Spy {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    async fn fetch_all(&self, query: &CompiledQuery) -> Result<Vec<Record>, StoreError> {
        self.statements.lock().push(query.sql.clone());
        self.inner.fetch_all(query).await
    }

    async fn execute(&self, query: &CompiledQuery) -> Result<u64, StoreError> {
        self.statements.lock().push(query.sql.clone());
        self.inner.execute(query).await
    }

    async fn execute_script(&self, sql: &str) -> Result<(), StoreError> {
        self.statements.lock().push(sql.to_owned());
        self.inner.execute_script(sql).await
    }
}

#[async_trait]
impl Backend for Spy {
    async fn begin(&self) -> Result<TxHandles, StoreError> {
        self.inner.begin().await
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

/// A backend whose reads stall for `delay` before reaching `SQLite`.
pub struct Slow {
    inner: SqliteBackend,
    delay: std::time::Duration,
}

impl Slow {
    pub async fn new(delay: std::time::Duration) -> Arc<Self> {
        let inner = SqliteBackend::in_memory().await.expect("open sqlite");
        Arc::new(Self { inner, delay })
    }
}

#[async_trait]
impl Executor for Slow {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    async fn fetch_all(&self, query: &CompiledQuery) -> Result<Vec<Record>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.fetch_all(query).await
    }

    async fn execute(&self, query: &CompiledQuery) -> Result<u64, StoreError> {
        self.inner.execute(query).await
    }

    async fn execute_script(&self, sql: &str) -> Result<(), StoreError> {
        self.inner.execute_script(sql).await
    }
}

#[async_trait]
impl Backend for Slow {
    async fn begin(&self) -> Result<TxHandles, StoreError> {
        self.inner.begin().await
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}
