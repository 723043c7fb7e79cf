//! Schema-less record store over `PostgreSQL` and `SQLite`.
//!
//! Rows are [`Record`]s: maps from field name to dynamically typed
//! [`Value`]. Predicates are either a flat equality [`Filter`] or an
//! [`AdvancedFilter`] tree; the [`QueryCompiler`] turns them into
//! parameterised SQL. Every write raises Before/After [`DatabaseEvent`]s
//! through [`DatabaseHooks`], where handlers can veto or react.
//!
//! # Architecture
//!
//! ```text
//! Store ──────────────┬── collection(name) ──> Collection ──┐
//!   │                 └── tx() ──> Transaction              │
//!   │                               └── collection(name) ───┤
//!   │                                                       v
//!   ├── DatabaseHooks <── raise(Before/After) ──── QueryCompiler
//!   │     └── TableRouter (typed per-table hooks)           │
//!   v                                                       v
//! Backend (PostgresBackend | SqliteBackend) <──── Executor::fetch_all/execute
//! ```
//!
//! # Modules
//!
//! - [`value`] -- [`Value`] cells and driver-ready [`SqlArg`]s
//! - [`record`] -- [`Record`] rows, typed accessors, struct round-trips
//! - [`filter`] -- [`Filter`], [`AdvancedFilter`] and [`Predicate`]
//! - [`options`] -- [`FindOption`]s, pagination, [`List`] results
//! - [`dialect`] -- Placeholder style, `RETURNING`, identifier safety
//! - [`query`] -- The filter-to-SQL [`QueryCompiler`]
//! - [`backend`] -- [`Executor`]/[`Backend`] traits and both drivers
//! - [`events`] -- [`DatabaseHooks`], [`DatabaseEvent`], [`TableRouter`]
//! - [`collection`] -- Table-scoped CRUD with event wrapping
//! - [`transaction`] -- Scoped, rollback-on-drop transactions
//! - [`store`] -- [`Store`] construction and lifecycle
//! - [`clock`] -- Injected [`Clock`] and [`IdGenerator`]
//! - [`config`] -- YAML configuration with environment overrides
//! - [`error`] -- [`StoreError`]

pub mod backend;
pub mod clock;
pub mod collection;
pub mod config;
pub mod dialect;
pub mod error;
pub mod events;
pub mod filter;
pub mod options;
pub mod query;
pub mod record;
pub mod store;
pub mod transaction;
pub mod value;

// Re-export primary types for convenience.
pub use backend::{Backend, Executor, PostgresBackend, SqliteBackend, TransactionControl, TxHandles};
pub use clock::{Clock, IdGenerator, ManualClock, SequentialIds, SystemClock, UuidV7Generator};
pub use collection::{Collection, RecordFields};
pub use config::{ConfigError, DatabaseConfig, HooksConfig, LoggingConfig, RecordsConfig, TabulaConfig};
pub use dialect::{Dialect, Placeholder, validate_identifier};
pub use error::StoreError;
pub use events::{DatabaseEvent, DatabaseHooks, EventKind, TableRouter};
pub use filter::{
    AdvancedFilter, Filter, FilterCondition, FilterExpression, FilterGroup, Logic, Operand,
    Operator, Predicate,
};
pub use options::{
    Direction, FindOption, FindOptions, List, Metadata, Pagination, Sort, with_advanced_filter,
    with_fields, with_filter, with_pagination, with_sort,
};
pub use query::{CompiledQuery, QueryCompiler};
pub use record::{PreparedRecord, Record};
pub use store::{DEFAULT_STATEMENT_TIMEOUT, Store, StoreBuilder};
pub use transaction::Transaction;
pub use value::{SqlArg, Value};
