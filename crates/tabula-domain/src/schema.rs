//! Embedded bootstrap schema.

use tabula_store::{Dialect, Store, StoreError};
use tracing::info;

/// Domain tables for `PostgreSQL`.
pub const POSTGRES_SCHEMA: &str = include_str!("../schema/postgres.sql");

/// Domain tables for `SQLite`.
pub const SQLITE_SCHEMA: &str = include_str!("../schema/sqlite.sql");

/// The schema script for `dialect`, if one ships with the crate.
pub fn schema_for(dialect: Dialect) -> Option<&'static str> {
    match dialect.name {
        "postgres" => Some(POSTGRES_SCHEMA),
        "sqlite" => Some(SQLITE_SCHEMA),
        _ => None,
    }
}

/// Create the domain tables if they do not exist.
///
/// # Errors
///
/// Returns [`StoreError::Config`] for a dialect without a bundled schema,
/// or the database error from applying the script.
pub async fn bootstrap(store: &Store) -> Result<(), StoreError> {
    let dialect = store.dialect();
    let script = schema_for(dialect).ok_or_else(|| {
        StoreError::Config(format!("no bundled schema for dialect {}", dialect.name))
    })?;
    store.exec(script).await?;
    info!(dialect = dialect.name, "Domain schema applied");
    Ok(())
}
