//! Bootstrap entry point for a Tabula database.
//!
//! Loads configuration, connects to the configured backend, creates the
//! domain tables if they are missing, wires the typed domain hooks and the
//! built-in rules, logs a row count per table, and shuts down cleanly.
//!
//! # Configuration
//!
//! ```text
//! TABULA_CONFIG=path/to/tabula.yaml   optional, else ./tabula.yaml, else defaults
//! DATABASE_URL=postgres://...         overrides database.url
//! TABULA_LOG=debug                    overrides logging.level
//! RUST_LOG=...                        overrides the log filter entirely
//! ```

mod config;
mod error;

use tabula_domain::{
    Account, DomainHooks, Entity, Invoice, Organisation, OrganisationMember, Table, bootstrap,
    rules,
};
use tabula_store::{Filter, LoggingConfig, Store, StoreError};
use tracing::info;

use crate::error::BootstrapError;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, connection, or schema setup fails.
#[tokio::main]
async fn main() -> Result<(), BootstrapError> {
    let (config, path) = config::load()?;
    init_logging(&config.logging)?;

    info!(
        config = ?path,
        max_connections = config.database.max_connections,
        statement_timeout_ms = config.database.statement_timeout_ms,
        "tabula-bootstrap starting"
    );

    let store = Store::connect(&config).await?;
    let result = run(&store).await;
    store.close().await;
    result?;

    info!("tabula-bootstrap finished");
    Ok(())
}

/// Initialize structured logging, as JSON when configured.
fn init_logging(logging: &LoggingConfig) -> Result<(), BootstrapError> {
    let filter = config::env_filter(&logging.level)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn run(store: &Store) -> Result<(), StoreError> {
    bootstrap(store).await?;

    let domain = DomainHooks::attached_to(store.hooks());
    rules::install(&domain);

    report::<Account>(store).await?;
    report::<Organisation>(store).await?;
    report::<OrganisationMember>(store).await?;
    report::<Invoice>(store).await?;
    Ok(())
}

async fn report<T: Entity>(store: &Store) -> Result<(), StoreError> {
    let rows = Table::<T>::new(store)?
        .collection()
        .count(Filter::new())
        .await?;
    info!(table = T::TABLE, rows, "table ready");
    Ok(())
}
