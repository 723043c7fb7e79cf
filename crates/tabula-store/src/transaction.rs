//! Scoped transactions.
//!
//! A [`Transaction`] owns one connection from the pool. It must be finished
//! with [`commit`](Transaction::commit) or
//! [`rollback`](Transaction::rollback); dropping it unfinished (early
//! return, `?`, panic) rolls back and releases the connection. Collections
//! taken from a finished transaction fail with
//! [`StoreError::TransactionClosed`].
//!
//! There is no way to open a transaction from a transaction.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::TxHandles;
use crate::collection::{Collection, Shared};
use crate::error::StoreError;

/// A unit of work on a single connection.
pub struct Transaction {
    handles: TxHandles,
    shared: Arc<Shared>,
    finished: bool,
}

impl Transaction {
    pub(crate) const fn new(handles: TxHandles, shared: Arc<Shared>) -> Self {
        Self {
            handles,
            shared,
            finished: false,
        }
    }

    /// A collection whose statements run inside this transaction.
    ///
    /// Hooks fire as they do outside a transaction; After events are raised
    /// before the transaction commits.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if `name` is not a valid table
    /// name.
    pub fn collection(&self, name: &str) -> Result<Collection, StoreError> {
        Collection::new(
            name,
            Arc::clone(&self.handles.executor),
            Arc::clone(&self.shared),
        )
    }

    /// Run a multi-statement script inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if any statement fails.
    pub async fn exec(&self, sql: &str) -> Result<(), StoreError> {
        self.handles.executor.execute_script(sql).await
    }

    /// Make every write visible and release the connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the commit fails; the
    /// transaction is rolled back in that case.
    pub async fn commit(mut self) -> Result<(), StoreError> {
        self.finished = true;
        self.handles.control.commit().await?;
        debug!("Transaction committed");
        Ok(())
    }

    /// Discard every write and release the connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the rollback fails.
    pub async fn rollback(mut self) -> Result<(), StoreError> {
        self.finished = true;
        self.handles.control.rollback().await?;
        debug!("Transaction rolled back");
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Transaction dropped without commit, rolling back");
            self.handles.control.abandon();
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
