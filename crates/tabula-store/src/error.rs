//! Error types for the record store.
//!
//! Every [`Collection`](crate::Collection) call returns [`StoreError`].
//! Callers should match on the variant, never on the message text. Driver
//! errors are wrapped exactly once; hook vetoes are carried verbatim.

use std::time::Duration;

use tabula_hooks::HookError;

use crate::record::Record;

/// Errors that can occur in the record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Zero rows matched where exactly one was expected.
    #[error("not found in {table}: {detail}")]
    NotFound {
        /// Table that was queried.
        table: String,
        /// What was looked up.
        detail: String,
    },

    /// Malformed filter, invalid identifier, or unsupported value type.
    #[error("validation error: {0}")]
    Validation(String),

    /// A driver error that is not otherwise classified.
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    /// A record could not be decoded into the requested type.
    #[error("decode error: {0}")]
    Decode(#[source] serde_json::Error),

    /// A value could not be encoded as JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A synchronous Before-hook vetoed the operation. No write was issued.
    #[error(transparent)]
    Rejected(#[from] HookError),

    /// An After-hook failed. The write had already been applied; the
    /// persisted record (when there is a single one) is carried here.
    #[error("after-hook failed on {table} (write already applied): {source}")]
    AfterHook {
        /// Table that was written.
        table: String,
        /// The persisted record, absent for bulk operations.
        committed: Option<Record>,
        /// The hook failure.
        #[source]
        source: Box<StoreError>,
    },

    /// A statement did not complete within the configured timeout.
    #[error("statement timed out after {0:?}")]
    Timeout(Duration),

    /// The transaction was already committed, rolled back, or dropped.
    #[error("transaction is no longer active")]
    TransactionClosed,

    /// A configuration or connection-string error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => Self::not_found("unknown", "driver returned no rows"),
            other => Self::Database(other),
        }
    }
}

impl StoreError {
    /// Build a [`StoreError::NotFound`].
    pub fn not_found(table: &str, detail: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.to_owned(),
            detail: detail.into(),
        }
    }

    /// Whether this is a [`StoreError::NotFound`].
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The hook veto behind this error, if any.
    ///
    /// Looks through [`StoreError::AfterHook`] to the hook that failed.
    pub fn hook_error(&self) -> Option<&HookError> {
        match self {
            Self::Rejected(e) => Some(e),
            Self::AfterHook { source, .. } => source.hook_error(),
            _ => None,
        }
    }

    /// The record that was persisted before an After-hook failed.
    pub const fn committed(&self) -> Option<&Record> {
        match self {
            Self::AfterHook { committed, .. } => committed.as_ref(),
            _ => None,
        }
    }
}
