//! Error types for the bootstrap binary.

use tabula_store::{ConfigError, StoreError};

/// Errors that stop the bootstrap run.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// The configuration file could not be read or parsed.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Connecting, applying the schema, or reading counts failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The log filter in the configuration is not a valid directive.
    #[error("invalid log filter {filter:?}: {reason}")]
    LogFilter {
        /// The rejected directive string.
        filter: String,
        /// Parser message.
        reason: String,
    },
}
