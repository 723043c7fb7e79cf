//! Configuration loading for the bootstrap binary.
//!
//! The YAML file named by `TABULA_CONFIG` is loaded when set; otherwise
//! `tabula.yaml` in the working directory is used if it exists, and the
//! built-in defaults if it does not. `DATABASE_URL` and `TABULA_LOG`
//! override the file either way.

use std::path::{Path, PathBuf};

use tabula_store::TabulaConfig;
use tracing_subscriber::EnvFilter;

use crate::error::BootstrapError;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "tabula.yaml";

/// Load configuration as described in the module docs.
pub fn load() -> Result<(TabulaConfig, Option<PathBuf>), BootstrapError> {
    let explicit = std::env::var_os("TABULA_CONFIG").map(PathBuf::from);
    load_from(explicit.as_deref(), Path::new(DEFAULT_CONFIG_PATH))
}

/// Load from `explicit` if given, else `fallback` if it exists, else
/// defaults. Returns the path that was read, if any.
pub fn load_from(
    explicit: Option<&Path>,
    fallback: &Path,
) -> Result<(TabulaConfig, Option<PathBuf>), BootstrapError> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => fallback.exists().then(|| fallback.to_path_buf()),
    };
    let config = match &path {
        Some(path) => TabulaConfig::from_file(path)?,
        None => {
            let mut config = TabulaConfig::default();
            config.apply_env_overrides();
            config
        }
    };
    Ok((config, path))
}

/// Build the log filter from `RUST_LOG` if set, else the configured level.
pub fn env_filter(level: &str) -> Result<EnvFilter, BootstrapError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|e| BootstrapError::LogFilter {
        filter: level.to_owned(),
        reason: e.to_string(),
    })
}
