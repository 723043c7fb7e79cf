//! SQL dialect parameters and identifier safety.
//!
//! The query compiler never interpolates values. The only text it splices
//! into SQL is identifiers (tables, columns), and those must first pass
//! [`validate_identifier`].

use std::sync::LazyLock;

use regex::Regex;

use crate::error::StoreError;

/// Longest identifier accepted (the `PostgreSQL` `NAMEDATALEN` limit).
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Allow-list pattern for table and column names.
static IDENTIFIER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok());

/// Check that `name` is safe to splice into SQL as an identifier.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] if the name is empty, too long, or
/// contains anything other than ASCII letters, digits, and underscores
/// (not leading with a digit).
pub fn validate_identifier(name: &str) -> Result<(), StoreError> {
    let matches = IDENTIFIER.as_ref().is_some_and(|re| re.is_match(name));
    if !matches || name.len() > MAX_IDENTIFIER_LEN {
        return Err(StoreError::Validation(format!("invalid identifier: {name:?}")));
    }
    Ok(())
}

/// How positional parameters are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `$1`, `$2`, ... (`PostgreSQL`).
    Dollar,
    /// `?` for every parameter (`SQLite`, `MySQL`).
    Question,
}

/// The dialect-specific parts of compiled SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    /// Human-readable dialect name.
    pub name: &'static str,
    /// Parameter placeholder style.
    pub placeholder: Placeholder,
    /// Whether `INSERT/UPDATE/DELETE ... RETURNING *` is available.
    pub returning: bool,
    /// Whether the `ILIKE` operator exists.
    pub ilike: bool,
}

impl Dialect {
    /// `PostgreSQL`.
    pub const POSTGRES: Self = Self {
        name: "postgres",
        placeholder: Placeholder::Dollar,
        returning: true,
        ilike: true,
    };

    /// `SQLite`.
    ///
    /// `RETURNING` is off: rows it produces carry no declared column types,
    /// so booleans and timestamps would come back as bare integers and
    /// text. Writes are followed by a read of the row instead.
    pub const SQLITE: Self = Self {
        name: "sqlite",
        placeholder: Placeholder::Question,
        returning: false,
        ilike: false,
    };

    /// Same dialect with `RETURNING` support switched on or off.
    #[must_use]
    pub const fn with_returning(mut self, returning: bool) -> Self {
        self.returning = returning;
        self
    }

    /// Placeholder for the 1-based parameter `position`.
    pub fn placeholder(&self, position: usize) -> String {
        match self.placeholder {
            Placeholder::Dollar => format!("${position}"),
            Placeholder::Question => "?".to_owned(),
        }
    }

    /// Quote an identifier that already passed [`validate_identifier`].
    pub fn quote(&self, identifier: &str) -> String {
        format!("\"{identifier}\"")
    }

    /// Validate and quote an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if the identifier is unsafe.
    pub fn ident(&self, identifier: &str) -> Result<String, StoreError> {
        validate_identifier(identifier)?;
        Ok(self.quote(identifier))
    }
}
