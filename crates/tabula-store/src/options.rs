//! Find options and result containers.
//!
//! [`FindOptions`] is built by applying [`FindOption`]s in order. A later
//! option replaces an earlier one that sets the same thing; in particular a
//! simple filter and an advanced filter share one slot, so whichever was
//! applied last wins.

use serde::{Deserialize, Serialize};

use crate::filter::{AdvancedFilter, Filter, Predicate};
use crate::record::Record;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl Direction {
    /// SQL keyword.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One `ORDER BY` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    /// Column to sort by.
    pub field: String,
    /// Direction.
    #[serde(default)]
    pub direction: Direction,
}

impl Sort {
    /// Ascending sort on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    /// Descending sort on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

/// `LIMIT` / `OFFSET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum rows to return. Must be positive.
    pub limit: u64,
    /// Rows to skip.
    pub offset: u64,
}

/// A single option applied to [`FindOptions`].
#[derive(Debug, Clone, PartialEq)]
pub enum FindOption {
    /// Set the predicate (simple or advanced).
    Predicate(Predicate),
    /// Restrict projected columns.
    Fields(Vec<String>),
    /// Replace the sort keys.
    Sort(Vec<Sort>),
    /// Set limit and offset.
    Pagination(Pagination),
}

/// Filter by a flat equality map.
pub fn with_filter(filter: Filter) -> FindOption {
    FindOption::Predicate(Predicate::Simple(filter))
}

/// Filter by a condition/group tree.
pub fn with_advanced_filter(filter: impl Into<AdvancedFilter>) -> FindOption {
    FindOption::Predicate(Predicate::Advanced(filter.into()))
}

/// Project only these columns.
pub fn with_fields<I, S>(fields: I) -> FindOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    FindOption::Fields(fields.into_iter().map(Into::into).collect())
}

/// Sort by these keys, applied in the given order.
pub fn with_sort(sort: impl IntoIterator<Item = Sort>) -> FindOption {
    FindOption::Sort(sort.into_iter().collect())
}

/// Return at most `limit` rows after skipping `offset`.
pub const fn with_pagination(limit: u64, offset: u64) -> FindOption {
    FindOption::Pagination(Pagination { limit, offset })
}

/// Accumulated find options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Row predicate; `None` matches every row.
    pub predicate: Option<Predicate>,
    /// Projected columns; empty means all.
    pub fields: Vec<String>,
    /// `ORDER BY` keys, in order.
    pub sort: Vec<Sort>,
    /// `LIMIT` / `OFFSET`, if requested.
    pub pagination: Option<Pagination>,
}

impl FindOptions {
    /// Apply options in order.
    pub fn from_options(options: impl IntoIterator<Item = FindOption>) -> Self {
        let mut result = Self::default();
        for option in options {
            result.apply(option);
        }
        result
    }

    /// Apply a single option, replacing whatever it touches.
    pub fn apply(&mut self, option: FindOption) {
        match option {
            FindOption::Predicate(predicate) => self.predicate = Some(predicate),
            FindOption::Fields(fields) => self.fields = fields,
            FindOption::Sort(sort) => self.sort = sort,
            FindOption::Pagination(pagination) => self.pagination = Some(pagination),
        }
    }
}

/// Page metadata, present only when pagination was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Rows matching the predicate, ignoring pagination.
    pub total: u64,
    /// Requested page size.
    pub limit: u64,
    /// Requested offset.
    pub offset: u64,
    /// `ceil(total / limit)`.
    pub total_pages: u64,
}

impl Metadata {
    /// Compute page metadata for `total` matching rows.
    pub const fn new(total: u64, pagination: Pagination) -> Self {
        let total_pages = if pagination.limit == 0 {
            0
        } else {
            total.div_ceil(pagination.limit)
        };
        Self {
            total,
            limit: pagination.limit,
            offset: pagination.offset,
            total_pages,
        }
    }
}

/// Result of [`Collection::find`](crate::Collection::find).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct List {
    /// Matching rows, in query order.
    pub records: Vec<Record>,
    /// Page metadata when pagination was requested.
    pub meta: Option<Metadata>,
}
