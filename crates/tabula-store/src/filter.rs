//! Composable predicate model.
//!
//! Two shapes are supported:
//!
//! - [`Filter`] -- flat equality map, AND-combined. `null` values match
//!   `IS NULL`.
//! - [`AdvancedFilter`] -- a tree of [`FilterCondition`] leaves and
//!   [`FilterGroup`] nodes joined by AND/OR.
//!
//! Both convert into a [`Predicate`], which is what the compiler consumes.
//! Trees are immutable once built; the constructors return new values.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Flat equality filter. Keys are iterated in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(BTreeMap<String, Value>);

impl Filter {
    /// An empty filter, matching every row.
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Add an equality constraint.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Whether the filter has no constraints.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of constraints.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over constraints in sorted field order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K, V> FromIterator<(K, V)> for Filter
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Comparison operator of a [`FilterCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// `=`
    #[serde(rename = "=")]
    Eq,
    /// `!=`
    #[serde(rename = "!=")]
    Ne,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `>=`
    #[serde(rename = ">=")]
    Gte,
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `<=`
    #[serde(rename = "<=")]
    Lte,
    /// `LIKE`
    #[serde(rename = "LIKE")]
    Like,
    /// `ILIKE` (case-insensitive `LIKE`)
    #[serde(rename = "ILIKE")]
    ILike,
    /// `IN (...)`
    #[serde(rename = "IN")]
    In,
    /// `NOT IN (...)`
    #[serde(rename = "NOT IN")]
    NotIn,
    /// `IS NULL`
    #[serde(rename = "IS NULL")]
    IsNull,
    /// `IS NOT NULL`
    #[serde(rename = "IS NOT NULL")]
    IsNotNull,
}

impl Operator {
    /// SQL spelling of the operator.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Like => "LIKE",
            Self::ILike => "ILIKE",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }

    /// Whether the operator takes a sequence of values.
    pub const fn takes_list(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    /// Whether the operator ignores its value.
    pub const fn is_unary(self) -> bool {
        matches!(self, Self::IsNull | Self::IsNotNull)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// How a [`FilterGroup`] joins its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    /// All children must match.
    And,
    /// Any child may match.
    Or,
}

impl Logic {
    /// SQL keyword.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// Right-hand side of a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    /// A sequence, for `IN` / `NOT IN`.
    List(Vec<Value>),
    /// A single value.
    Single(Value),
    /// No value (`IS NULL` / `IS NOT NULL`).
    None,
}

/// A leaf predicate: `field op value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    field: String,
    op: Operator,
    #[serde(default = "no_operand")]
    value: Operand,
}

const fn no_operand() -> Operand {
    Operand::None
}

impl FilterCondition {
    /// A condition comparing `field` to a single value.
    pub fn new(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: Operand::Single(value.into()),
        }
    }

    /// `field IN (values...)`.
    pub fn is_in<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::list(field, Operator::In, values)
    }

    /// `field NOT IN (values...)`.
    pub fn not_in<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::list(field, Operator::NotIn, values)
    }

    /// `field IS NULL`.
    pub fn is_null(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: Operator::IsNull,
            value: Operand::None,
        }
    }

    /// `field IS NOT NULL`.
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: Operator::IsNotNull,
            value: Operand::None,
        }
    }

    fn list<I, V>(field: impl Into<String>, op: Operator, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            field: field.into(),
            op,
            value: Operand::List(values.into_iter().map(Into::into).collect()),
        }
    }

    /// The field being compared.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// The comparison operator.
    pub const fn op(&self) -> Operator {
        self.op
    }

    /// The right-hand side.
    pub const fn operand(&self) -> &Operand {
        &self.value
    }
}

/// An interior node joining child expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterGroup {
    logic: Logic,
    expressions: Vec<FilterExpression>,
}

impl FilterGroup {
    /// The joining logic.
    pub const fn logic(&self) -> Logic {
        self.logic
    }

    /// Child expressions, in order.
    pub fn expressions(&self) -> &[FilterExpression] {
        &self.expressions
    }
}

/// A node of an [`AdvancedFilter`] tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterExpression {
    /// A leaf.
    Condition(FilterCondition),
    /// A group of children.
    Group(FilterGroup),
}

impl FilterExpression {
    /// A leaf comparing `field` to `value`.
    pub fn condition(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self::Condition(FilterCondition::new(field, op, value))
    }

    /// Children joined with AND.
    pub fn and(expressions: impl IntoIterator<Item = Self>) -> Self {
        Self::group(Logic::And, expressions)
    }

    /// Children joined with OR.
    pub fn or(expressions: impl IntoIterator<Item = Self>) -> Self {
        Self::group(Logic::Or, expressions)
    }

    /// Whether the expression holds for every row by construction.
    ///
    /// An empty `AND` is true, an `AND` of such expressions is true, and an
    /// `OR` with any such child is true. Conditions are never constant.
    pub fn matches_everything(&self) -> bool {
        match self {
            Self::Condition(_) => false,
            Self::Group(group) => match group.logic {
                Logic::And => group.expressions.iter().all(Self::matches_everything),
                Logic::Or => group.expressions.iter().any(Self::matches_everything),
            },
        }
    }

    fn group(logic: Logic, expressions: impl IntoIterator<Item = Self>) -> Self {
        Self::Group(FilterGroup {
            logic,
            expressions: expressions.into_iter().collect(),
        })
    }
}

impl From<FilterCondition> for FilterExpression {
    fn from(condition: FilterCondition) -> Self {
        Self::Condition(condition)
    }
}

/// Root of a condition/group tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvancedFilter {
    /// The tree's root expression.
    pub expression: FilterExpression,
}

impl AdvancedFilter {
    /// Wrap an expression as a filter.
    pub const fn new(expression: FilterExpression) -> Self {
        Self { expression }
    }
}

impl From<FilterExpression> for AdvancedFilter {
    fn from(expression: FilterExpression) -> Self {
        Self { expression }
    }
}

/// Either kind of filter; what the compiler consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Predicate {
    /// A flat equality map.
    Simple(Filter),
    /// A condition/group tree.
    Advanced(AdvancedFilter),
}

impl Predicate {
    /// Whether this is an empty simple filter.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Simple(filter) if filter.is_empty())
    }

    /// Whether the predicate matches every row: an empty simple filter or
    /// a tree that is constant-true.
    pub fn matches_everything(&self) -> bool {
        match self {
            Self::Simple(filter) => filter.is_empty(),
            Self::Advanced(filter) => filter.expression.matches_everything(),
        }
    }
}

impl Default for Predicate {
    fn default() -> Self {
        Self::Simple(Filter::new())
    }
}

impl From<Filter> for Predicate {
    fn from(filter: Filter) -> Self {
        Self::Simple(filter)
    }
}

impl From<AdvancedFilter> for Predicate {
    fn from(filter: AdvancedFilter) -> Self {
        Self::Advanced(filter)
    }
}

impl From<FilterExpression> for Predicate {
    fn from(expression: FilterExpression) -> Self {
        Self::Advanced(AdvancedFilter { expression })
    }
}

impl From<FilterCondition> for Predicate {
    fn from(condition: FilterCondition) -> Self {
        Self::Advanced(AdvancedFilter {
            expression: FilterExpression::Condition(condition),
        })
    }
}
