//! Filter-to-SQL compiler.
//!
//! [`QueryCompiler`] turns a [`Predicate`] plus projection, sort and
//! pagination into a [`CompiledQuery`]. Output is deterministic: the same
//! input always yields byte-identical SQL and the same argument order.
//!
//! # Rules
//!
//! - Identifiers are validated and quoted; values only ever travel as
//!   positional arguments.
//! - Simple filters compile to `"f" = $n` (or `"f" IS NULL`) joined with
//!   `AND`, in sorted key order.
//! - Groups are parenthesised and joined by their logic. An empty `AND`
//!   group is `1=1`, an empty `OR` group is `1=0`.
//! - `IN`/`NOT IN` expand to one placeholder per element.
//! - `LIMIT`/`OFFSET` are integers and are written inline.

use crate::dialect::Dialect;
use crate::error::StoreError;
use crate::filter::{Filter, FilterCondition, FilterExpression, Logic, Operand, Operator, Predicate};
use crate::options::FindOptions;
use crate::record::Record;
use crate::value::{SqlArg, Value};

/// SQL text plus its positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// Parameterised SQL.
    pub sql: String,
    /// Arguments, in placeholder order.
    pub args: Vec<SqlArg>,
}

impl CompiledQuery {
    /// A statement without arguments.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }
}

/// Argument buffer that hands out the next placeholder.
struct Params {
    dialect: Dialect,
    args: Vec<SqlArg>,
}

impl Params {
    const fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            args: Vec::new(),
        }
    }

    fn push(&mut self, value: &Value) -> Result<String, StoreError> {
        self.args.push(value.to_sql_arg()?);
        Ok(self.dialect.placeholder(self.args.len()))
    }

    fn finish(self, sql: String) -> CompiledQuery {
        CompiledQuery {
            sql,
            args: self.args,
        }
    }
}

/// Compiles statements against a single table.
#[derive(Debug, Clone)]
pub struct QueryCompiler {
    dialect: Dialect,
    table: String,
    quoted_table: String,
}

impl QueryCompiler {
    /// Bind a compiler to `table`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if the table name is unsafe.
    pub fn new(dialect: Dialect, table: &str) -> Result<Self, StoreError> {
        let quoted_table = dialect.ident(table)?;
        Ok(Self {
            dialect,
            table: table.to_owned(),
            quoted_table,
        })
    }

    /// The dialect in use.
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The unquoted table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// `SELECT` with projection, predicate, sort and pagination.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for unsafe identifiers, invalid
    /// operator/operand pairs, or a zero page size.
    pub fn select(&self, options: &FindOptions) -> Result<CompiledQuery, StoreError> {
        let mut params = Params::new(self.dialect);

        let projection = if options.fields.is_empty() {
            "*".to_owned()
        } else {
            options
                .fields
                .iter()
                .map(|field| self.dialect.ident(field))
                .collect::<Result<Vec<_>, _>>()?
                .join(", ")
        };

        let mut sql = format!("SELECT {projection} FROM {}", self.quoted_table);
        self.push_where(&mut sql, options.predicate.as_ref(), &mut params)?;

        if !options.sort.is_empty() {
            let keys = options
                .sort
                .iter()
                .map(|sort| {
                    self.dialect
                        .ident(&sort.field)
                        .map(|field| format!("{field} {}", sort.direction.as_sql()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }

        if let Some(page) = options.pagination {
            if page.limit == 0 {
                return Err(StoreError::Validation(
                    "pagination limit must be positive".to_owned(),
                ));
            }
            sql.push_str(&format!(" LIMIT {} OFFSET {}", page.limit, page.offset));
        }

        Ok(params.finish(sql))
    }

    /// `SELECT COUNT(*)` over the predicate.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if the predicate is invalid.
    pub fn count(&self, predicate: Option<&Predicate>) -> Result<CompiledQuery, StoreError> {
        let mut params = Params::new(self.dialect);
        let mut sql = format!("SELECT COUNT(*) AS \"count\" FROM {}", self.quoted_table);
        self.push_where(&mut sql, predicate, &mut params)?;
        Ok(params.finish(sql))
    }

    /// `SELECT 1 ... LIMIT 1` over the predicate.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if the predicate is invalid.
    pub fn exists(&self, predicate: Option<&Predicate>) -> Result<CompiledQuery, StoreError> {
        let mut params = Params::new(self.dialect);
        let mut sql = format!("SELECT 1 AS \"one\" FROM {}", self.quoted_table);
        self.push_where(&mut sql, predicate, &mut params)?;
        sql.push_str(" LIMIT 1");
        Ok(params.finish(sql))
    }

    /// `INSERT`, with `RETURNING *` when the dialect supports it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for an unsafe column name and
    /// [`StoreError::Serialization`] for an unmarshalable value.
    pub fn insert(&self, record: &Record) -> Result<CompiledQuery, StoreError> {
        let prepared = record.prepare_for_db(self.dialect)?;

        let mut sql = if prepared.keys.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.quoted_table)
        } else {
            let columns: Vec<String> = prepared
                .keys
                .iter()
                .map(|key| self.dialect.quote(key))
                .collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.quoted_table,
                columns.join(", "),
                prepared.placeholders.join(", ")
            )
        };
        if self.dialect.returning {
            sql.push_str(" RETURNING *");
        }

        Ok(CompiledQuery {
            sql,
            args: prepared.values,
        })
    }

    /// `UPDATE ... SET` the fields of `changes` where `predicate` holds.
    ///
    /// `returning` appends `RETURNING *` when the dialect supports it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] when there is nothing to set, when
    /// the predicate matches every row (an unscoped update), or when any
    /// identifier or condition is invalid.
    pub fn update(
        &self,
        changes: &Record,
        predicate: &Predicate,
        returning: bool,
    ) -> Result<CompiledQuery, StoreError> {
        if changes.is_empty() {
            return Err(StoreError::Validation(format!(
                "update on {} has no fields to set",
                self.table
            )));
        }
        self.guard_scope("UPDATE", predicate)?;

        let mut params = Params::new(self.dialect);
        let mut assignments = Vec::with_capacity(changes.len());
        for (key, value) in changes {
            let column = self.dialect.ident(key)?;
            let placeholder = params.push(value)?;
            assignments.push(format!("{column} = {placeholder}"));
        }

        let mut sql = format!("UPDATE {} SET {}", self.quoted_table, assignments.join(", "));
        self.push_where(&mut sql, Some(predicate), &mut params)?;
        if returning && self.dialect.returning {
            sql.push_str(" RETURNING *");
        }
        Ok(params.finish(sql))
    }

    /// `DELETE` where `predicate` holds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for a predicate that matches every
    /// row (an unscoped delete) or an invalid one.
    pub fn delete(&self, predicate: &Predicate) -> Result<CompiledQuery, StoreError> {
        self.guard_scope("DELETE", predicate)?;
        let mut params = Params::new(self.dialect);
        let mut sql = format!("DELETE FROM {}", self.quoted_table);
        self.push_where(&mut sql, Some(predicate), &mut params)?;
        Ok(params.finish(sql))
    }

    /// Compile just the boolean expression of a predicate.
    ///
    /// An empty simple filter compiles to `1=1`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if the predicate is invalid.
    pub fn predicate(&self, predicate: &Predicate) -> Result<CompiledQuery, StoreError> {
        let mut params = Params::new(self.dialect);
        let sql = self
            .compile_predicate(predicate, &mut params)?
            .unwrap_or_else(|| "1=1".to_owned());
        Ok(params.finish(sql))
    }

    fn guard_scope(&self, statement: &str, predicate: &Predicate) -> Result<(), StoreError> {
        if predicate.matches_everything() {
            return Err(StoreError::Validation(format!(
                "refusing {statement} on {} without a filter that narrows it",
                self.table
            )));
        }
        Ok(())
    }

    fn push_where(
        &self,
        sql: &mut String,
        predicate: Option<&Predicate>,
        params: &mut Params,
    ) -> Result<(), StoreError> {
        let Some(predicate) = predicate else {
            return Ok(());
        };
        if let Some(clause) = self.compile_predicate(predicate, params)? {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }
        Ok(())
    }

    fn compile_predicate(
        &self,
        predicate: &Predicate,
        params: &mut Params,
    ) -> Result<Option<String>, StoreError> {
        match predicate {
            Predicate::Simple(filter) => self.compile_filter(filter, params),
            Predicate::Advanced(advanced) => self
                .compile_expression(&advanced.expression, params)
                .map(Some),
        }
    }

    fn compile_filter(
        &self,
        filter: &Filter,
        params: &mut Params,
    ) -> Result<Option<String>, StoreError> {
        if filter.is_empty() {
            return Ok(None);
        }
        let mut parts = Vec::with_capacity(filter.len());
        for (field, value) in filter.iter() {
            let column = self.dialect.ident(field)?;
            if value.is_null() {
                parts.push(format!("{column} IS NULL"));
            } else {
                let placeholder = params.push(value)?;
                parts.push(format!("{column} = {placeholder}"));
            }
        }
        Ok(Some(parts.join(" AND ")))
    }

    fn compile_expression(
        &self,
        expression: &FilterExpression,
        params: &mut Params,
    ) -> Result<String, StoreError> {
        match expression {
            FilterExpression::Condition(condition) => self.compile_condition(condition, params),
            FilterExpression::Group(group) => {
                if group.expressions().is_empty() {
                    return Ok(match group.logic() {
                        Logic::And => "1=1",
                        Logic::Or => "1=0",
                    }
                    .to_owned());
                }
                let children = group
                    .expressions()
                    .iter()
                    .map(|child| self.compile_expression(child, params))
                    .collect::<Result<Vec<_>, _>>()?;
                let joiner = format!(" {} ", group.logic().as_sql());
                Ok(format!("({})", children.join(&joiner)))
            }
        }
    }

    fn compile_condition(
        &self,
        condition: &FilterCondition,
        params: &mut Params,
    ) -> Result<String, StoreError> {
        let column = self.dialect.ident(condition.field())?;
        let op = condition.op();

        match op {
            Operator::IsNull | Operator::IsNotNull => Ok(format!("{column} {op}")),
            Operator::In | Operator::NotIn => {
                let values = list_operand(condition)?;
                let placeholders = values
                    .iter()
                    .map(|value| params.push(value))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("{column} {op} ({})", placeholders.join(", ")))
            }
            Operator::Like | Operator::ILike => {
                let value = single_operand(condition)?;
                if !matches!(value, Value::Text(_)) {
                    return Err(invalid(condition, "expects a string pattern"));
                }
                let placeholder = params.push(value)?;
                if op == Operator::ILike && !self.dialect.ilike {
                    Ok(format!("LOWER({column}) LIKE LOWER({placeholder})"))
                } else {
                    Ok(format!("{column} {op} {placeholder}"))
                }
            }
            Operator::Eq | Operator::Ne | Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
                let value = single_operand(condition)?;
                match (op, value) {
                    (Operator::Eq, Value::Null) => Ok(format!("{column} IS NULL")),
                    (Operator::Ne, Value::Null) => Ok(format!("{column} IS NOT NULL")),
                    (_, Value::Null) => Err(invalid(condition, "cannot compare with null")),
                    _ => {
                        let placeholder = params.push(value)?;
                        Ok(format!("{column} {op} {placeholder}"))
                    }
                }
            }
        }
    }
}

fn invalid(condition: &FilterCondition, reason: &str) -> StoreError {
    StoreError::Validation(format!(
        "{} on field {:?} {reason}",
        condition.op(),
        condition.field()
    ))
}

fn single_operand(condition: &FilterCondition) -> Result<&Value, StoreError> {
    match condition.operand() {
        Operand::Single(value) => Ok(value),
        Operand::List(_) => Err(invalid(condition, "expects a single value, got a list")),
        Operand::None => Err(invalid(condition, "is missing a value")),
    }
}

fn list_operand(condition: &FilterCondition) -> Result<Vec<Value>, StoreError> {
    let values = match condition.operand() {
        Operand::List(values) => values.clone(),
        Operand::Single(Value::Json(serde_json::Value::Array(items))) => {
            items.iter().cloned().map(Value::from).collect()
        }
        Operand::Single(_) => return Err(invalid(condition, "expects a list, got a scalar")),
        Operand::None => return Err(invalid(condition, "is missing a value")),
    };
    if values.is_empty() {
        return Err(invalid(condition, "expects a non-empty list"));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{
        FindOption, Sort, with_advanced_filter, with_fields, with_filter, with_pagination,
        with_sort,
    };

    fn compiler(dialect: Dialect) -> QueryCompiler {
        QueryCompiler::new(dialect, "users").unwrap_or_else(|e| panic!("{e}"))
    }

    fn select(dialect: Dialect, options: impl IntoIterator<Item = FindOption>) -> CompiledQuery {
        compiler(dialect)
            .select(&FindOptions::from_options(options))
            .unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn simple_filter_is_sorted_and_parameterised() {
        let query = select(
            Dialect::POSTGRES,
            [with_filter(
                Filter::new().eq("status", "active").eq("email", "a@b.c").eq("deleted_at", Value::Null),
            )],
        );
        assert_eq!(
            query.sql,
            r#"SELECT * FROM "users" WHERE "deleted_at" IS NULL AND "email" = $1 AND "status" = $2"#
        );
        assert_eq!(
            query.args,
            [SqlArg::Text("a@b.c".to_owned()), SqlArg::Text("active".to_owned())]
        );
    }

    #[test]
    fn compilation_is_deterministic() {
        let build = || {
            select(
                Dialect::POSTGRES,
                [
                    with_filter(Filter::new().eq("b", 2).eq("a", 1).eq("c", "x")),
                    with_sort([Sort::desc("created_at")]),
                    with_pagination(10, 0),
                ],
            )
        };
        let first = build();
        for _ in 0..10 {
            assert_eq!(build(), first);
        }
    }

    #[test]
    fn advanced_filter_nests_groups() {
        let expr = FilterExpression::or([
            FilterExpression::condition("plan", Operator::Eq, "pro"),
            FilterExpression::and([
                FilterExpression::condition("seats", Operator::Gte, 5),
                FilterCondition::is_in("status", ["trial", "active"]).into(),
                FilterCondition::is_not_null("verified_at").into(),
            ]),
        ]);
        let query = select(Dialect::POSTGRES, [with_advanced_filter(expr)]);
        assert_eq!(
            query.sql,
            r#"SELECT * FROM "users" WHERE ("plan" = $1 OR ("seats" >= $2 AND "status" IN ($3, $4) AND "verified_at" IS NOT NULL))"#
        );
        assert_eq!(query.args.len(), 4);
        assert_eq!(query.args.get(1), Some(&SqlArg::Int(5)));
    }

    #[test]
    fn sqlite_uses_question_marks_and_lowercases_ilike() {
        let expr = FilterExpression::and([
            FilterExpression::condition("name", Operator::ILike, "%acme%"),
            FilterCondition::not_in("id", ["a", "b"]).into(),
        ]);
        let query = select(Dialect::SQLITE, [with_advanced_filter(expr)]);
        assert_eq!(
            query.sql,
            r#"SELECT * FROM "users" WHERE (LOWER("name") LIKE LOWER(?) AND "id" NOT IN (?, ?))"#
        );

        let expr = FilterExpression::condition("name", Operator::ILike, "%acme%");
        let query = select(Dialect::POSTGRES, [with_advanced_filter(expr)]);
        assert_eq!(query.sql, r#"SELECT * FROM "users" WHERE "name" ILIKE $1"#);
    }

    #[test]
    fn empty_groups_are_neutral() {
        let query = select(Dialect::SQLITE, [with_advanced_filter(FilterExpression::and([]))]);
        assert_eq!(query.sql, r#"SELECT * FROM "users" WHERE 1=1"#);
        let query = select(Dialect::SQLITE, [with_advanced_filter(FilterExpression::or([]))]);
        assert_eq!(query.sql, r#"SELECT * FROM "users" WHERE 1=0"#);
    }

    #[test]
    fn projection_sort_and_pagination() {
        let query = select(
            Dialect::POSTGRES,
            [
                with_fields(["id", "email"]),
                with_sort([Sort::desc("created_at"), Sort::asc("id")]),
                with_pagination(10, 20),
            ],
        );
        assert_eq!(
            query.sql,
            r#"SELECT "id", "email" FROM "users" ORDER BY "created_at" DESC, "id" ASC LIMIT 10 OFFSET 20"#
        );
        assert!(query.args.is_empty());
    }

    #[test]
    fn zero_limit_is_rejected() {
        let result = compiler(Dialect::POSTGRES)
            .select(&FindOptions::from_options([with_pagination(0, 0)]));
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[test]
    fn invalid_operands_are_rejected() {
        let cases = [
            FilterCondition::new("status", Operator::In, "active"),
            FilterCondition::is_in("status", Vec::<String>::new()),
            FilterCondition::new("name", Operator::Like, 5),
            FilterCondition::new("seats", Operator::Gt, Value::Null),
        ];
        let compiler = compiler(Dialect::POSTGRES);
        for condition in cases {
            let label = format!("{} {}", condition.field(), condition.op());
            let options =
                FindOptions::from_options([with_advanced_filter(FilterExpression::from(condition))]);
            assert!(
                matches!(compiler.select(&options), Err(StoreError::Validation(_))),
                "{label}"
            );
        }
    }

    #[test]
    fn json_arrays_expand_for_in() {
        let condition = FilterCondition::new("status", Operator::In, serde_json::json!(["a", "b", "c"]));
        let query = select(Dialect::POSTGRES, [with_advanced_filter(FilterExpression::from(condition))]);
        assert_eq!(query.sql, r#"SELECT * FROM "users" WHERE "status" IN ($1, $2, $3)"#);
    }

    #[test]
    fn eq_and_ne_with_null_become_is_checks() {
        let expr = FilterExpression::and([
            FilterExpression::condition("a", Operator::Eq, Value::Null),
            FilterExpression::condition("b", Operator::Ne, Value::Null),
        ]);
        let query = select(Dialect::POSTGRES, [with_advanced_filter(expr)]);
        assert_eq!(
            query.sql,
            r#"SELECT * FROM "users" WHERE ("a" IS NULL AND "b" IS NOT NULL)"#
        );
        assert!(query.args.is_empty());
    }

    #[test]
    fn unsafe_identifiers_never_reach_sql() {
        assert!(QueryCompiler::new(Dialect::POSTGRES, "users; DROP TABLE users").is_err());

        let compiler = compiler(Dialect::POSTGRES);
        let bad_field = FindOptions::from_options([with_filter(Filter::new().eq("a\" OR 1=1 --", 1))]);
        assert!(matches!(compiler.select(&bad_field), Err(StoreError::Validation(_))));
        let bad_sort = FindOptions::from_options([with_sort([Sort::asc("id; --")])]);
        assert!(matches!(compiler.select(&bad_sort), Err(StoreError::Validation(_))));
        let bad_projection = FindOptions::from_options([with_fields(["*"])]);
        assert!(matches!(compiler.select(&bad_projection), Err(StoreError::Validation(_))));
    }

    #[test]
    fn values_are_never_interpolated() {
        let hostile = "'; DROP TABLE users; --";
        let query = select(Dialect::POSTGRES, [with_filter(Filter::new().eq("name", hostile))]);
        assert!(!query.sql.contains(hostile));
        assert_eq!(query.args, [SqlArg::Text(hostile.to_owned())]);
    }

    #[test]
    fn insert_returns_row_when_supported() {
        let record = Record::new().with("name", "acme").with("id", "u1");
        let query = compiler(Dialect::POSTGRES).insert(&record).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(
            query.sql,
            r#"INSERT INTO "users" ("id", "name") VALUES ($1, $2) RETURNING *"#
        );

        let query = compiler(Dialect::SQLITE).insert(&record).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(query.sql, r#"INSERT INTO "users" ("id", "name") VALUES (?, ?)"#);

        let query = compiler(Dialect::POSTGRES).insert(&Record::new()).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(query.sql, r#"INSERT INTO "users" DEFAULT VALUES RETURNING *"#);
    }

    #[test]
    fn update_numbers_set_then_where() {
        let changes = Record::new().with("name", "new").with("seats", 3);
        let predicate = Predicate::from(Filter::new().eq("id", "u1"));
        let query = compiler(Dialect::POSTGRES)
            .update(&changes, &predicate, true)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(
            query.sql,
            r#"UPDATE "users" SET "name" = $1, "seats" = $2 WHERE "id" = $3 RETURNING *"#
        );
        assert_eq!(query.args.get(2), Some(&SqlArg::Text("u1".to_owned())));
    }

    #[test]
    fn unscoped_bulk_writes_are_refused() {
        let compiler = compiler(Dialect::POSTGRES);
        let everything = Predicate::default();
        assert!(matches!(compiler.delete(&everything), Err(StoreError::Validation(_))));
        assert!(matches!(
            compiler.update(&Record::new().with("a", 1), &everything, false),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn constant_true_trees_count_as_unscoped() {
        let compiler = compiler(Dialect::SQLITE);
        let set = Record::new().with("a", 1);
        let scoped = FilterExpression::condition("id", Operator::Eq, "u1");

        for everything in [
            FilterExpression::and([]),
            FilterExpression::and([FilterExpression::and([]), FilterExpression::and([])]),
            FilterExpression::or([scoped.clone(), FilterExpression::and([])]),
        ] {
            let predicate = Predicate::from(everything);
            assert!(matches!(compiler.delete(&predicate), Err(StoreError::Validation(_))));
            assert!(matches!(
                compiler.update(&set, &predicate, false),
                Err(StoreError::Validation(_))
            ));
        }

        let narrowed = Predicate::from(FilterExpression::and([FilterExpression::and([]), scoped]));
        assert!(compiler.delete(&narrowed).is_ok());
        assert!(compiler.delete(&Predicate::from(FilterExpression::or([]))).is_ok());
    }

    #[test]
    fn count_and_exists_share_the_predicate() {
        let predicate = Predicate::from(Filter::new().eq("status", "active"));
        let compiler = compiler(Dialect::SQLITE);
        let count = compiler.count(Some(&predicate)).unwrap_or_else(|e| panic!("{e}"));
        let exists = compiler.exists(Some(&predicate)).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(count.sql, r#"SELECT COUNT(*) AS "count" FROM "users" WHERE "status" = ?"#);
        assert_eq!(exists.sql, r#"SELECT 1 AS "one" FROM "users" WHERE "status" = ? LIMIT 1"#);
        assert_eq!(count.args, exists.args);
    }
}
