use serde::Serialize;

use super::operators::{Action, AggregateFunc, JoinKind, Operator, SortOrder};
use super::predicate::Predicate;
use crate::error::{OnedbError, Result};
use crate::value::{Record, Value};

/// One item of the projection list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Projection {
    Column(String),
    Aggregate {
        func: AggregateFunc,
        /// `None` means `*`.
        column: Option<String>,
        alias: Option<String>,
    },
}

impl Projection {
    /// The name the projected value appears under in result rows.
    pub fn output_name(&self) -> String {
        match self {
            Projection::Column(c) => c.clone(),
            Projection::Aggregate {
                func,
                column,
                alias,
            } => alias.clone().unwrap_or_else(|| {
                format!(
                    "{}_{}",
                    func.to_string().to_lowercase(),
                    column.as_deref().unwrap_or("all")
                )
            }),
        }
    }
}

/// `kind JOIN table ON left = right`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub left: String,
    pub right: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderBy {
    pub column: String,
    pub order: SortOrder,
}

/// Backend-neutral query.
///
/// Built by chaining builder calls, each of which consumes the query and
/// returns the extended one:
///
/// ```
/// use onedb::{PlaceholderStyle, Query};
///
/// let (sql, params) = Query::new("users")
///     .and_where("age", ">", 18)
///     .where_eq("status", "active")
///     .to_sql(PlaceholderStyle::Format)
///     .unwrap();
/// assert_eq!(sql, "SELECT * FROM users WHERE age > %s AND status = %s");
/// assert_eq!(params.len(), 2);
/// ```
///
/// Builder mistakes (an unknown operator, `IN` without a list, ...) are
/// recorded rather than panicking and are reported by [`Query::validate`],
/// which every renderer calls first.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Query {
    action: Action,
    table: String,
    columns: Vec<Projection>,
    distinct: bool,
    filter: Option<Predicate>,
    joins: Vec<Join>,
    group_by: Vec<String>,
    having: Option<Predicate>,
    order_by: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
    rows: Vec<Record>,
    assignments: Record,
    returning: Vec<String>,
    #[serde(skip)]
    errors: Vec<String>,
}

impl Query {
    /// Start a SELECT against `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    /// Start an INSERT into `table`; add rows with [`Query::values`].
    pub fn insert_into(table: impl Into<String>) -> Self {
        Self {
            action: Action::Insert,
            ..Self::new(table)
        }
    }

    /// Start an UPDATE of `table`; add assignments with [`Query::set`].
    pub fn update(table: impl Into<String>) -> Self {
        Self {
            action: Action::Update,
            ..Self::new(table)
        }
    }

    /// Start a DELETE from `table`.
    pub fn delete_from(table: impl Into<String>) -> Self {
        Self {
            action: Action::Delete,
            ..Self::new(table)
        }
    }

    /// An independent copy usable as the base of another chain.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    // ---- projection ----

    /// Replace the projection list. An empty projection renders as `*`.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns
            .into_iter()
            .map(|c| Projection::Column(c.into()))
            .collect();
        self
    }

    /// Add an aggregate projection. `column == "*"` aggregates whole rows.
    pub fn select_aggregate(
        mut self,
        func: AggregateFunc,
        column: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        let column = column.into();
        let alias = alias.into();
        self.columns.push(Projection::Aggregate {
            func,
            column: (column != "*").then_some(column),
            alias: (!alias.is_empty()).then_some(alias),
        });
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    // ---- filtering ----

    /// AND a `column <op> value` leaf into the WHERE tree.
    pub fn and_where(mut self, column: impl Into<String>, op: &str, value: impl Into<Value>) -> Self {
        match self.leaf(column, op, value.into()) {
            Some(p) => self.filter(p),
            None => self,
        }
    }

    /// AND a `column = value` leaf into the WHERE tree.
    pub fn where_eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and_where(column, "=", value)
    }

    /// OR a `column <op> value` leaf with the whole existing WHERE tree.
    pub fn or_where(mut self, column: impl Into<String>, op: &str, value: impl Into<Value>) -> Self {
        match self.leaf(column, op, value.into()) {
            Some(p) => self.or_filter(p),
            None => self,
        }
    }

    /// AND an explicit predicate subtree.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// OR an explicit predicate subtree with the existing tree.
    pub fn or_filter(mut self, predicate: Predicate) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.or(predicate),
            None => predicate,
        });
        self
    }

    /// AND the negation of a predicate subtree.
    pub fn where_not(self, predicate: Predicate) -> Self {
        self.filter(predicate.not())
    }

    pub fn where_in<V: Into<Value>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.checked(Predicate::in_list(column, values))
    }

    pub fn where_not_in<V: Into<Value>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.checked(Predicate::not_in(column, values))
    }

    pub fn where_null(self, column: impl Into<String>) -> Self {
        self.checked(Predicate::is_null(column))
    }

    pub fn where_not_null(self, column: impl Into<String>) -> Self {
        self.checked(Predicate::is_not_null(column))
    }

    pub fn where_between(
        self,
        column: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.checked(Predicate::between(column, low, high))
    }

    /// AND a SQL wildcard match (`%` any run, `_` one character).
    pub fn like(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.checked(Predicate::like(column, pattern))
    }

    /// Case-insensitive [`Query::like`].
    pub fn ilike(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.checked(Predicate::ilike(column, pattern))
    }

    // ---- joins ----

    /// INNER JOIN `table` ON `left = right`.
    pub fn join(
        self,
        table: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        self.join_on(JoinKind::Inner, table, left, right)
    }

    pub fn left_join(
        self,
        table: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        self.join_on(JoinKind::Left, table, left, right)
    }

    pub fn right_join(
        self,
        table: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        self.join_on(JoinKind::Right, table, left, right)
    }

    pub fn full_join(
        self,
        table: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        self.join_on(JoinKind::Full, table, left, right)
    }

    pub fn join_on(
        mut self,
        kind: JoinKind,
        table: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        let join = Join {
            kind,
            table: table.into(),
            left: left.into(),
            right: right.into(),
        };
        if join.table.is_empty() || join.left.is_empty() || join.right.is_empty() {
            self.errors
                .push("join requires a table and both ON columns".to_string());
        } else {
            self.joins.push(join);
        }
        self
    }

    // ---- grouping / ordering / paging ----

    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(columns.into_iter().map(Into::into));
        self
    }

    /// AND a `column <op> value` leaf into the HAVING tree. `column` may be an
    /// aggregate expression such as `COUNT(*)`.
    pub fn having(mut self, column: impl Into<String>, op: &str, value: impl Into<Value>) -> Self {
        if let Some(p) = self.leaf(column, op, value.into()) {
            self.having = Some(match self.having.take() {
                Some(existing) => existing.and(p),
                None => p,
            });
        }
        self
    }

    /// Order ascending by `column`.
    pub fn order_by(self, column: impl Into<String>) -> Self {
        self.sort(column, SortOrder::Asc)
    }

    pub fn order_by_desc(self, column: impl Into<String>) -> Self {
        self.sort(column, SortOrder::Desc)
    }

    pub fn sort(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.order_by.push(OrderBy {
            column: column.into(),
            order,
        });
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Set `limit = per_page` and `offset = (page - 1) * per_page`.
    /// Pages start at 1.
    pub fn paginate(self, page: u64, per_page: u64) -> Result<Self> {
        if page == 0 {
            return Err(OnedbError::invalid_query("page numbers start at 1"));
        }
        if per_page == 0 {
            return Err(OnedbError::invalid_query("per_page must be at least 1"));
        }
        let offset = (page - 1)
            .checked_mul(per_page)
            .ok_or_else(|| OnedbError::invalid_query("pagination offset overflows"))?;
        Ok(self.limit(per_page).offset(offset))
    }

    // ---- writes ----

    /// Add one row to an INSERT.
    pub fn values(mut self, row: Record) -> Self {
        self.rows.push(row);
        self
    }

    /// Add several rows to an INSERT.
    pub fn values_many(mut self, rows: impl IntoIterator<Item = Record>) -> Self {
        self.rows.extend(rows);
        self
    }

    /// Add a `column = value` assignment to an UPDATE.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assignments.insert(column.into(), value.into());
        self
    }

    /// Add every entry of `record` as an assignment.
    pub fn set_all(mut self, record: Record) -> Self {
        self.assignments.extend(record);
        self
    }

    /// Columns to return from a write, where the backend supports it.
    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning.extend(columns.into_iter().map(Into::into));
        self
    }

    fn leaf(&mut self, column: impl Into<String>, op: &str, value: Value) -> Option<Predicate> {
        let built = op
            .parse::<Operator>()
            .and_then(|op| Predicate::from_operator(column, op, value));
        match built {
            Ok(p) => Some(p),
            Err(e) => {
                self.errors.push(e.to_string());
                None
            }
        }
    }

    fn checked(mut self, predicate: Predicate) -> Self {
        match predicate.validate() {
            Ok(()) => self.filter(predicate),
            Err(e) => {
                self.errors.push(e.to_string());
                self
            }
        }
    }

    // ---- validation / accessors ----

    /// Report the first recorded builder mistake or structural problem.
    pub fn validate(&self) -> Result<()> {
        if let Some(first) = self.errors.first() {
            return Err(OnedbError::InvalidQuery(first.clone()));
        }
        if self.table.trim().is_empty() {
            return Err(OnedbError::invalid_query("query has no target table"));
        }
        if let Some(p) = &self.filter {
            p.validate()?;
        }
        if let Some(p) = &self.having {
            p.validate()?;
        }
        match self.action {
            Action::Insert => {
                if self.rows.is_empty() || self.rows.iter().any(|r| r.is_empty()) {
                    return Err(OnedbError::invalid_query("INSERT requires non-empty rows"));
                }
            }
            Action::Update if self.assignments.is_empty() => {
                return Err(OnedbError::invalid_query("UPDATE requires at least one assignment"));
            }
            _ => {}
        }
        Ok(())
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[Projection] {
        &self.columns
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn filter_tree(&self) -> Option<&Predicate> {
        self.filter.as_ref()
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn group_by_columns(&self) -> &[String] {
        &self.group_by
    }

    pub fn having_tree(&self) -> Option<&Predicate> {
        self.having.as_ref()
    }

    pub fn order(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn assignments(&self) -> &Record {
        &self.assignments
    }

    pub fn returning_columns(&self) -> &[String] {
        &self.returning
    }

    pub fn has_aggregates(&self) -> bool {
        self.columns
            .iter()
            .any(|c| matches!(c, Projection::Aggregate { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_is_non_interfering() {
        let base = Query::new("users").where_eq("active", true);
        let adults = base.copy().and_where("age", ">=", 18);
        let named = base.copy().like("name", "J%");

        assert_eq!(base.filter_tree(), Some(&Predicate::eq("active", true)));
        assert_ne!(adults.filter_tree(), named.filter_tree());
    }

    #[test]
    fn test_paginate() {
        let q = Query::new("users").paginate(3, 20).unwrap();
        assert_eq!(q.limit_value(), Some(20));
        assert_eq!(q.offset_value(), Some(40));

        let first = Query::new("users").paginate(1, 10).unwrap();
        assert_eq!(first.offset_value(), Some(0));

        assert!(Query::new("users").paginate(0, 10).is_err());
        assert!(Query::new("users").paginate(1, 0).is_err());
    }

    #[test]
    fn test_bad_operator_is_deferred() {
        let q = Query::new("users").and_where("age", "~~", 3);
        assert!(q.filter_tree().is_none());
        let err = q.validate().unwrap_err();
        assert!(err.to_string().contains("unknown operator"));
    }

    #[test]
    fn test_or_where_wraps_existing_tree() {
        let q = Query::new("users")
            .where_eq("a", 1)
            .where_eq("b", 2)
            .or_where("c", "=", 3);
        match q.filter_tree() {
            Some(Predicate::Or(children)) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(children[0], Predicate::And(_)));
            }
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_write_validation() {
        assert!(Query::insert_into("users").validate().is_err());
        assert!(Query::update("users").validate().is_err());
        assert!(Query::update("users").set("name", "x").validate().is_ok());
        assert!(Query::new("").validate().is_err());
        assert!(Query::new("t").where_null("").validate().is_err());
    }
}
