//! Redis lowering.
//!
//! Rows live in hashes keyed `<table>:<key>`. Only key lookups (`=`, `IN`),
//! existence checks (`COUNT(*)` over key lookups) and key pattern scans
//! (`LIKE` on the key column) are representable.

use std::fmt;

use serde::Serialize;

use super::{Clause, READ_ONLY_CLAUSES, like_to_glob, reject_clauses};
use crate::ast::{Action, AggregateFunc, CompareOp, Predicate, Projection, Query};
use crate::error::{OnedbError, Result};
use crate::value::Value;

const BACKEND: &str = "redis";

/// Default name of the column that holds the key suffix.
pub const DEFAULT_KEY_COLUMN: &str = "id";

/// Page size hint for `SCAN`.
const SCAN_COUNT: &str = "100";

/// One Redis command, name first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Command(pub Vec<String>);

impl Command {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Command(parts.into_iter().map(Into::into).collect())
    }

    pub fn name(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or("")
    }

    pub fn args(&self) -> &[String] {
        self.0.get(1..).unwrap_or(&[])
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

enum KeySelection {
    Keys(Vec<String>),
    Pattern(String),
}

pub fn build_redis(query: &Query, key_column: &str) -> Result<Vec<Command>> {
    query.validate()?;
    match query.action() {
        Action::Select => build_read(query, key_column),
        Action::Insert => {
            reject_clauses(query, BACKEND, READ_ONLY_CLAUSES)?;
            reject_clauses(query, BACKEND, &[Clause::Returning])?;
            if query.filter_tree().is_some() {
                return Err(OnedbError::unsupported("WHERE in INSERT", BACKEND));
            }
            query
                .rows()
                .iter()
                .map(|row| {
                    let id = row.get(key_column).filter(|v| !v.is_null()).ok_or_else(|| {
                        OnedbError::invalid_query(format!(
                            "row for '{}' has no '{}' key column",
                            query.table(),
                            key_column
                        ))
                    })?;
                    let mut parts = vec!["HSET".to_string(), key(query.table(), id)];
                    for (field, value) in row {
                        parts.push(field.clone());
                        parts.push(value.to_plain_string());
                    }
                    Ok(Command(parts))
                })
                .collect()
        }
        Action::Update => {
            reject_clauses(query, BACKEND, READ_ONLY_CLAUSES)?;
            reject_clauses(query, BACKEND, &[Clause::Returning])?;
            if query.assignments().contains_key(key_column) {
                return Err(OnedbError::invalid_query(format!(
                    "cannot update key column '{}'",
                    key_column
                )));
            }
            let KeySelection::Keys(keys) = select_keys(query, key_column)? else {
                return Err(OnedbError::unsupported("UPDATE by key pattern", BACKEND));
            };
            Ok(keys
                .into_iter()
                .map(|k| {
                    let mut parts = vec!["HSET".to_string(), k];
                    for (field, value) in query.assignments() {
                        parts.push(field.clone());
                        parts.push(value.to_plain_string());
                    }
                    Command(parts)
                })
                .collect())
        }
        Action::Delete => {
            reject_clauses(query, BACKEND, READ_ONLY_CLAUSES)?;
            reject_clauses(query, BACKEND, &[Clause::Returning])?;
            match select_keys(query, key_column)? {
                KeySelection::Keys(keys) => {
                    let mut parts = vec!["DEL".to_string()];
                    parts.extend(keys);
                    Ok(vec![Command(parts)])
                }
                KeySelection::Pattern(_) => {
                    Err(OnedbError::unsupported("DELETE by key pattern", BACKEND))
                }
            }
        }
    }
}

fn build_read(query: &Query, key_column: &str) -> Result<Vec<Command>> {
    reject_clauses(
        query,
        BACKEND,
        &[
            Clause::Join,
            Clause::GroupBy,
            Clause::Having,
            Clause::OrderBy,
            Clause::Limit,
            Clause::Offset,
            Clause::Distinct,
            Clause::Returning,
        ],
    )?;

    let selection = select_keys(query, key_column)?;
    let exists_check = match query.columns() {
        [
            Projection::Aggregate {
                func: AggregateFunc::Count,
                column: None,
                ..
            },
        ] => true,
        cols if cols.iter().any(|c| matches!(c, Projection::Aggregate { .. })) => {
            return Err(OnedbError::unsupported("aggregate projection", BACKEND));
        }
        _ => false,
    };

    match selection {
        KeySelection::Keys(keys) if exists_check => {
            let mut parts = vec!["EXISTS".to_string()];
            parts.extend(keys);
            Ok(vec![Command(parts)])
        }
        KeySelection::Keys(keys) => {
            let fields: Vec<String> = query.columns().iter().map(|p| p.output_name()).collect();
            Ok(keys
                .into_iter()
                .map(|k| {
                    if fields.is_empty() {
                        Command(vec!["HGETALL".to_string(), k])
                    } else {
                        let mut parts = vec!["HMGET".to_string(), k];
                        parts.extend(fields.iter().cloned());
                        Command(parts)
                    }
                })
                .collect())
        }
        KeySelection::Pattern(_) if exists_check => {
            Err(OnedbError::unsupported("COUNT over a key pattern", BACKEND))
        }
        KeySelection::Pattern(pattern) => {
            if !query.columns().is_empty() {
                return Err(OnedbError::unsupported("projection on a key scan", BACKEND));
            }
            Ok(vec![Command::new([
                "SCAN", "0", "MATCH", pattern.as_str(), "COUNT", SCAN_COUNT,
            ])])
        }
    }
}

fn select_keys(query: &Query, key_column: &str) -> Result<KeySelection> {
    let table = query.table();
    let Some(filter) = query.filter_tree() else {
        return Ok(KeySelection::Pattern(format!("{}:*", like_to_glob(table))));
    };
    let check_column = |column: &str| -> Result<()> {
        if column == key_column {
            Ok(())
        } else {
            Err(OnedbError::unsupported(
                format!("filter on non-key column '{}'", column),
                BACKEND,
            ))
        }
    };
    match filter {
        Predicate::Compare {
            column,
            op: CompareOp::Eq,
            value,
        } => {
            check_column(column)?;
            Ok(KeySelection::Keys(vec![key(table, value)]))
        }
        Predicate::In {
            column,
            values,
            negated: false,
        } => {
            check_column(column)?;
            Ok(KeySelection::Keys(values.iter().map(|v| key(table, v)).collect()))
        }
        Predicate::Like {
            column,
            pattern,
            case_insensitive: false,
            negated: false,
        } => {
            check_column(column)?;
            Ok(KeySelection::Pattern(format!(
                "{}:{}",
                like_to_glob(table),
                like_to_glob(pattern)
            )))
        }
        Predicate::Or(_) => Err(OnedbError::unsupported("OR", BACKEND)),
        Predicate::And(_) => Err(OnedbError::unsupported("AND", BACKEND)),
        Predicate::Not(_) => Err(OnedbError::unsupported("NOT", BACKEND)),
        Predicate::Compare { op, .. } => Err(OnedbError::unsupported(
            format!("comparison '{}'", op.sql_symbol()),
            BACKEND,
        )),
        Predicate::Between { .. } => Err(OnedbError::unsupported("BETWEEN", BACKEND)),
        Predicate::Null { .. } => Err(OnedbError::unsupported("IS NULL", BACKEND)),
        Predicate::In { .. } => Err(OnedbError::unsupported("NOT IN", BACKEND)),
        Predicate::Like { .. } => Err(OnedbError::unsupported("ILIKE / NOT LIKE", BACKEND)),
    }
}

fn key(table: &str, id: &Value) -> String {
    format!("{}:{}", table, id.to_plain_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lower(q: &Query) -> Result<Vec<Command>> {
        build_redis(q, DEFAULT_KEY_COLUMN)
    }

    #[test]
    fn test_key_lookup_and_exists() {
        let cmds = lower(&Query::new("users").where_eq("id", 42)).unwrap();
        assert_eq!(cmds, vec![Command::new(["HGETALL", "users:42"])]);

        let cmds = lower(
            &Query::new("users")
                .where_in("id", [1i64, 2])
                .select_aggregate(AggregateFunc::Count, "*", "n"),
        )
        .unwrap();
        assert_eq!(cmds, vec![Command::new(["EXISTS", "users:1", "users:2"])]);
    }

    #[test]
    fn test_pattern_scan() {
        let cmds = lower(&Query::new("sessions").like("id", "abc%")).unwrap();
        assert_eq!(
            cmds,
            vec![Command::new(["SCAN", "0", "MATCH", "sessions:abc*", "COUNT", "100"])]
        );
        assert_eq!(cmds[0].name(), "SCAN");
    }

    #[test]
    fn test_unrepresentable_queries_fail() {
        let err = lower(&Query::new("users").join("orders", "users.id", "orders.user_id"))
            .unwrap_err();
        assert_eq!(err.details()["clause"], "JOIN");
        assert!(lower(&Query::new("users").and_where("age", ">", 3)).is_err());
        assert!(lower(&Query::new("users").where_eq("name", "x")).is_err());
        assert!(lower(&Query::new("users").limit(1)).is_err());
    }

    #[test]
    fn test_writes() {
        let ins = Query::insert_into("users")
            .values(crate::value::record([("id", Value::from(1)), ("name", Value::from("Ann"))]));
        assert_eq!(
            lower(&ins).unwrap(),
            vec![Command::new(["HSET", "users:1", "id", "1", "name", "Ann"])]
        );
        let del = Query::delete_from("users").where_in("id", [1i64, 2]);
        assert_eq!(
            lower(&del).unwrap(),
            vec![Command::new(["DEL", "users:1", "users:2"])]
        );
        let missing_key = Query::insert_into("users")
            .values(crate::value::record([("name", "Ann")]));
        assert!(lower(&missing_key).is_err());
    }
}
