use std::collections::BTreeSet;

use crate::ast::Query;
use crate::error::{OnedbError, Result};
use crate::transpiler::conditions::{render_predicate, require};
use crate::transpiler::placeholder::ParamContext;
use crate::transpiler::traits::{SqlFeature, SqlGenerator, escape_identifier};
use crate::value::Value;

/// `INSERT INTO t (a, b) VALUES (?, ?), (?, ?)`.
///
/// The column list is the sorted union of every row's keys; a row missing a
/// column binds NULL for it.
pub fn build_insert(
    query: &Query,
    generator: &dyn SqlGenerator,
    ctx: &mut ParamContext,
) -> Result<String> {
    reject_read_clauses(query, generator, "INSERT")?;
    if query.filter_tree().is_some() {
        return Err(OnedbError::unsupported("WHERE in INSERT", generator.name()));
    }

    let columns: BTreeSet<&String> = query.rows().iter().flat_map(|r| r.keys()).collect();
    let column_list: Vec<String> = columns
        .iter()
        .map(|c| escape_identifier(generator, c))
        .collect();

    let mut tuples = Vec::with_capacity(query.rows().len());
    for row in query.rows() {
        let placeholders: Vec<String> = columns
            .iter()
            .map(|c| ctx.add_param(row.get(*c).cloned().unwrap_or(Value::Null)))
            .collect();
        tuples.push(format!("({})", placeholders.join(", ")));
    }

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        escape_identifier(generator, query.table()),
        column_list.join(", "),
        tuples.join(", ")
    );
    sql.push_str(&returning_clause(query, generator)?);
    Ok(sql)
}

/// `UPDATE t SET a = ?, b = ? [WHERE ...]`.
pub fn build_update(
    query: &Query,
    generator: &dyn SqlGenerator,
    ctx: &mut ParamContext,
) -> Result<String> {
    reject_read_clauses(query, generator, "UPDATE")?;
    let assignments: Vec<String> = query
        .assignments()
        .iter()
        .map(|(col, value)| {
            format!(
                "{} = {}",
                escape_identifier(generator, col),
                ctx.add_param(value.clone())
            )
        })
        .collect();

    let mut sql = format!(
        "UPDATE {} SET {}",
        escape_identifier(generator, query.table()),
        assignments.join(", ")
    );
    if let Some(filter) = query.filter_tree() {
        sql.push_str(" WHERE ");
        sql.push_str(&render_predicate(filter, generator, ctx)?);
    }
    sql.push_str(&returning_clause(query, generator)?);
    Ok(sql)
}

/// `DELETE FROM t [WHERE ...]`.
pub fn build_delete(
    query: &Query,
    generator: &dyn SqlGenerator,
    ctx: &mut ParamContext,
) -> Result<String> {
    reject_read_clauses(query, generator, "DELETE")?;
    let mut sql = format!("DELETE FROM {}", escape_identifier(generator, query.table()));
    if let Some(filter) = query.filter_tree() {
        sql.push_str(" WHERE ");
        sql.push_str(&render_predicate(filter, generator, ctx)?);
    }
    sql.push_str(&returning_clause(query, generator)?);
    Ok(sql)
}

fn returning_clause(query: &Query, generator: &dyn SqlGenerator) -> Result<String> {
    if query.returning_columns().is_empty() {
        return Ok(String::new());
    }
    require(generator, SqlFeature::Returning)?;
    let cols: Vec<String> = query
        .returning_columns()
        .iter()
        .map(|c| escape_identifier(generator, c))
        .collect();
    Ok(format!(" RETURNING {}", cols.join(", ")))
}

/// Writes carry no projection, joins, grouping, ordering or paging; a clause
/// that would be dropped is an error instead.
fn reject_read_clauses(query: &Query, generator: &dyn SqlGenerator, statement: &str) -> Result<()> {
    let offending = if !query.joins().is_empty() {
        Some("JOIN")
    } else if !query.group_by_columns().is_empty() {
        Some("GROUP BY")
    } else if query.having_tree().is_some() {
        Some("HAVING")
    } else if !query.order().is_empty() {
        Some("ORDER BY")
    } else if query.limit_value().is_some() {
        Some("LIMIT")
    } else if query.offset_value().is_some() {
        Some("OFFSET")
    } else if query.is_distinct() || !query.columns().is_empty() {
        Some("projection")
    } else {
        None
    };
    match offending {
        Some(clause) => Err(OnedbError::unsupported(
            format!("{} in {}", clause, statement),
            generator.name(),
        )),
        None => Ok(()),
    }
}
