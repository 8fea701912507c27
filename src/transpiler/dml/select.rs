use crate::ast::{JoinKind, Projection, Query};
use crate::error::Result;
use crate::transpiler::conditions::{render_predicate, require};
use crate::transpiler::placeholder::ParamContext;
use crate::transpiler::traits::{SqlFeature, SqlGenerator, escape_identifier};

/// SELECT in fixed clause order:
/// SELECT, FROM, JOIN, WHERE, GROUP BY, HAVING, ORDER BY, LIMIT/OFFSET.
pub fn build_select(
    query: &Query,
    generator: &dyn SqlGenerator,
    ctx: &mut ParamContext,
) -> Result<String> {
    let mut sql = String::from("SELECT ");
    if query.is_distinct() {
        require(generator, SqlFeature::Distinct)?;
        sql.push_str("DISTINCT ");
    }
    sql.push_str(&projection_list(query, generator));
    sql.push_str(" FROM ");
    sql.push_str(&escape_identifier(generator, query.table()));

    for join in query.joins() {
        require(generator, SqlFeature::Join)?;
        match join.kind {
            JoinKind::Right => require(generator, SqlFeature::RightJoin)?,
            JoinKind::Full => require(generator, SqlFeature::FullJoin)?,
            _ => {}
        }
        sql.push_str(&format!(
            " {} {} ON {} = {}",
            join.kind.sql_keyword(),
            escape_identifier(generator, &join.table),
            escape_identifier(generator, &join.left),
            escape_identifier(generator, &join.right)
        ));
    }

    if let Some(filter) = query.filter_tree() {
        sql.push_str(" WHERE ");
        sql.push_str(&render_predicate(filter, generator, ctx)?);
    }

    if !query.group_by_columns().is_empty() {
        require(generator, SqlFeature::GroupBy)?;
        let cols: Vec<String> = query
            .group_by_columns()
            .iter()
            .map(|c| escape_identifier(generator, c))
            .collect();
        sql.push_str(" GROUP BY ");
        sql.push_str(&cols.join(", "));
    }

    if let Some(having) = query.having_tree() {
        require(generator, SqlFeature::Having)?;
        sql.push_str(" HAVING ");
        sql.push_str(&render_predicate(having, generator, ctx)?);
    }

    let paged = query.limit_value().is_some() || query.offset_value().is_some();
    if !query.order().is_empty() {
        let cols: Vec<String> = query
            .order()
            .iter()
            .map(|o| format!("{} {}", escape_identifier(generator, &o.column), o.order.sql_keyword()))
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&cols.join(", "));
    } else if paged && generator.offset_requires_order() {
        sql.push_str(" ORDER BY (SELECT NULL)");
    }

    if query.offset_value().is_some() {
        require(generator, SqlFeature::Offset)?;
    }
    sql.push_str(&generator.limit_offset(query.limit_value(), query.offset_value()));

    if query.filter_tree().is_some() {
        if let Some(suffix) = generator.filter_suffix() {
            sql.push_str(suffix);
        }
    }
    Ok(sql)
}

fn projection_list(query: &Query, generator: &dyn SqlGenerator) -> String {
    if query.columns().is_empty() {
        return "*".to_string();
    }
    query
        .columns()
        .iter()
        .map(|p| match p {
            Projection::Column(c) => escape_identifier(generator, c),
            Projection::Aggregate { func, column, alias } => {
                let arg = column
                    .as_deref()
                    .map(|c| escape_identifier(generator, c))
                    .unwrap_or_else(|| "*".to_string());
                match alias {
                    Some(a) => format!("{}({}) AS {}", func, arg, escape_identifier(generator, a)),
                    None => format!("{}({})", func, arg),
                }
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
