//! Cypher lowering. Tables are node labels; the queried label binds `n`,
//! joined labels bind `j1`, `j2`, ...

use std::collections::BTreeMap;

use serde::Serialize;

use super::{Clause, READ_ONLY_CLAUSES, like_to_regex, reject_clauses};
use crate::ast::{Action, CompareOp, JoinKind, Predicate, Projection, Query};
use crate::error::{OnedbError, Result};
use crate::value::Value;

const BACKEND: &str = "neo4j";

/// A Cypher statement with its `$p<n>` parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CypherQuery {
    pub statement: String,
    pub params: BTreeMap<String, Value>,
}

struct Builder<'q> {
    query: &'q Query,
    /// table name -> variable
    vars: Vec<(String, String)>,
    /// aggregate expression text / alias -> returned name
    aliases: BTreeMap<String, String>,
    params: BTreeMap<String, Value>,
}

impl<'q> Builder<'q> {
    fn new(query: &'q Query) -> Self {
        let mut vars = vec![(query.table().to_string(), "n".to_string())];
        for (i, join) in query.joins().iter().enumerate() {
            vars.push((join.table.clone(), format!("j{}", i + 1)));
        }
        Self {
            query,
            vars,
            aliases: BTreeMap::new(),
            params: BTreeMap::new(),
        }
    }

    fn param(&mut self, value: Value) -> String {
        let name = format!("p{}", self.params.len() + 1);
        self.params.insert(name.clone(), value);
        format!("${}", name)
    }

    /// `col` -> `n.col`, `orders.total` -> `j1.total`, aliases stay bare.
    fn property(&self, column: &str) -> String {
        if let Some(alias) = self.aliases.get(column) {
            return quote(alias);
        }
        if let Some((table, field)) = column.split_once('.') {
            if let Some((_, var)) = self.vars.iter().find(|(t, _)| t == table) {
                return format!("{}.{}", var, quote(field));
            }
        }
        format!("n.{}", quote(column))
    }

    fn predicate(&mut self, predicate: &Predicate, nested: bool) -> Result<String> {
        Ok(match predicate {
            Predicate::Compare { column, op, value } => {
                let symbol = match op {
                    CompareOp::Ne => "<>",
                    other => other.sql_symbol(),
                };
                let prop = self.property(column);
                format!("{} {} {}", prop, symbol, self.param(value.clone()))
            }
            Predicate::In {
                column,
                values,
                negated,
            } => {
                let prop = self.property(column);
                let p = self.param(Value::Array(values.clone()));
                if *negated {
                    format!("NOT {} IN {}", prop, p)
                } else {
                    format!("{} IN {}", prop, p)
                }
            }
            Predicate::Between {
                column,
                low,
                high,
                negated,
            } => {
                let prop = self.property(column);
                let lo = self.param(low.clone());
                let hi = self.param(high.clone());
                let sql = format!("{} <= {} <= {}", lo, prop, hi);
                if *negated { format!("NOT ({})", sql) } else { sql }
            }
            Predicate::Null { column, negated } => format!(
                "{} IS {}NULL",
                self.property(column),
                if *negated { "NOT " } else { "" }
            ),
            Predicate::Like {
                column,
                pattern,
                case_insensitive,
                negated,
            } => {
                let prop = self.property(column);
                let regex = if *case_insensitive {
                    format!("(?i){}", like_to_regex(pattern))
                } else {
                    like_to_regex(pattern)
                };
                let p = self.param(Value::String(regex));
                if *negated {
                    format!("NOT {} =~ {}", prop, p)
                } else {
                    format!("{} =~ {}", prop, p)
                }
            }
            Predicate::And(children) | Predicate::Or(children) => {
                let joiner = if matches!(predicate, Predicate::And(_)) { " AND " } else { " OR " };
                if let [only] = children.as_slice() {
                    return self.predicate(only, nested);
                }
                let mut parts = Vec::with_capacity(children.len());
                for child in children {
                    parts.push(self.predicate(child, true)?);
                }
                let sql = parts.join(joiner);
                if nested { format!("({})", sql) } else { sql }
            }
            Predicate::Not(inner) => format!("NOT ({})", self.predicate(inner, false)?),
        })
    }

    fn label(&self, table: &str) -> String {
        quote(table)
    }

    fn select(mut self) -> Result<CypherQuery> {
        let q = self.query;
        let mut lines = Vec::new();

        let mut patterns = vec![format!("(n:{})", self.label(q.table()))];
        let mut inner_conditions = Vec::new();
        let mut optional = Vec::new();
        for (i, join) in q.joins().iter().enumerate() {
            let var = format!("j{}", i + 1);
            let on = format!("{} = {}", self.property(&join.left), self.property(&join.right));
            match join.kind {
                JoinKind::Inner => {
                    patterns.push(format!("({}:{})", var, self.label(&join.table)));
                    inner_conditions.push(on);
                }
                JoinKind::Left => optional.push(format!(
                    "OPTIONAL MATCH ({}:{}) WHERE {}",
                    var,
                    self.label(&join.table),
                    on
                )),
                other => return Err(OnedbError::unsupported(other.sql_keyword(), BACKEND)),
            }
        }
        lines.push(format!("MATCH {}", patterns.join(", ")));

        let filter = match q.filter_tree() {
            Some(p) => Some(self.predicate(p, !inner_conditions.is_empty())?),
            None => None,
        };
        if optional.is_empty() {
            let mut conditions = inner_conditions;
            conditions.extend(filter);
            if !conditions.is_empty() {
                lines.push(format!("WHERE {}", conditions.join(" AND ")));
            }
        } else {
            if !inner_conditions.is_empty() {
                lines.push(format!("WHERE {}", inner_conditions.join(" AND ")));
            }
            lines.extend(optional);
            if let Some(f) = filter {
                lines.push(format!("WITH * WHERE {}", f));
            }
        }

        // Projection. Grouping keys are the non-aggregate items.
        let mut items: Vec<(String, String)> = Vec::new();
        for g in q.group_by_columns() {
            if !q.columns().iter().any(|p| p.output_name() == *g) {
                items.push((self.property(g), g.clone()));
            }
        }
        for p in q.columns() {
            match p {
                Projection::Column(c) => items.push((self.property(c), c.clone())),
                Projection::Aggregate { func, column, .. } => {
                    let arg = column
                        .as_deref()
                        .map(|c| self.property(c))
                        .unwrap_or_else(|| "*".to_string());
                    let expr = format!("{}({})", func.to_string().to_lowercase(), arg);
                    items.push((expr, p.output_name()));
                }
            }
        }
        for p in q.columns() {
            if let Projection::Aggregate { func, column, .. } = p {
                self.aliases.insert(
                    format!("{}({})", func, column.as_deref().unwrap_or("*")),
                    p.output_name(),
                );
                self.aliases.insert(p.output_name(), p.output_name());
            }
        }

        let distinct = if q.is_distinct() { "DISTINCT " } else { "" };
        if items.is_empty() {
            let vars: Vec<&str> = self.vars.iter().map(|(_, v)| v.as_str()).collect();
            lines.push(format!("RETURN {}{}", distinct, vars.join(", ")));
        } else if let Some(having) = q.having_tree() {
            let with: Vec<String> = items
                .iter()
                .map(|(expr, name)| format!("{} AS {}", expr, quote(name)))
                .collect();
            // After WITH every item is addressed by its alias.
            for (_, name) in &items {
                self.aliases.insert(name.clone(), name.clone());
            }
            let having = self.predicate(having, false)?;
            lines.push(format!("WITH {}{} WHERE {}", distinct, with.join(", "), having));
            let names: Vec<String> = items.iter().map(|(_, n)| quote(n)).collect();
            lines.push(format!("RETURN {}", names.join(", ")));
        } else {
            let ret: Vec<String> = items
                .iter()
                .map(|(expr, name)| format!("{} AS {}", expr, quote(name)))
                .collect();
            lines.push(format!("RETURN {}{}", distinct, ret.join(", ")));
        }

        if !q.order().is_empty() {
            let returned: Vec<&String> = items.iter().map(|(_, n)| n).collect();
            let order: Vec<String> = q
                .order()
                .iter()
                .map(|o| {
                    let target = if returned.contains(&&o.column) || self.aliases.contains_key(&o.column) {
                        quote(&o.column)
                    } else {
                        self.property(&o.column)
                    };
                    format!("{} {}", target, o.order.sql_keyword())
                })
                .collect();
            lines.push(format!("ORDER BY {}", order.join(", ")));
        }
        if let Some(n) = q.offset_value() {
            lines.push(format!("SKIP {}", n));
        }
        if let Some(n) = q.limit_value() {
            lines.push(format!("LIMIT {}", n));
        }

        Ok(CypherQuery {
            statement: lines.join("\n"),
            params: self.params,
        })
    }
}

pub fn build_cypher(query: &Query) -> Result<CypherQuery> {
    query.validate()?;
    let label = quote(query.table());
    match query.action() {
        Action::Select => {
            reject_clauses(query, BACKEND, &[Clause::Returning])?;
            Builder::new(query).select()
        }
        Action::Insert => {
            reject_clauses(query, BACKEND, READ_ONLY_CLAUSES)?;
            if query.filter_tree().is_some() {
                return Err(OnedbError::unsupported("WHERE in INSERT", BACKEND));
            }
            let mut b = Builder::new(query);
            let returning = returning(query);
            if let [row] = query.rows() {
                let props = Value::Json(serde_json::Value::Object(
                    row.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
                ));
                let p = b.param(props);
                return Ok(CypherQuery {
                    statement: format!("CREATE (n:{} {}){}", label, p, returning),
                    params: b.params,
                });
            }
            let rows = Value::Array(
                query
                    .rows()
                    .iter()
                    .map(|row| {
                        Value::Json(serde_json::Value::Object(
                            row.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
                        ))
                    })
                    .collect(),
            );
            let p = b.param(rows);
            Ok(CypherQuery {
                statement: format!("UNWIND {} AS row\nCREATE (n:{})\nSET n = row{}", p, label, returning),
                params: b.params,
            })
        }
        Action::Update => {
            reject_clauses(query, BACKEND, READ_ONLY_CLAUSES)?;
            let mut b = Builder::new(query);
            let mut lines = vec![format!("MATCH (n:{})", label)];
            if let Some(f) = query.filter_tree() {
                lines.push(format!("WHERE {}", b.predicate(f, false)?));
            }
            let mut sets = Vec::new();
            for (col, value) in query.assignments() {
                let p = b.param(value.clone());
                sets.push(format!("n.{} = {}", quote(col), p));
            }
            lines.push(format!("SET {}{}", sets.join(", "), returning(query)));
            Ok(CypherQuery {
                statement: lines.join("\n"),
                params: b.params,
            })
        }
        Action::Delete => {
            reject_clauses(query, BACKEND, READ_ONLY_CLAUSES)?;
            reject_clauses(query, BACKEND, &[Clause::Returning])?;
            let mut b = Builder::new(query);
            let mut lines = vec![format!("MATCH (n:{})", label)];
            if let Some(f) = query.filter_tree() {
                lines.push(format!("WHERE {}", b.predicate(f, false)?));
            }
            lines.push("DETACH DELETE n".to_string());
            Ok(CypherQuery {
                statement: lines.join("\n"),
                params: b.params,
            })
        }
    }
}

fn returning(query: &Query) -> String {
    if query.returning_columns().is_empty() {
        return String::new();
    }
    let cols: Vec<String> = query
        .returning_columns()
        .iter()
        .map(|c| format!("n.{} AS {}", quote(c), quote(c)))
        .collect();
    format!("\nRETURN {}", cols.join(", "))
}

/// Backtick-quote names that are not plain identifiers.
fn quote(name: &str) -> String {
    let plain = !name.is_empty()
        && name.chars().all(|c| c.is_alphanumeric() || c == '_')
        && !name.chars().next().map(|c| c.is_numeric()).unwrap_or(false);
    if plain {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AggregateFunc;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_match_where_return() {
        let q = Query::new("Person")
            .and_where("age", ">", 18)
            .or_filter(Predicate::like("name", "A%"))
            .select(["name", "age"])
            .order_by_desc("age")
            .limit(5);
        let c = build_cypher(&q).unwrap();
        assert_eq!(
            c.statement,
            "MATCH (n:Person)\nWHERE n.age > $p1 OR n.name =~ $p2\n\
             RETURN n.name AS name, n.age AS age\nORDER BY age DESC\nLIMIT 5"
        );
        assert_eq!(c.params["p1"], Value::Int(18));
        assert_eq!(c.params["p2"], Value::from("^A.*$"));
    }

    #[test]
    fn test_joins() {
        let q = Query::new("User")
            .join("Order", "User.id", "Order.user_id")
            .where_eq("Order.status", "paid");
        let c = build_cypher(&q).unwrap();
        assert_eq!(
            c.statement,
            "MATCH (n:User), (j1:Order)\nWHERE n.id = j1.user_id AND j1.status = $p1\nRETURN n, j1"
        );

        let left = Query::new("User").left_join("Order", "User.id", "Order.user_id");
        let c = build_cypher(&left).unwrap();
        assert!(c.statement.contains("OPTIONAL MATCH (j1:Order) WHERE n.id = j1.user_id"));

        let full = Query::new("User").full_join("Order", "User.id", "Order.user_id");
        assert!(build_cypher(&full).is_err());
    }

    #[test]
    fn test_group_having() {
        let q = Query::new("Order")
            .group_by(["customer"])
            .select_aggregate(AggregateFunc::Count, "*", "total")
            .having("COUNT(*)", ">=", 2);
        let c = build_cypher(&q).unwrap();
        assert_eq!(
            c.statement,
            "MATCH (n:Order)\nWITH n.customer AS customer, count(*) AS total WHERE total >= $p1\n\
             RETURN customer, total"
        );
    }

    #[test]
    fn test_writes() {
        let ins = Query::insert_into("Person").values(crate::value::record([("name", "Ann")]));
        let c = build_cypher(&ins).unwrap();
        assert_eq!(c.statement, "CREATE (n:Person $p1)");

        let del = Query::delete_from("Person").where_eq("name", "Ann");
        let c = build_cypher(&del).unwrap();
        assert_eq!(c.statement, "MATCH (n:Person)\nWHERE n.name = $p1\nDETACH DELETE n");
    }
}
