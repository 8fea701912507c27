//! DynamoDB lowering to `Scan` / `PutItem` / `BatchWriteItem` /
//! `UpdateItem` / `DeleteItem` request bodies.

use serde_json::{Map, Value as Json, json};

use super::{ApiRequest, Clause, READ_ONLY_CLAUSES, reject_clauses};
use crate::ast::{Action, CompareOp, Predicate, Query};
use crate::error::{OnedbError, Result};
use crate::value::{Record, Value};

const BACKEND: &str = "dynamodb";

/// Names and values referenced by an expression (`#n0`, `:v0`).
#[derive(Default)]
struct Expr {
    names: Map<String, Json>,
    values: Map<String, Json>,
}

impl Expr {
    fn name(&mut self, column: &str) -> String {
        if let Some((placeholder, _)) = self.names.iter().find(|(_, v)| v.as_str() == Some(column)) {
            return placeholder.clone();
        }
        let placeholder = format!("#n{}", self.names.len());
        self.names.insert(placeholder.clone(), json!(column));
        placeholder
    }

    fn value(&mut self, value: &Value) -> Result<String> {
        let placeholder = format!(":v{}", self.values.len());
        self.values.insert(placeholder.clone(), attribute_value(value)?);
        Ok(placeholder)
    }

    fn apply(self, body: &mut Map<String, Json>) {
        if !self.names.is_empty() {
            body.insert("ExpressionAttributeNames".to_string(), Json::Object(self.names));
        }
        if !self.values.is_empty() {
            body.insert("ExpressionAttributeValues".to_string(), Json::Object(self.values));
        }
    }
}

/// Encode a value as a typed DynamoDB attribute.
pub fn attribute_value(value: &Value) -> Result<Json> {
    Ok(match value {
        Value::Null => json!({ "NULL": true }),
        Value::Bool(b) => json!({ "BOOL": b }),
        Value::Int(i) => json!({ "N": i.to_string() }),
        Value::Float(f) => json!({ "N": f.to_string() }),
        Value::String(s) => json!({ "S": s }),
        Value::Timestamp(ts) => json!({ "S": ts.to_rfc3339() }),
        Value::Bytes(_) => return Err(OnedbError::unsupported("binary attribute value", BACKEND)),
        Value::Array(items) => json!({
            "L": items.iter().map(attribute_value).collect::<Result<Vec<_>>>()?
        }),
        Value::Json(j) => json_attribute(j),
    })
}

fn json_attribute(j: &Json) -> Json {
    match j {
        Json::Null => json!({ "NULL": true }),
        Json::Bool(b) => json!({ "BOOL": b }),
        Json::Number(n) => json!({ "N": n.to_string() }),
        Json::String(s) => json!({ "S": s }),
        Json::Array(items) => json!({ "L": items.iter().map(json_attribute).collect::<Vec<_>>() }),
        Json::Object(map) => json!({
            "M": map.iter().map(|(k, v)| (k.clone(), json_attribute(v))).collect::<Map<_, _>>()
        }),
    }
}

fn item(record: &Record) -> Result<Json> {
    let mut out = Map::new();
    for (k, v) in record {
        out.insert(k.clone(), attribute_value(v)?);
    }
    Ok(Json::Object(out))
}

pub fn build_dynamo(query: &Query) -> Result<ApiRequest> {
    query.validate()?;
    match query.action() {
        Action::Select => build_scan(query),
        Action::Insert => {
            reject_clauses(query, BACKEND, READ_ONLY_CLAUSES)?;
            reject_clauses(query, BACKEND, &[Clause::Returning])?;
            if query.filter_tree().is_some() {
                return Err(OnedbError::unsupported("WHERE in INSERT", BACKEND));
            }
            if let [row] = query.rows() {
                return Ok(ApiRequest::new(
                    "PutItem",
                    query.table(),
                    json!({ "TableName": query.table(), "Item": item(row)? }),
                ));
            }
            let puts = query
                .rows()
                .iter()
                .map(|row| Ok(json!({ "PutRequest": { "Item": item(row)? } })))
                .collect::<Result<Vec<_>>>()?;
            let mut request_items = Map::new();
            request_items.insert(query.table().to_string(), Json::Array(puts));
            Ok(ApiRequest::new(
                "BatchWriteItem",
                query.table(),
                json!({ "RequestItems": request_items }),
            ))
        }
        Action::Update => {
            reject_clauses(query, BACKEND, READ_ONLY_CLAUSES)?;
            reject_clauses(query, BACKEND, &[Clause::Returning])?;
            let key = key_from_filter(query.filter_tree(), "UPDATE")?;
            let mut expr = Expr::default();
            let mut sets = Vec::new();
            for (col, value) in query.assignments() {
                if key.contains_key(col) {
                    return Err(OnedbError::invalid_query(format!(
                        "cannot update key attribute '{}'",
                        col
                    )));
                }
                let n = expr.name(col);
                let v = expr.value(value)?;
                sets.push(format!("{} = {}", n, v));
            }
            let mut body = Map::new();
            body.insert("TableName".to_string(), json!(query.table()));
            body.insert("Key".to_string(), key_json(&key)?);
            body.insert("UpdateExpression".to_string(), json!(format!("SET {}", sets.join(", "))));
            expr.apply(&mut body);
            Ok(ApiRequest::new("UpdateItem", query.table(), Json::Object(body)))
        }
        Action::Delete => {
            reject_clauses(query, BACKEND, READ_ONLY_CLAUSES)?;
            reject_clauses(query, BACKEND, &[Clause::Returning])?;
            let key = key_from_filter(query.filter_tree(), "DELETE")?;
            Ok(ApiRequest::new(
                "DeleteItem",
                query.table(),
                json!({ "TableName": query.table(), "Key": key_json(&key)? }),
            ))
        }
    }
}

fn build_scan(query: &Query) -> Result<ApiRequest> {
    reject_clauses(
        query,
        BACKEND,
        &[
            Clause::Join,
            Clause::GroupBy,
            Clause::Having,
            Clause::Aggregate,
            Clause::Distinct,
            Clause::OrderBy,
            Clause::Offset,
            Clause::Returning,
        ],
    )?;
    // Scan applies Limit before the filter, which would return fewer
    // matches than asked for.
    if query.limit_value().is_some() && query.filter_tree().is_some() {
        return Err(OnedbError::unsupported("LIMIT with a filter", BACKEND));
    }

    let mut expr = Expr::default();
    let mut body = Map::new();
    body.insert("TableName".to_string(), json!(query.table()));
    if let Some(filter) = query.filter_tree() {
        let rendered = render(filter, &mut expr, false)?;
        body.insert("FilterExpression".to_string(), json!(rendered));
    }
    if !query.columns().is_empty() {
        let names: Vec<String> = query
            .columns()
            .iter()
            .map(|p| expr.name(&p.output_name()))
            .collect();
        body.insert("ProjectionExpression".to_string(), json!(names.join(", ")));
    }
    if let Some(n) = query.limit_value() {
        body.insert("Limit".to_string(), json!(n));
    }
    expr.apply(&mut body);
    Ok(ApiRequest::new("Scan", query.table(), Json::Object(body)))
}

fn render(predicate: &Predicate, expr: &mut Expr, nested: bool) -> Result<String> {
    Ok(match predicate {
        Predicate::Compare { column, op, value } => {
            let symbol = match op {
                CompareOp::Ne => "<>",
                other => other.sql_symbol(),
            };
            format!("{} {} {}", expr.name(column), symbol, expr.value(value)?)
        }
        Predicate::In {
            column,
            values,
            negated,
        } => {
            if values.is_empty() {
                return Err(OnedbError::unsupported("empty IN list", BACKEND));
            }
            let n = expr.name(column);
            let list = values
                .iter()
                .map(|v| expr.value(v))
                .collect::<Result<Vec<_>>>()?;
            let sql = format!("{} IN ({})", n, list.join(", "));
            if *negated { format!("NOT ({})", sql) } else { sql }
        }
        Predicate::Between {
            column,
            low,
            high,
            negated,
        } => {
            let sql = format!(
                "{} BETWEEN {} AND {}",
                expr.name(column),
                expr.value(low)?,
                expr.value(high)?
            );
            if *negated { format!("NOT ({})", sql) } else { sql }
        }
        Predicate::Null { column, negated } => {
            let f = if *negated { "attribute_exists" } else { "attribute_not_exists" };
            format!("{}({})", f, expr.name(column))
        }
        Predicate::Like {
            column,
            pattern,
            case_insensitive,
            negated,
        } => {
            if *case_insensitive {
                return Err(OnedbError::unsupported("ILIKE", BACKEND));
            }
            let sql = like_function(column, pattern, expr)?;
            if *negated { format!("NOT {}", sql) } else { sql }
        }
        Predicate::And(children) | Predicate::Or(children) => {
            let joiner = if matches!(predicate, Predicate::And(_)) { " AND " } else { " OR " };
            if let [only] = children.as_slice() {
                return render(only, expr, nested);
            }
            let parts = children
                .iter()
                .map(|c| render(c, expr, true))
                .collect::<Result<Vec<_>>>()?;
            let sql = parts.join(joiner);
            if nested { format!("({})", sql) } else { sql }
        }
        Predicate::Not(inner) => format!("NOT ({})", render(inner, expr, false)?),
    })
}

/// `abc%` maps to `begins_with`, `%abc%` to `contains`; other shapes have
/// no DynamoDB equivalent.
fn like_function(column: &str, pattern: &str, expr: &mut Expr) -> Result<String> {
    let is_literal = |s: &str| !s.is_empty() && !s.contains(['%', '_']);
    if let Some(prefix) = pattern.strip_suffix('%').filter(|p| is_literal(p)) {
        let n = expr.name(column);
        let v = expr.value(&Value::from(prefix))?;
        return Ok(format!("begins_with({}, {})", n, v));
    }
    if let Some(inner) = pattern
        .strip_prefix('%')
        .and_then(|p| p.strip_suffix('%'))
        .filter(|p| is_literal(p))
    {
        let n = expr.name(column);
        let v = expr.value(&Value::from(inner))?;
        return Ok(format!("contains({}, {})", n, v));
    }
    Err(OnedbError::unsupported(format!("LIKE pattern '{}'", pattern), BACKEND))
}

/// Single-item writes need the full key as a conjunction of equalities.
fn key_from_filter(filter: Option<&Predicate>, statement: &str) -> Result<Record> {
    let mut key = Record::new();
    let mut collect = |p: &Predicate| -> Result<()> {
        match p {
            Predicate::Compare {
                column,
                op: CompareOp::Eq,
                value,
            } => {
                key.insert(column.clone(), value.clone());
                Ok(())
            }
            _ => Err(OnedbError::unsupported(
                format!("{} without key equality", statement),
                BACKEND,
            )),
        }
    };
    match filter {
        Some(Predicate::And(children)) => children.iter().try_for_each(&mut collect)?,
        Some(leaf) => collect(leaf)?,
        None => {
            return Err(OnedbError::unsupported(
                format!("{} without key equality", statement),
                BACKEND,
            ));
        }
    }
    Ok(key)
}

fn key_json(key: &Record) -> Result<Json> {
    item(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scan_with_filter() {
        let q = Query::new("users")
            .and_where("age", ">", 18)
            .like("name", "Jo%")
            .select(["name"]);
        let req = build_dynamo(&q).unwrap();
        assert_eq!(req.operation, "Scan");
        assert_eq!(
            req.body,
            json!({
                "TableName": "users",
                "FilterExpression": "#n0 > :v0 AND begins_with(#n1, :v1)",
                "ProjectionExpression": "#n1",
                "ExpressionAttributeNames": { "#n0": "age", "#n1": "name" },
                "ExpressionAttributeValues": { ":v0": { "N": "18" }, ":v1": { "S": "Jo" } }
            })
        );
    }

    #[test]
    fn test_unsupported_clauses() {
        assert!(build_dynamo(&Query::new("users").order_by("age")).is_err());
        assert!(build_dynamo(&Query::new("users").offset(5)).is_err());
        assert!(build_dynamo(&Query::new("users").like("name", "a%b")).is_err());
        assert!(build_dynamo(&Query::new("users").where_eq("a", 1).limit(5)).is_err());
    }

    #[test]
    fn test_writes() {
        let put = Query::insert_into("users").values(crate::value::record([("id", 1)]));
        assert_eq!(build_dynamo(&put).unwrap().operation, "PutItem");

        let update = Query::update("users").set("name", "Ann").where_eq("id", 1);
        let req = build_dynamo(&update).unwrap();
        assert_eq!(req.operation, "UpdateItem");
        assert_eq!(req.body["Key"], json!({ "id": { "N": "1" } }));
        assert_eq!(req.body["UpdateExpression"], json!("SET #n0 = :v0"));

        let bad = Query::delete_from("users").and_where("age", ">", 3);
        assert!(build_dynamo(&bad).is_err());
    }
}
