//! Elasticsearch lowering. Tables are indices; SELECT becomes a `search`
//! body built from the query DSL, writes become `index`, `bulk`,
//! `update_by_query` and `delete_by_query`.

use serde_json::{Map, Value as Json, json};

use super::{ApiRequest, Clause, READ_ONLY_CLAUSES, reject_clauses};
use crate::ast::{Action, AggregateFunc, CompareOp, Predicate, Projection, Query, SortOrder};
use crate::error::{OnedbError, Result};

const BACKEND: &str = "elasticsearch";

/// Bucket page size for grouped aggregations.
const COMPOSITE_SIZE: u64 = 1000;

pub fn build_elastic(query: &Query) -> Result<ApiRequest> {
    query.validate()?;
    let index = query.table();
    match query.action() {
        Action::Select => build_search(query),
        Action::Insert => {
            reject_clauses(query, BACKEND, READ_ONLY_CLAUSES)?;
            reject_clauses(query, BACKEND, &[Clause::Returning])?;
            if query.filter_tree().is_some() {
                return Err(OnedbError::unsupported("WHERE in INSERT", BACKEND));
            }
            let docs: Vec<Json> = query.rows().iter().map(document).collect();
            if let [doc] = docs.as_slice() {
                return Ok(ApiRequest::new("index", index, doc.clone()));
            }
            // Bulk bodies alternate action lines and sources.
            let mut lines = Vec::with_capacity(docs.len() * 2);
            for doc in docs {
                lines.push(json!({ "index": { "_index": index } }));
                lines.push(doc);
            }
            Ok(ApiRequest::new("bulk", index, Json::Array(lines)))
        }
        Action::Update => {
            reject_clauses(query, BACKEND, READ_ONLY_CLAUSES)?;
            reject_clauses(query, BACKEND, &[Clause::Returning])?;
            let mut source = Vec::new();
            let mut params = Map::new();
            for (i, (column, value)) in query.assignments().iter().enumerate() {
                let name = format!("p{}", i);
                source.push(format!("ctx._source[{}] = params.{};", painless_string(column), name));
                params.insert(name, value.to_json());
            }
            Ok(ApiRequest::new(
                "update_by_query",
                index,
                json!({
                    "query": root_query(query.filter_tree())?,
                    "script": {
                        "lang": "painless",
                        "source": source.join(" "),
                        "params": params,
                    },
                }),
            ))
        }
        Action::Delete => {
            reject_clauses(query, BACKEND, READ_ONLY_CLAUSES)?;
            reject_clauses(query, BACKEND, &[Clause::Returning])?;
            Ok(ApiRequest::new(
                "delete_by_query",
                index,
                json!({ "query": root_query(query.filter_tree())? }),
            ))
        }
    }
}

fn build_search(query: &Query) -> Result<ApiRequest> {
    reject_clauses(query, BACKEND, &[Clause::Join, Clause::Having, Clause::Returning])?;

    let mut body = Map::new();
    body.insert("query".to_string(), root_query(query.filter_tree())?);

    if query.has_aggregates() || !query.group_by_columns().is_empty() {
        if query.is_distinct() {
            return Err(OnedbError::unsupported("DISTINCT with aggregates", BACKEND));
        }
        if query.offset_value().is_some() {
            return Err(OnedbError::unsupported("OFFSET with aggregates", BACKEND));
        }
        body.insert("size".to_string(), json!(0));
        body.insert("aggs".to_string(), aggregations(query)?);
        return Ok(ApiRequest::new("search", query.table(), Json::Object(body)));
    }

    if let Some(n) = query.limit_value() {
        body.insert("size".to_string(), json!(n));
    }
    if let Some(n) = query.offset_value() {
        body.insert("from".to_string(), json!(n));
    }
    if !query.order().is_empty() {
        let sort: Vec<Json> = query
            .order()
            .iter()
            .map(|o| {
                let dir = match o.order {
                    SortOrder::Asc => "asc",
                    SortOrder::Desc => "desc",
                };
                json!({ o.column.clone(): { "order": dir } })
            })
            .collect();
        body.insert("sort".to_string(), Json::Array(sort));
    }
    if !query.columns().is_empty() {
        let fields: Vec<String> = query.columns().iter().map(|p| p.output_name()).collect();
        if query.is_distinct() {
            let [field] = fields.as_slice() else {
                return Err(OnedbError::unsupported("DISTINCT over several columns", BACKEND));
            };
            body.insert("collapse".to_string(), json!({ "field": field }));
        }
        body.insert("_source".to_string(), json!(fields));
    } else if query.is_distinct() {
        return Err(OnedbError::unsupported("DISTINCT without a column", BACKEND));
    }
    Ok(ApiRequest::new("search", query.table(), Json::Object(body)))
}

fn aggregations(query: &Query) -> Result<Json> {
    let mut metrics = Map::new();
    for p in query.columns() {
        let Projection::Aggregate { func, column, .. } = p else {
            if query.group_by_columns().iter().any(|g| Projection::Column(g.clone()) == *p) {
                continue;
            }
            return Err(OnedbError::invalid_query(format!(
                "column '{}' must appear in GROUP BY",
                p.output_name()
            )));
        };
        let metric = match (func, column) {
            (AggregateFunc::Count, None) => {
                // doc_count of the bucket carries COUNT(*).
                if query.group_by_columns().is_empty() {
                    json!({ "value_count": { "field": "_id" } })
                } else {
                    continue;
                }
            }
            (AggregateFunc::Count, Some(c)) => json!({ "value_count": { "field": c } }),
            (AggregateFunc::Sum, Some(c)) => json!({ "sum": { "field": c } }),
            (AggregateFunc::Avg, Some(c)) => json!({ "avg": { "field": c } }),
            (AggregateFunc::Min, Some(c)) => json!({ "min": { "field": c } }),
            (AggregateFunc::Max, Some(c)) => json!({ "max": { "field": c } }),
            (other, None) => {
                return Err(OnedbError::invalid_query(format!("{}(*) needs a column", other)));
            }
        };
        metrics.insert(p.output_name(), metric);
    }

    if query.group_by_columns().is_empty() {
        return Ok(Json::Object(metrics));
    }

    let sources: Vec<Json> = query
        .group_by_columns()
        .iter()
        .map(|g| {
            let dir = query
                .order()
                .iter()
                .find(|o| &o.column == g)
                .map(|o| o.order.sql_keyword().to_lowercase())
                .unwrap_or_else(|| "asc".to_string());
            json!({ g.clone(): { "terms": { "field": g, "order": dir } } })
        })
        .collect();
    if let Some(o) = query.order().iter().find(|o| !query.group_by_columns().contains(&o.column)) {
        return Err(OnedbError::unsupported(
            format!("ORDER BY '{}' on grouped results", o.column),
            BACKEND,
        ));
    }
    let mut groups = Map::new();
    groups.insert(
        "composite".to_string(),
        json!({
            "size": query.limit_value().unwrap_or(COMPOSITE_SIZE),
            "sources": sources,
        }),
    );
    if !metrics.is_empty() {
        groups.insert("aggs".to_string(), Json::Object(metrics));
    }
    Ok(json!({ "groups": groups }))
}

fn root_query(filter: Option<&Predicate>) -> Result<Json> {
    match filter {
        Some(p) => lower_predicate(p),
        None => Ok(json!({ "match_all": {} })),
    }
}

/// Lower a predicate into query DSL.
pub fn lower_predicate(predicate: &Predicate) -> Result<Json> {
    Ok(match predicate {
        Predicate::Compare { column, op, value } => {
            let v = value.to_json();
            match op {
                CompareOp::Eq => json!({ "term": { column.clone(): v } }),
                CompareOp::Ne => json!({ "bool": { "must_not": [{ "term": { column.clone(): v } }] } }),
                CompareOp::Gt => json!({ "range": { column.clone(): { "gt": v } } }),
                CompareOp::Gte => json!({ "range": { column.clone(): { "gte": v } } }),
                CompareOp::Lt => json!({ "range": { column.clone(): { "lt": v } } }),
                CompareOp::Lte => json!({ "range": { column.clone(): { "lte": v } } }),
            }
        }
        Predicate::In {
            column,
            values,
            negated,
        } => {
            let terms = json!({
                "terms": { column.clone(): values.iter().map(|v| v.to_json()).collect::<Vec<_>>() }
            });
            if *negated { must_not(terms) } else { terms }
        }
        Predicate::Between {
            column,
            low,
            high,
            negated,
        } => {
            let range = json!({ "range": { column.clone(): { "gte": low.to_json(), "lte": high.to_json() } } });
            if *negated { must_not(range) } else { range }
        }
        Predicate::Null { column, negated } => {
            let exists = json!({ "exists": { "field": column } });
            if *negated { exists } else { must_not(exists) }
        }
        Predicate::Like {
            column,
            pattern,
            case_insensitive,
            negated,
        } => {
            let wildcard = json!({
                "wildcard": {
                    column.clone(): {
                        "value": like_to_wildcard(pattern),
                        "case_insensitive": case_insensitive,
                    }
                }
            });
            if *negated { must_not(wildcard) } else { wildcard }
        }
        Predicate::And(children) => {
            if let [only] = children.as_slice() {
                return lower_predicate(only);
            }
            let filter = children.iter().map(lower_predicate).collect::<Result<Vec<_>>>()?;
            json!({ "bool": { "filter": filter } })
        }
        Predicate::Or(children) => {
            if let [only] = children.as_slice() {
                return lower_predicate(only);
            }
            let should = children.iter().map(lower_predicate).collect::<Result<Vec<_>>>()?;
            json!({ "bool": { "should": should, "minimum_should_match": 1 } })
        }
        Predicate::Not(inner) => must_not(lower_predicate(inner)?),
    })
}

fn must_not(clause: Json) -> Json {
    json!({ "bool": { "must_not": [clause] } })
}

/// `%` -> `*`, `_` -> `?`, with wildcard metacharacters escaped.
fn like_to_wildcard(pattern: &str) -> String {
    super::like_to_glob(pattern)
}

fn document(row: &crate::value::Record) -> Json {
    Json::Object(row.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
}

fn painless_string(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_search_body() {
        let q = Query::new("logs")
            .where_eq("level", "error")
            .and_where("status", ">=", 500)
            .select(["message"])
            .order_by_desc("ts")
            .limit(10)
            .offset(20);
        let req = build_elastic(&q).unwrap();
        assert_eq!(req.operation, "search");
        assert_eq!(req.target, "logs");
        assert_eq!(
            req.body,
            json!({
                "query": { "bool": { "filter": [
                    { "term": { "level": "error" } },
                    { "range": { "status": { "gte": 500 } } }
                ] } },
                "size": 10,
                "from": 20,
                "sort": [{ "ts": { "order": "desc" } }],
                "_source": ["message"]
            })
        );
    }

    #[test]
    fn test_or_not_null_like() {
        let p = Predicate::is_null("deleted_at").or(Predicate::ilike("name", "jo%"));
        assert_eq!(
            lower_predicate(&p).unwrap(),
            json!({ "bool": { "should": [
                { "bool": { "must_not": [{ "exists": { "field": "deleted_at" } }] } },
                { "wildcard": { "name": { "value": "jo*", "case_insensitive": true } } }
            ], "minimum_should_match": 1 } })
        );
    }

    #[test]
    fn test_grouped_aggregation() {
        let q = Query::new("orders")
            .group_by(["status"])
            .select_aggregate(AggregateFunc::Count, "*", "n")
            .select_aggregate(AggregateFunc::Sum, "total", "revenue");
        let req = build_elastic(&q).unwrap();
        assert_eq!(req.body["size"], json!(0));
        assert_eq!(
            req.body["aggs"]["groups"]["composite"]["sources"],
            json!([{ "status": { "terms": { "field": "status", "order": "asc" } } }])
        );
        assert_eq!(
            req.body["aggs"]["groups"]["aggs"],
            json!({ "revenue": { "sum": { "field": "total" } } })
        );
    }

    #[test]
    fn test_unsupported_and_writes() {
        let join = Query::new("a").join("b", "a.id", "b.a_id");
        assert_eq!(build_elastic(&join).unwrap_err().details()["clause"], "JOIN");

        let del = Query::delete_from("logs").where_eq("level", "debug");
        let req = build_elastic(&del).unwrap();
        assert_eq!(req.operation, "delete_by_query");
        assert_eq!(req.body, json!({ "query": { "term": { "level": "debug" } } }));

        let upd = Query::update("logs").set("seen", true).where_eq("id", 1);
        let req = build_elastic(&upd).unwrap();
        assert_eq!(req.body["script"]["source"], json!("ctx._source['seen'] = params.p0;"));
    }
}
