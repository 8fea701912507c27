//! MongoDB lowering: filter documents, find options and aggregation pipelines.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value as Json, json};

use super::{Clause, READ_ONLY_CLAUSES, like_to_regex, reject_clauses};
use crate::ast::{
    Action, AggregateFunc, CompareOp, JoinKind, Predicate, Projection, Query,
};
use crate::error::{OnedbError, Result};

const BACKEND: &str = "mongodb";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MongoOperation {
    Find,
    Aggregate,
    InsertMany,
    UpdateMany,
    DeleteMany,
}

/// A lowered document-store request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MongoQuery {
    pub collection: String,
    pub operation: MongoOperation,
    /// Filter document (`{}` matches everything).
    pub filter: Json,
    /// `projection` / `sort` / `skip` / `limit` for finds.
    pub options: Json,
    /// Documents to insert.
    pub documents: Vec<Json>,
    /// Update document for `UpdateMany`.
    pub update: Option<Json>,
    /// Stages for `Aggregate`.
    pub pipeline: Vec<Json>,
}

impl MongoQuery {
    fn new(collection: &str, operation: MongoOperation) -> Self {
        Self {
            collection: collection.to_string(),
            operation,
            filter: Json::Object(Map::new()),
            options: Json::Object(Map::new()),
            documents: Vec::new(),
            update: None,
            pipeline: Vec::new(),
        }
    }
}

/// Lower a query to a find / insert / update / delete request.
///
/// Joins, grouping, aggregates and DISTINCT have no find-level equivalent and
/// fail; use [`build_pipeline`] for those.
pub fn build_mongo(query: &Query) -> Result<MongoQuery> {
    query.validate()?;
    match query.action() {
        Action::Select => build_find(query),
        Action::Insert => {
            reject_clauses(query, BACKEND, READ_ONLY_CLAUSES)?;
            reject_clauses(query, BACKEND, &[Clause::Returning])?;
            if query.filter_tree().is_some() {
                return Err(OnedbError::unsupported("WHERE in INSERT", BACKEND));
            }
            let mut out = MongoQuery::new(query.table(), MongoOperation::InsertMany);
            out.documents = query
                .rows()
                .iter()
                .map(|row| Json::Object(row.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()))
                .collect();
            Ok(out)
        }
        Action::Update => {
            reject_clauses(query, BACKEND, READ_ONLY_CLAUSES)?;
            reject_clauses(query, BACKEND, &[Clause::Returning])?;
            let mut out = MongoQuery::new(query.table(), MongoOperation::UpdateMany);
            out.filter = root_filter(query.filter_tree())?;
            let set: Map<String, Json> = query
                .assignments()
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect();
            out.update = Some(json!({ "$set": set }));
            Ok(out)
        }
        Action::Delete => {
            reject_clauses(query, BACKEND, READ_ONLY_CLAUSES)?;
            reject_clauses(query, BACKEND, &[Clause::Returning])?;
            let mut out = MongoQuery::new(query.table(), MongoOperation::DeleteMany);
            out.filter = root_filter(query.filter_tree())?;
            Ok(out)
        }
    }
}

fn build_find(query: &Query) -> Result<MongoQuery> {
    reject_clauses(
        query,
        BACKEND,
        &[
            Clause::Join,
            Clause::GroupBy,
            Clause::Having,
            Clause::Aggregate,
            Clause::Distinct,
            Clause::Returning,
        ],
    )?;

    let mut out = MongoQuery::new(query.table(), MongoOperation::Find);
    out.filter = root_filter(query.filter_tree())?;

    let mut options = Map::new();
    if !query.columns().is_empty() {
        let projection: Map<String, Json> = query
            .columns()
            .iter()
            .map(|p| (p.output_name(), json!(1)))
            .collect();
        options.insert("projection".to_string(), Json::Object(projection));
    }
    if !query.order().is_empty() {
        options.insert("sort".to_string(), sort_pairs(query));
    }
    if let Some(n) = query.offset_value() {
        options.insert("skip".to_string(), json!(n));
    }
    if let Some(n) = query.limit_value() {
        options.insert("limit".to_string(), json!(n));
    }
    out.options = Json::Object(options);
    Ok(out)
}

/// Lower a query to an aggregation pipeline.
///
/// Stage order follows SQL evaluation order: `$lookup`/`$unwind` (joins),
/// `$match` (WHERE), `$group`, `$project`, `$match` (HAVING), `$sort`,
/// `$skip`, `$limit`. Inner joins unwind strictly, left joins keep rows
/// without a match; right and full joins are rejected.
pub fn build_pipeline(query: &Query) -> Result<MongoQuery> {
    query.validate()?;
    if query.action() != Action::Select {
        return Err(OnedbError::unsupported(
            format!("{} in aggregation pipeline", query.action()),
            BACKEND,
        ));
    }
    reject_clauses(query, BACKEND, &[Clause::Returning])?;

    let mut stages = Vec::new();
    for join in query.joins() {
        let preserve = match join.kind {
            JoinKind::Inner => false,
            JoinKind::Left => true,
            other => {
                return Err(OnedbError::unsupported(other.sql_keyword(), BACKEND));
            }
        };
        let local = strip_table(&join.left, query.table());
        let foreign = strip_table(&join.right, &join.table);
        stages.push(json!({
            "$lookup": {
                "from": join.table,
                "localField": local,
                "foreignField": foreign,
                "as": join.table,
            }
        }));
        stages.push(json!({
            "$unwind": {
                "path": format!("${}", join.table),
                "preserveNullAndEmptyArrays": preserve,
            }
        }));
    }

    if let Some(filter) = query.filter_tree() {
        stages.push(json!({ "$match": lower_predicate(filter)? }));
    }

    let grouped = !query.group_by_columns().is_empty() || query.has_aggregates();
    if grouped {
        stages.extend(group_stages(query)?);
    } else if query.is_distinct() {
        if query.columns().is_empty() {
            return Err(OnedbError::unsupported("DISTINCT *", BACKEND));
        }
        let id: Map<String, Json> = query
            .columns()
            .iter()
            .map(|p| {
                let name = p.output_name();
                (field_key(&name), json!(format!("${}", name)))
            })
            .collect();
        stages.push(json!({ "$group": { "_id": id } }));
        let mut project = Map::new();
        project.insert("_id".to_string(), json!(0));
        for p in query.columns() {
            let name = p.output_name();
            project.insert(name.clone(), json!(format!("$_id.{}", field_key(&name))));
        }
        stages.push(json!({ "$project": project }));
    } else if !query.columns().is_empty() {
        let projection: Map<String, Json> = query
            .columns()
            .iter()
            .map(|p| (p.output_name(), json!(1)))
            .collect();
        stages.push(json!({ "$project": projection }));
    }

    if !query.order().is_empty() {
        let sort: Map<String, Json> = query
            .order()
            .iter()
            .map(|o| (o.column.clone(), json!(o.order.as_sign())))
            .collect();
        stages.push(json!({ "$sort": sort }));
    }
    if let Some(n) = query.offset_value() {
        stages.push(json!({ "$skip": n }));
    }
    if let Some(n) = query.limit_value() {
        stages.push(json!({ "$limit": n }));
    }

    let mut out = MongoQuery::new(query.table(), MongoOperation::Aggregate);
    out.pipeline = stages;
    Ok(out)
}

fn group_stages(query: &Query) -> Result<Vec<Json>> {
    let keys = query.group_by_columns();
    let id = match keys {
        [] => Json::Null,
        [single] => json!(format!("${}", single)),
        many => Json::Object(
            many.iter()
                .map(|k| (field_key(k), json!(format!("${}", k))))
                .collect(),
        ),
    };

    let mut group = Map::new();
    group.insert("_id".to_string(), id);
    let mut project = Map::new();
    project.insert("_id".to_string(), json!(0));
    match keys {
        [] => {}
        [single] => {
            project.insert(single.clone(), json!("$_id"));
        }
        many => {
            for k in many {
                project.insert(k.clone(), json!(format!("$_id.{}", field_key(k))));
            }
        }
    }

    // Aggregate expression text (`COUNT(*)`) -> output field, for HAVING.
    let mut aliases = BTreeMap::new();
    for p in query.columns() {
        match p {
            Projection::Aggregate { func, column, .. } => {
                let name = p.output_name();
                group.insert(field_key(&name), accumulator(*func, column.as_deref()));
                project.insert(name.clone(), json!(format!("${}", field_key(&name))));
                aliases.insert(
                    format!("{}({})", func, column.as_deref().unwrap_or("*")),
                    name,
                );
            }
            Projection::Column(c) if !keys.contains(c) => {
                return Err(OnedbError::invalid_query(format!(
                    "column '{}' must appear in GROUP BY or be aggregated",
                    c
                )));
            }
            Projection::Column(_) => {}
        }
    }

    let mut stages = vec![json!({ "$group": group }), json!({ "$project": project })];
    if let Some(having) = query.having_tree() {
        let renamed = rename_columns(having, &aliases);
        stages.push(json!({ "$match": lower_predicate(&renamed)? }));
    }
    Ok(stages)
}

fn accumulator(func: AggregateFunc, column: Option<&str>) -> Json {
    match (func, column) {
        (AggregateFunc::Count, None) => json!({ "$sum": 1 }),
        (AggregateFunc::Count, Some(c)) => json!({
            "$sum": { "$cond": [{ "$eq": [{ "$ifNull": [format!("${}", c), null] }, null] }, 0, 1] }
        }),
        (f, Some(c)) => json!({ f.mongo_accumulator(): format!("${}", c) }),
        (f, None) => json!({ f.mongo_accumulator(): 1 }),
    }
}

fn rename_columns(predicate: &Predicate, aliases: &BTreeMap<String, String>) -> Predicate {
    let rename = |c: &String| aliases.get(c).cloned().unwrap_or_else(|| c.clone());
    match predicate {
        Predicate::Compare { column, op, value } => Predicate::Compare {
            column: rename(column),
            op: *op,
            value: value.clone(),
        },
        Predicate::In {
            column,
            values,
            negated,
        } => Predicate::In {
            column: rename(column),
            values: values.clone(),
            negated: *negated,
        },
        Predicate::Between {
            column,
            low,
            high,
            negated,
        } => Predicate::Between {
            column: rename(column),
            low: low.clone(),
            high: high.clone(),
            negated: *negated,
        },
        Predicate::Null { column, negated } => Predicate::Null {
            column: rename(column),
            negated: *negated,
        },
        Predicate::Like {
            column,
            pattern,
            case_insensitive,
            negated,
        } => Predicate::Like {
            column: rename(column),
            pattern: pattern.clone(),
            case_insensitive: *case_insensitive,
            negated: *negated,
        },
        Predicate::And(children) => {
            Predicate::And(children.iter().map(|c| rename_columns(c, aliases)).collect())
        }
        Predicate::Or(children) => {
            Predicate::Or(children.iter().map(|c| rename_columns(c, aliases)).collect())
        }
        Predicate::Not(inner) => Predicate::Not(Box::new(rename_columns(inner, aliases))),
    }
}

fn root_filter(predicate: Option<&Predicate>) -> Result<Json> {
    match predicate {
        Some(p) => lower_predicate(p),
        None => Ok(Json::Object(Map::new())),
    }
}

/// Lower a predicate tree to a filter document.
///
/// AND merges its children into one document when their keys are disjoint
/// and falls back to `$and` otherwise.
pub fn lower_predicate(predicate: &Predicate) -> Result<Json> {
    Ok(match predicate {
        Predicate::Compare { column, op, value } => match op {
            CompareOp::Eq => json!({ column.as_str(): value.to_json() }),
            other => json!({ column.as_str(): { other.mongo_operator(): value.to_json() } }),
        },
        Predicate::In {
            column,
            values,
            negated,
        } => {
            let op = if *negated { "$nin" } else { "$in" };
            let list: Vec<Json> = values.iter().map(|v| v.to_json()).collect();
            json!({ column.as_str(): { op: list } })
        }
        Predicate::Between {
            column,
            low,
            high,
            negated,
        } => {
            if *negated {
                json!({ "$or": [
                    { column.as_str(): { "$lt": low.to_json() } },
                    { column.as_str(): { "$gt": high.to_json() } },
                ]})
            } else {
                json!({ column.as_str(): { "$gte": low.to_json(), "$lte": high.to_json() } })
            }
        }
        Predicate::Null { column, negated } => {
            json!({ column.as_str(): { "$exists": *negated } })
        }
        Predicate::Like {
            column,
            pattern,
            case_insensitive,
            negated,
        } => {
            let mut regex = Map::new();
            regex.insert("$regex".to_string(), json!(like_to_regex(pattern)));
            if *case_insensitive {
                regex.insert("$options".to_string(), json!("i"));
            }
            if *negated {
                json!({ column.as_str(): { "$not": regex } })
            } else {
                json!({ column.as_str(): regex })
            }
        }
        Predicate::And(children) => {
            let lowered = children
                .iter()
                .map(lower_predicate)
                .collect::<Result<Vec<_>>>()?;
            merge_conjunction(lowered)
        }
        Predicate::Or(children) => {
            let lowered = children
                .iter()
                .map(lower_predicate)
                .collect::<Result<Vec<_>>>()?;
            json!({ "$or": lowered })
        }
        Predicate::Not(inner) => json!({ "$nor": [lower_predicate(inner)?] }),
    })
}

fn merge_conjunction(children: Vec<Json>) -> Json {
    let mut merged = Map::new();
    for child in &children {
        let Json::Object(map) = child else {
            return json!({ "$and": children });
        };
        if map.keys().any(|k| merged.contains_key(k)) {
            return json!({ "$and": children });
        }
        merged.extend(map.clone());
    }
    Json::Object(merged)
}

fn sort_pairs(query: &Query) -> Json {
    Json::Array(
        query
            .order()
            .iter()
            .map(|o| json!([o.column, o.order.as_sign()]))
            .collect(),
    )
}

fn strip_table<'a>(column: &'a str, table: &str) -> &'a str {
    column
        .strip_prefix(table)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(column)
}

/// Field names may not contain dots inside `$group` keys.
fn field_key(name: &str) -> String {
    name.replace('.', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_find_filter_and_options() {
        let q = Query::new("users")
            .and_where("age", ">", 18)
            .where_eq("status", "active")
            .select(["name", "age"])
            .order_by_desc("age")
            .limit(10)
            .offset(20);
        let m = build_mongo(&q).unwrap();
        assert_eq!(m.operation, MongoOperation::Find);
        assert_eq!(m.filter, json!({ "age": { "$gt": 18 }, "status": "active" }));
        assert_eq!(
            m.options,
            json!({
                "projection": { "name": 1, "age": 1 },
                "sort": [["age", -1]],
                "skip": 20,
                "limit": 10
            })
        );
    }

    #[test]
    fn test_or_null_like() {
        let q = Query::new("users")
            .where_null("deleted_at")
            .or_filter(Predicate::ilike("name", "jo%"));
        let m = build_mongo(&q).unwrap();
        assert_eq!(
            m.filter,
            json!({ "$or": [
                { "deleted_at": { "$exists": false } },
                { "name": { "$regex": "^jo.*$", "$options": "i" } }
            ]})
        );
    }

    #[test]
    fn test_conflicting_keys_use_and() {
        let q = Query::new("t").and_where("age", ">", 1).and_where("age", "<", 9);
        let m = build_mongo(&q).unwrap();
        assert_eq!(
            m.filter,
            json!({ "$and": [{ "age": { "$gt": 1 } }, { "age": { "$lt": 9 } }] })
        );
    }

    #[test]
    fn test_join_is_unsupported() {
        let q = Query::new("users").join("orders", "users.id", "orders.user_id");
        let err = build_mongo(&q).unwrap_err();
        assert!(matches!(err, OnedbError::UnsupportedOperation { ref clause, .. } if clause == "JOIN"));
    }

    #[test]
    fn test_pipeline_group_having() {
        let q = Query::new("orders")
            .where_eq("status", "paid")
            .group_by(["customer"])
            .select_aggregate(AggregateFunc::Count, "*", "orders")
            .having("COUNT(*)", ">", 5)
            .order_by_desc("orders");
        let m = build_pipeline(&q).unwrap();
        assert_eq!(m.operation, MongoOperation::Aggregate);
        assert_eq!(
            m.pipeline,
            vec![
                json!({ "$match": { "status": "paid" } }),
                json!({ "$group": { "_id": "$customer", "orders": { "$sum": 1 } } }),
                json!({ "$project": { "_id": 0, "customer": "$_id", "orders": "$orders" } }),
                json!({ "$match": { "orders": { "$gt": 5 } } }),
                json!({ "$sort": { "orders": -1 } }),
            ]
        );
    }

    #[test]
    fn test_pipeline_sort_keeps_priority_order() {
        let q = Query::new("users")
            .distinct()
            .select(["b", "a"])
            .order_by("b")
            .order_by_desc("a");
        let m = build_pipeline(&q).unwrap();

        let keys = |stage: &str, path: &[&str]| -> Vec<String> {
            let mut doc = m.pipeline.iter().find_map(|s| s.get(stage)).unwrap();
            for key in path {
                doc = &doc[*key];
            }
            doc.as_object().unwrap().keys().cloned().collect()
        };
        assert_eq!(keys("$sort", &[]), vec!["b", "a"]);
        assert_eq!(keys("$group", &["_id"]), vec!["b", "a"]);
        assert_eq!(
            serde_json::to_string(m.pipeline.last().unwrap()).unwrap(),
            r#"{"$sort":{"b":1,"a":-1}}"#
        );
    }

    #[test]
    fn test_pipeline_left_join() {
        let q = Query::new("users").left_join("orders", "users.id", "orders.user_id");
        let m = build_pipeline(&q).unwrap();
        assert_eq!(
            m.pipeline[0],
            json!({ "$lookup": {
                "from": "orders", "localField": "id", "foreignField": "user_id", "as": "orders"
            }})
        );
        let right = Query::new("users").right_join("orders", "users.id", "orders.user_id");
        assert!(build_pipeline(&right).is_err());
    }

    #[test]
    fn test_update_and_insert() {
        let q = Query::update("users").set("status", "inactive").where_eq("id", 7);
        let m = build_mongo(&q).unwrap();
        assert_eq!(m.update, Some(json!({ "$set": { "status": "inactive" } })));
        assert_eq!(m.filter, json!({ "id": 7 }));

        let ins = Query::insert_into("users")
            .values(crate::value::record([("name", "John")]));
        let m = build_mongo(&ins).unwrap();
        assert_eq!(m.documents, vec![json!({ "name": "John" })]);
    }
}
