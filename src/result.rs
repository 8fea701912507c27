//! Canonical query results.
//!
//! Every native reply, whatever its shape, is normalized into a
//! [`QueryResult`]: rows with a shared column list, the affected-row count,
//! the last inserted id and the execution time.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::native::NativeResponse;
use crate::value::{Record, Value};

/// One result row. Column names are shared by every row of a result.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<Vec<String>>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| self.values.get(i))
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_record(&self) -> Record {
        self.columns
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.columns
                .iter()
                .zip(&self.values)
                .map(|(c, v)| (c.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (c, v) in self.columns.iter().zip(&self.values) {
            map.serialize_entry(c, v)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub affected_rows: u64,
    /// Backend-defined: an integer rowid, a returned primary key, a document id.
    pub last_id: Option<Value>,
    pub columns: Vec<String>,
    pub duration: Duration,
}

impl QueryResult {
    /// Normalize a native reply.
    pub fn from_native(response: NativeResponse, duration: Duration) -> Self {
        match response {
            NativeResponse::Rows {
                columns,
                rows,
                affected,
                last_id,
            } => {
                let shared = Arc::new(columns.clone());
                QueryResult {
                    rows: rows
                        .into_iter()
                        .map(|values| Row::new(shared.clone(), values))
                        .collect(),
                    affected_rows: affected,
                    last_id,
                    columns,
                    duration,
                }
            }
            NativeResponse::Documents(docs) => {
                // Union of keys in first-seen order.
                let mut seen = BTreeSet::new();
                let mut columns = Vec::new();
                for doc in &docs {
                    for key in doc.keys() {
                        if seen.insert(key.as_str()) {
                            columns.push(key.clone());
                        }
                    }
                }
                let shared = Arc::new(columns.clone());
                let rows = docs
                    .iter()
                    .map(|doc| {
                        let values = columns
                            .iter()
                            .map(|c| doc.get(c).cloned().unwrap_or(Value::Null))
                            .collect();
                        Row::new(shared.clone(), values)
                    })
                    .collect();
                QueryResult {
                    rows,
                    columns,
                    duration,
                    ..Default::default()
                }
            }
            NativeResponse::Values(values) => {
                let columns = vec!["value".to_string()];
                let shared = Arc::new(columns.clone());
                QueryResult {
                    rows: values
                        .into_iter()
                        .map(|v| Row::new(shared.clone(), vec![v]))
                        .collect(),
                    columns,
                    duration,
                    ..Default::default()
                }
            }
            NativeResponse::Ack { affected, last_id } => QueryResult {
                affected_rows: affected,
                last_id,
                duration,
                ..Default::default()
            },
        }
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// First column of the first row.
    pub fn scalar(&self) -> Option<&Value> {
        self.first().and_then(|r| r.get_index(0))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Every row's value for one column (`Null` where absent).
    pub fn column_values(&self, name: &str) -> Vec<Value> {
        self.rows
            .iter()
            .map(|r| r.get(name).cloned().unwrap_or(Value::Null))
            .collect()
    }

    pub fn to_records(&self) -> Vec<Record> {
        self.rows.iter().map(Row::to_record).collect()
    }
}

impl IntoIterator for QueryResult {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
