//! Adapters: one uniform API over every backend family.
//!
//! An [`Adapter`] is bound to one descriptor and owns its connection pool.
//! The backend-specific half is a [`Backend`] (query translation,
//! transaction statements, introspection, error tables); native I/O goes
//! through a [`Driver`].

pub mod backend;
pub mod column_store;
pub mod document;
pub mod graph;
pub mod key_value;
pub mod relational;
pub mod search;

use std::fmt;
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{debug, info};

use crate::ast::{AggregateFunc, OrderBy, Predicate, Query, SortOrder};
use crate::descriptor::Descriptor;
use crate::error::{Details, OnedbError, Result};
use crate::native::{Driver, Introspection};
use crate::pool::{Pool, PoolConfig, PoolStats};
use crate::result::{QueryResult, Row};
use crate::session::Session;
use crate::transaction::TransactionGuard;
use crate::value::{Record, Value};

pub use backend::Backend;

/// Backend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AdapterKind {
    Relational,
    Document,
    KeyValue,
    Graph,
    ColumnStore,
    Search,
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdapterKind::Relational => "relational",
            AdapterKind::Document => "document",
            AdapterKind::KeyValue => "key_value",
            AdapterKind::Graph => "graph",
            AdapterKind::ColumnStore => "column_store",
            AdapterKind::Search => "search",
        };
        f.write_str(name)
    }
}

/// What a backend can do natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Capabilities {
    pub sql: bool,
    pub transactions: bool,
    pub savepoints: bool,
    pub joins: bool,
    pub aggregation_pipeline: bool,
    pub schema_introspection: bool,
}

/// Arguments for [`Adapter::find`].
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Empty means every column.
    pub columns: Vec<String>,
    pub filter: Option<Predicate>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl FindOptions {
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.order_by.push(OrderBy {
            column: column.into(),
            order,
        });
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter = Some(predicate);
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

    fn into_query(self, table: &str) -> Query {
        let mut query = Query::new(table);
        if !self.columns.is_empty() {
            query = query.select(self.columns);
        }
        if let Some(predicate) = self.filter {
            query = query.filter(predicate);
        }
        for order in self.order_by {
            query = query.sort(order.column, order.order);
        }
        if let Some(n) = self.limit {
            query = query.limit(n);
        }
        if let Some(n) = self.offset {
            query = query.offset(n);
        }
        query
    }
}

/// One column as reported by schema introspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
}

impl ColumnInfo {
    fn from_row(row: &Row) -> Self {
        let text = |name: &str| match row.get(name) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.to_plain_string()),
        };
        Self {
            name: text("name")
                .or_else(|| row.get_index(0).map(Value::to_plain_string))
                .unwrap_or_default(),
            data_type: text("data_type").unwrap_or_default(),
            nullable: match row.get("nullable") {
                Some(Value::Bool(b)) => *b,
                Some(Value::Int(n)) => *n != 0,
                Some(Value::String(s)) => matches!(s.as_str(), "YES" | "Y" | "1" | "true"),
                _ => true,
            },
            default_value: text("default_value"),
        }
    }
}

/// Snapshot describing an adapter, for logs and dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterInfo {
    pub scheme: String,
    pub kind: AdapterKind,
    pub capabilities: Capabilities,
    pub host: String,
    pub database: String,
    pub connected: bool,
}

/// Uniform client for one database.
pub struct Adapter {
    backend: Arc<dyn Backend>,
    driver: Arc<dyn Driver>,
    descriptor: Descriptor,
    pool_config: PoolConfig,
    pool: RwLock<Option<Pool>>,
}

impl Adapter {
    /// Bind a backend and driver to a descriptor. Nothing is opened until
    /// [`connect`](Adapter::connect).
    pub fn new(
        backend: Arc<dyn Backend>,
        driver: Arc<dyn Driver>,
        descriptor: Descriptor,
        pool_config: PoolConfig,
    ) -> Result<Self> {
        pool_config.validate()?;
        Ok(Self {
            backend,
            driver,
            descriptor,
            pool_config,
            pool: RwLock::new(None),
        })
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn kind(&self) -> AdapterKind {
        self.backend.kind()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.backend.capabilities()
    }

    fn current_pool(&self) -> Option<Pool> {
        self.pool
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn pool(&self) -> Result<Pool> {
        self.current_pool()
            .filter(|pool| !pool.is_closed())
            .ok_or_else(|| {
                OnedbError::connection("adapter is not connected")
                    .with_detail("host", self.descriptor.host())
                    .with_detail("database", self.descriptor.database())
            })
    }

    /// Build the pool and open `max(min_size, 1)` connections. A no-op when
    /// already connected. When two calls race, the pool installed first
    /// wins and the other is closed.
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        let pool = Pool::new(
            self.driver.clone(),
            self.descriptor.clone(),
            self.pool_config.clone(),
            self.backend.error_mapper(),
        )?;
        pool.materialize(self.pool_config.min_size.max(1)).await?;
        let lost_race = {
            let mut slot = self.pool.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            match slot.as_ref() {
                Some(current) if !current.is_closed() => true,
                _ => {
                    *slot = Some(pool.clone());
                    false
                }
            }
        };
        if lost_race {
            debug!(target_db = %self.descriptor, "already connected, closing redundant pool");
            pool.close().await;
            return Ok(());
        }
        info!(backend = self.backend.name(), target_db = %self.descriptor, "connected");
        Ok(())
    }

    /// Close the pool. Leases still out are discarded when they come back.
    pub async fn disconnect(&self) {
        let pool = self
            .pool
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(pool) = pool {
            pool.close().await;
            info!(backend = self.backend.name(), target_db = %self.descriptor, "disconnected");
        }
    }

    pub async fn reconnect(&self) -> Result<()> {
        self.disconnect().await;
        self.connect().await
    }

    pub fn is_connected(&self) -> bool {
        self.current_pool().is_some_and(|pool| !pool.is_closed())
    }

    /// Whether the backend answers within the ping timeout. Never errors.
    pub async fn ping(&self) -> bool {
        let check = async {
            match self.session().await {
                Ok(mut session) => session.ping().await,
                Err(_) => false,
            }
        };
        tokio::time::timeout(self.pool_config.ping_timeout, check)
            .await
            .unwrap_or(false)
    }

    /// Lease a connection for several statements in a row.
    pub async fn session(&self) -> Result<Session> {
        let lease = self.pool()?.acquire().await?;
        Ok(Session::new(lease, self.backend.clone()))
    }

    /// Run backend-native query text.
    pub async fn execute(&self, raw: &str, params: Vec<Value>) -> Result<QueryResult> {
        self.session().await?.execute(raw, params).await
    }

    pub async fn execute_query(&self, query: &Query) -> Result<QueryResult> {
        self.session().await?.execute_query(query).await
    }

    pub async fn fetch_all(&self, query: &Query) -> Result<Vec<Row>> {
        Ok(self.execute_query(query).await?.rows)
    }

    pub async fn fetch_one(&self, query: &Query) -> Result<Option<Row>> {
        self.session().await?.fetch_one(query).await
    }

    /// First column of the first row.
    pub async fn fetch_scalar(&self, query: &Query) -> Result<Option<Value>> {
        Ok(self.fetch_one(query).await?.and_then(|row| row.get_index(0).cloned()))
    }

    /// Insert one record. `last_id` is the native last-insert id, or the
    /// returned id column on backends that report ids through RETURNING.
    pub async fn insert(&self, table: &str, record: Record) -> Result<QueryResult> {
        let query = Query::insert_into(table).values(record);
        let mut result = self.execute_query(&query).await?;
        if result.last_id.is_none() {
            if let Some(column) = self.backend.returning_id_column() {
                result.last_id = result.first().and_then(|row| row.get(column)).cloned();
            }
        }
        Ok(result)
    }

    pub async fn insert_many(&self, table: &str, records: Vec<Record>) -> Result<QueryResult> {
        if records.is_empty() {
            return Ok(QueryResult::default());
        }
        let query = Query::insert_into(table).values_many(records);
        self.execute_query(&query).await
    }

    /// Update the rows matching `filter` (all rows when `None`).
    pub async fn update(
        &self,
        table: &str,
        data: Record,
        filter: Option<Predicate>,
    ) -> Result<QueryResult> {
        let mut query = Query::update(table).set_all(data);
        if let Some(predicate) = filter {
            query = query.filter(predicate);
        }
        self.execute_query(&query).await
    }

    /// Delete the rows matching `filter` (all rows when `None`).
    pub async fn delete(&self, table: &str, filter: Option<Predicate>) -> Result<QueryResult> {
        let mut query = Query::delete_from(table);
        if let Some(predicate) = filter {
            query = query.filter(predicate);
        }
        self.execute_query(&query).await
    }

    pub async fn find(&self, table: &str, options: FindOptions) -> Result<Vec<Row>> {
        self.fetch_all(&options.into_query(table)).await
    }

    pub async fn find_one(&self, table: &str, filter: Option<Predicate>) -> Result<Option<Row>> {
        let options = FindOptions {
            filter,
            ..FindOptions::default()
        };
        self.fetch_one(&options.into_query(table)).await
    }

    pub async fn count(&self, table: &str, filter: Option<Predicate>) -> Result<u64> {
        let mut query = Query::new(table).select_aggregate(AggregateFunc::Count, "*", "count");
        if let Some(predicate) = filter {
            query = query.filter(predicate);
        }
        let result = self.execute_query(&query).await?;
        let value = result
            .first()
            .and_then(|row| row.get("count").or_else(|| row.get_index(0)));
        Ok(match value {
            Some(Value::Int(n)) => (*n).max(0) as u64,
            Some(Value::Float(f)) => f.max(0.0) as u64,
            Some(Value::String(s)) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| non_numeric_count(table, s.clone()))?,
            Some(Value::Json(n)) if n.is_number() => n.as_f64().unwrap_or(0.0).max(0.0) as u64,
            Some(Value::Null) | None => 0,
            Some(other) => return Err(non_numeric_count(table, other.to_plain_string())),
        })
    }

    pub async fn get_tables(&self) -> Result<Vec<String>> {
        let request = self.backend.introspect(&Introspection::Tables)?;
        let result = self.session().await?.execute_native(&request).await?;
        Ok(result
            .iter()
            .filter_map(|row| row.get("name").or_else(|| row.get_index(0)))
            .map(Value::to_plain_string)
            .collect())
    }

    pub async fn get_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let request = self.backend.introspect(&Introspection::Columns {
            table: table.to_string(),
        })?;
        let result = self.session().await?.execute_native(&request).await?;
        Ok(result.iter().map(ColumnInfo::from_row).collect())
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self
            .get_tables()
            .await?
            .iter()
            .any(|name| name.eq_ignore_ascii_case(table)))
    }

    /// Lease a connection and open a transaction on it.
    pub async fn begin(&self) -> Result<TransactionGuard> {
        self.session().await?.into_transaction().await
    }

    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
    /// A failed rollback is attached to the original error, never replaces
    /// it.
    ///
    /// ```ignore
    /// let id = adapter
    ///     .transaction(|s| Box::pin(async move {
    ///         s.execute_query(&Query::insert_into("users").values(row)).await?;
    ///         Ok(42)
    ///     }))
    ///     .await?;
    /// ```
    pub async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        T: Send,
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, Result<T>>,
    {
        let mut guard = self.begin().await?;
        let outcome = f(&mut *guard).await;
        match outcome {
            Ok(value) => {
                guard.commit().await?;
                Ok(value)
            }
            Err(e) => match guard.rollback().await {
                Ok(()) => Err(e),
                Err(rollback) => Err(e.with_rollback_failure(rollback)),
            },
        }
    }

    pub fn info(&self) -> AdapterInfo {
        AdapterInfo {
            scheme: self.descriptor.scheme().to_string(),
            kind: self.backend.kind(),
            capabilities: self.backend.capabilities(),
            host: self.descriptor.host().to_string(),
            database: self.descriptor.database().to_string(),
            connected: self.is_connected(),
        }
    }

    /// `None` before `connect`.
    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.current_pool().map(|pool| pool.stats())
    }

    pub fn pool_config(&self) -> &PoolConfig {
        &self.pool_config
    }
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("backend", &self.backend.name())
            .field("driver", &self.driver.name())
            .field("descriptor", &self.descriptor.redacted())
            .field("connected", &self.is_connected())
            .finish()
    }
}

fn non_numeric_count(table: &str, value: String) -> OnedbError {
    OnedbError::Query {
        message: format!("count returned a non-numeric value '{}'", value),
        details: Details::from([
            ("table".to_string(), table.to_string()),
            ("value".to_string(), value),
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_options_build_query() {
        let options = FindOptions::default()
            .columns(["id", "name"])
            .order_by("id", SortOrder::Desc)
            .filter(Predicate::eq("active", true))
            .limit(10)
            .offset(20);
        let (sql, params) = options
            .into_query("users")
            .to_sql(crate::transpiler::PlaceholderStyle::Question)
            .unwrap();
        assert_eq!(
            sql,
            "SELECT id, name FROM users WHERE active = ? ORDER BY id DESC LIMIT 10 OFFSET 20"
        );
        assert_eq!(params, vec![Value::Bool(true)]);
    }

    #[test]
    fn test_column_info_from_row() {
        let columns = Arc::new(vec![
            "name".to_string(),
            "data_type".to_string(),
            "nullable".to_string(),
            "default_value".to_string(),
        ]);
        let row = Row::new(
            columns,
            vec![Value::from("id"), Value::from("INTEGER"), Value::Int(0), Value::Null],
        );
        assert_eq!(
            ColumnInfo::from_row(&row),
            ColumnInfo {
                name: "id".into(),
                data_type: "INTEGER".into(),
                nullable: false,
                default_value: None,
            }
        );
    }
}
