//! In-memory [`BatchEngine`].
//!
//! Evaluates grouped aggregates and keyed lookups over tables of
//! [`Record`]s held in memory, and logs every query it receives. Used by
//! tests, benchmarks and documentation.
//!
//! ```rust
//! use prebatch_query::Record;
//! use prebatch_query::memory::MemoryEngine;
//!
//! let engine = MemoryEngine::new();
//! engine.insert("comments", vec![Record::new().with("post_id", 1)]);
//!
//! assert_eq!(engine.row_count("comments"), 1);
//! assert_eq!(engine.query_count(), 0);
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use crate::batch::AggregateOp;
use crate::error::{QueryError, QueryResult};
use crate::filter::FilterValue;
use crate::key::RecordKey;
use crate::operations::{GroupedAggregate, LookupQuery};
use crate::row::Record;
use crate::sql::DatabaseType;
use crate::traits::BatchEngine;

/// Kind of a logged query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// A grouped aggregate.
    Aggregate,
    /// A keyed lookup.
    Lookup,
}

/// One query received by a [`MemoryEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueryLogEntry {
    /// Query kind.
    pub kind: QueryKind,
    /// Target table.
    pub table: String,
    /// Rendered SQL.
    pub sql: String,
    /// Bound parameters.
    pub params: Vec<FilterValue>,
}

/// In-memory tables plus a query log.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    tables: RwLock<HashMap<String, Vec<Record>>>,
    log: Mutex<Vec<QueryLogEntry>>,
    failure: Mutex<Option<String>>,
    database: DatabaseType,
}

impl MemoryEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Render logged SQL in another dialect.
    pub fn with_database(mut self, database: DatabaseType) -> Self {
        self.database = database;
        self
    }

    /// Append rows to a table, creating it if needed.
    pub fn insert(&self, table: &str, rows: impl IntoIterator<Item = Record>) {
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    /// Number of rows in a table.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, Vec::len)
    }

    /// Make every following query fail with a database error.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    /// Stop failing queries.
    pub fn clear_failure(&self) {
        *self.failure.lock() = None;
    }

    /// Number of queries received so far, failed ones included.
    pub fn query_count(&self) -> usize {
        self.log.lock().len()
    }

    /// Queries received so far.
    pub fn queries(&self) -> Vec<QueryLogEntry> {
        self.log.lock().clone()
    }

    /// Forget logged queries.
    pub fn reset_log(&self) {
        self.log.lock().clear();
    }

    fn record(&self, kind: QueryKind, table: &str, (sql, params): (String, Vec<FilterValue>)) {
        self.log.lock().push(QueryLogEntry {
            kind,
            table: table.to_string(),
            sql,
            params,
        });
    }

    fn check_failure(&self) -> QueryResult<()> {
        match self.failure.lock().as_ref() {
            Some(message) => Err(QueryError::database(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BatchEngine for MemoryEngine {
    async fn aggregate_grouped(
        &self,
        query: &GroupedAggregate,
    ) -> QueryResult<Vec<(RecordKey, FilterValue)>> {
        self.record(QueryKind::Aggregate, &query.table, query.to_sql(self.database));
        self.check_failure()?;

        let filter = query.where_filter();
        let tables = self.tables.read();
        let mut groups: IndexMap<RecordKey, Vec<&Record>> = IndexMap::new();

        for row in tables.get(&query.table).into_iter().flatten() {
            if !filter.matches(row) {
                continue;
            }
            if let Some(key) = row.get(&query.foreign_key).and_then(RecordKey::from_value) {
                groups.entry(key).or_default().push(row);
            }
        }

        Ok(groups
            .into_iter()
            .map(|(key, rows)| {
                let value = match &query.column {
                    Some(column) => {
                        let values: Vec<&FilterValue> = rows
                            .iter()
                            .filter_map(|row| row.get(column))
                            .filter(|v| !v.is_null())
                            .collect();
                        fold(query.op, &values)
                    }
                    None => FilterValue::Int(rows.len() as i64),
                };
                (key, value)
            })
            .collect())
    }

    async fn find_in(&self, query: &LookupQuery) -> QueryResult<Vec<Record>> {
        self.record(QueryKind::Lookup, &query.table, query.to_sql(self.database));
        self.check_failure()?;

        let filter = query.filter();
        let tables = self.tables.read();
        Ok(tables
            .get(&query.table)
            .into_iter()
            .flatten()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }
}

/// Apply an aggregate to the non-null column values of one group.
fn fold(op: AggregateOp, values: &[&FilterValue]) -> FilterValue {
    match op {
        AggregateOp::Count => FilterValue::Int(values.len() as i64),
        AggregateOp::Sum => sum(values).unwrap_or(FilterValue::Null),
        AggregateOp::Avg => match sum(values).and_then(|s| s.as_f64()) {
            Some(total) if !values.is_empty() => FilterValue::Float(total / values.len() as f64),
            _ => FilterValue::Null,
        },
        AggregateOp::Min => extreme(values, std::cmp::Ordering::Less),
        AggregateOp::Max => extreme(values, std::cmp::Ordering::Greater),
    }
}

fn sum(values: &[&FilterValue]) -> Option<FilterValue> {
    if values.is_empty() {
        return None;
    }
    if values.iter().all(|v| v.as_i64().is_some()) {
        return Some(FilterValue::Int(values.iter().filter_map(|v| v.as_i64()).sum()));
    }
    let mut total = 0.0;
    for value in values {
        total += value.as_f64()?;
    }
    Some(FilterValue::Float(total))
}

fn extreme(values: &[&FilterValue], wanted: std::cmp::Ordering) -> FilterValue {
    let mut best: Option<&FilterValue> = None;
    for &value in values {
        best = match best {
            Some(current) if value.compare(current) != Some(wanted) => Some(current),
            _ => Some(value),
        };
    }
    best.cloned().unwrap_or(FilterValue::Null)
}
