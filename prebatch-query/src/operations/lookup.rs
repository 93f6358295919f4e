//! Keyed lookup execution.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::annotated::Attribute;
use crate::batch::{Cardinality, LookupRequest};
use crate::error::QueryResult;
use crate::filter::{Filter, FilterValue};
use crate::key::RecordKey;
use crate::row::Record;
use crate::sql::{DatabaseType, quote_identifier};
use crate::traits::BatchEngine;

/// Fetch rows of a table whose key column is in a key list.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupQuery {
    /// Target table.
    pub table: String,
    /// Column matched against `keys`.
    pub key_column: String,
    /// Distinct lookup keys.
    pub keys: Vec<FilterValue>,
    /// Extra conditions on target rows.
    pub scope: Filter,
}

impl LookupQuery {
    /// The full WHERE filter.
    pub fn filter(&self) -> Filter {
        Filter::In(self.key_column.clone(), self.keys.clone()).and_then(self.scope.clone())
    }

    /// Build the SQL query.
    pub fn to_sql(&self, db: DatabaseType) -> (String, Vec<FilterValue>) {
        let (where_sql, params) = self.filter().to_sql(0, db);
        let sql = format!(
            "SELECT * FROM {} WHERE {}",
            quote_identifier(&self.table),
            where_sql
        );
        (sql, params)
    }
}

/// Lookup rows grouped by key.
#[derive(Debug, Clone)]
pub struct LookupResult {
    cardinality: Cardinality,
    rows: HashMap<RecordKey, Vec<Record>>,
}

impl LookupResult {
    /// Rows found for a key, in store order.
    pub fn rows(&self, key: &RecordKey) -> &[Record] {
        self.rows.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of keys with at least one row.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no key matched any row.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The attribute to bind on a parent whose lookup key is `key`.
    pub fn attribute_for(&self, key: Option<&RecordKey>) -> Attribute {
        let rows = key.map(|k| self.rows(k)).unwrap_or_default();
        match self.cardinality {
            Cardinality::One => Attribute::One(rows.first().cloned()),
            Cardinality::Many => Attribute::Many(rows.to_vec()),
        }
    }
}

/// Runs one keyed lookup.
#[derive(Debug, Clone)]
pub struct LookupExecutor {
    attribute: String,
    query: LookupQuery,
    cardinality: Cardinality,
}

impl LookupExecutor {
    /// Collect the distinct lookup keys of `parents` and prepare the query.
    ///
    /// Keys keep first-seen order. Parents without a key are left out.
    pub fn prepare<M>(attribute: &str, request: &LookupRequest<M>, parents: &[M]) -> Self {
        let mut seen = HashSet::new();
        let keys = parents
            .iter()
            .filter_map(|parent| request.key_for(parent))
            .filter(|key| seen.insert(key.clone()))
            .map(FilterValue::from)
            .collect();

        Self {
            attribute: attribute.to_string(),
            query: LookupQuery {
                table: request.table.clone(),
                key_column: request.key_column.clone(),
                keys,
                scope: request.scope.clone(),
            },
            cardinality: request.cardinality,
        }
    }

    /// The attribute this executor fills.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// The prepared query.
    pub fn query(&self) -> &LookupQuery {
        &self.query
    }

    /// Whether running would reach the engine.
    pub fn needs_query(&self) -> bool {
        !self.query.keys.is_empty()
    }

    /// Run the query and group rows by key.
    ///
    /// With no keys nothing is sent to the engine.
    pub async fn execute<E: BatchEngine + ?Sized>(
        &self,
        engine: &E,
        db: DatabaseType,
    ) -> QueryResult<LookupResult> {
        let mut grouped: HashMap<RecordKey, Vec<Record>> = HashMap::new();

        if !self.needs_query() {
            debug!(attribute = %self.attribute, "No lookup keys, skipping query");
            return Ok(LookupResult {
                cardinality: self.cardinality,
                rows: grouped,
            });
        }

        if tracing::enabled!(tracing::Level::DEBUG) {
            let (sql, params) = self.query.to_sql(db);
            debug!(
                attribute = %self.attribute,
                table = %self.query.table,
                keys = self.query.keys.len(),
                params = params.len(),
                sql = %sql,
                "Executing keyed lookup"
            );
        }

        for row in engine.find_in(&self.query).await? {
            let Some(key) = row.get(&self.query.key_column).and_then(RecordKey::from_value) else {
                warn!(
                    attribute = %self.attribute,
                    table = %self.query.table,
                    column = %self.query.key_column,
                    "Skipping lookup row without a usable key"
                );
                continue;
            };
            grouped.entry(key).or_default().push(row);
        }

        Ok(LookupResult {
            cardinality: self.cardinality,
            rows: grouped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEngine;
    use pretty_assertions::assert_eq;

    struct Post {
        author_id: Option<i64>,
    }

    fn engine() -> MemoryEngine {
        let engine = MemoryEngine::new();
        engine.insert(
            "profiles",
            vec![
                Record::new().with("user_id", 1).with("bio", "first"),
                Record::new().with("user_id", 1).with("bio", "second"),
                Record::new().with("user_id", 2).with("bio", "only"),
                Record::new().with("user_id", FilterValue::Null).with("bio", "orphan"),
            ],
        );
        engine
    }

    fn posts() -> Vec<Post> {
        vec![
            Post { author_id: Some(1) },
            Post { author_id: Some(2) },
            Post { author_id: Some(1) },
            Post { author_id: None },
        ]
    }

    #[test]
    fn test_prepare_distinct_keys_in_order() {
        let request =
            LookupRequest::many("profiles", "user_id", |p: &Post| p.author_id.map(RecordKey::Int));
        let executor = LookupExecutor::prepare("profiles", &request, &posts());

        assert_eq!(executor.query().keys, vec![FilterValue::Int(1), FilterValue::Int(2)]);
        let (sql, _) = executor.query().to_sql(DatabaseType::PostgreSQL);
        assert_eq!(sql, "SELECT * FROM profiles WHERE user_id IN ($1, $2)");
    }

    #[test]
    fn test_reserved_key_column_is_quoted() {
        let request =
            LookupRequest::one("users", "user", |p: &Post| p.author_id.map(RecordKey::Int));
        let executor = LookupExecutor::prepare("owner", &request, &posts());

        let (sql, _) = executor.query().to_sql(DatabaseType::MySQL);
        assert_eq!(sql, r#"SELECT * FROM users WHERE "user" IN (?, ?)"#);
    }

    #[tokio::test]
    async fn test_one_takes_first_row_in_store_order() {
        let engine = engine();
        let request =
            LookupRequest::one("profiles", "user_id", |p: &Post| p.author_id.map(RecordKey::Int));
        let executor = LookupExecutor::prepare("profile", &request, &posts());
        let result = executor
            .execute(&engine, DatabaseType::PostgreSQL)
            .await
            .unwrap();

        assert_eq!(engine.query_count(), 1);
        match result.attribute_for(Some(&RecordKey::Int(1))) {
            Attribute::One(Some(row)) => assert_eq!(row.get_str("bio").unwrap(), "first"),
            other => panic!("unexpected attribute: {:?}", other),
        }
        assert_eq!(result.attribute_for(None), Attribute::One(None));
        assert_eq!(result.attribute_for(Some(&RecordKey::Int(9))), Attribute::One(None));
    }

    #[tokio::test]
    async fn test_many_groups_rows() {
        let engine = engine();
        let request =
            LookupRequest::many("profiles", "user_id", |p: &Post| p.author_id.map(RecordKey::Int))
                .scope(Filter::NotEquals("bio".into(), "second".into()));
        let executor = LookupExecutor::prepare("profiles", &request, &posts());
        let result = executor
            .execute(&engine, DatabaseType::PostgreSQL)
            .await
            .unwrap();

        assert_eq!(result.rows(&RecordKey::Int(1)).len(), 1);
        assert_eq!(result.rows(&RecordKey::Int(2)).len(), 1);
        assert_eq!(result.attribute_for(None), Attribute::Many(Vec::new()));
    }

    #[tokio::test]
    async fn test_no_keys_skips_query() {
        let engine = engine();
        let request =
            LookupRequest::many("profiles", "user_id", |p: &Post| p.author_id.map(RecordKey::Int));
        let parents = vec![Post { author_id: None }];
        let executor = LookupExecutor::prepare("profiles", &request, &parents);

        assert!(!executor.needs_query());
        let result = executor
            .execute(&engine, DatabaseType::PostgreSQL)
            .await
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(engine.query_count(), 0);
    }
}
