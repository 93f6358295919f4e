//! Grouped aggregate execution.
//!
//! One request becomes one query of the shape
//!
//! ```sql
//! SELECT fk, OP(column) FROM child WHERE fk IN (...) GROUP BY fk
//! ```
//!
//! and one [`AggregateResult`] mapping parent keys to values.

use std::collections::HashMap;

use tracing::debug;

use crate::annotated::Attribute;
use crate::batch::{AggregateOp, AggregateRequest};
use crate::config::EmptyAggregate;
use crate::error::{QueryError, QueryResult};
use crate::filter::{Filter, FilterValue};
use crate::key::RecordKey;
use crate::relations::ResolvedRelation;
use crate::sql::{DatabaseType, quote_identifier};
use crate::traits::BatchEngine;

/// A grouped aggregate over child rows of many parents.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedAggregate {
    /// Child table.
    pub table: String,
    /// Foreign key column on the child table; also the grouping column.
    pub foreign_key: String,
    /// Aggregate function.
    pub op: AggregateOp,
    /// Aggregated column. `None` counts rows.
    pub column: Option<String>,
    /// Parent keys to aggregate for.
    pub parent_ids: Vec<FilterValue>,
    /// Extra conditions on child rows.
    pub filter: Filter,
}

impl GroupedAggregate {
    /// Create a grouped aggregate over a resolved relation.
    pub fn new(
        relation: &ResolvedRelation,
        op: AggregateOp,
        column: Option<&str>,
        parent_ids: Vec<FilterValue>,
    ) -> Self {
        Self {
            table: relation.child_table.clone(),
            foreign_key: relation.foreign_key.clone(),
            op,
            column: column.map(str::to_string),
            parent_ids,
            filter: Filter::None,
        }
    }

    /// Add a condition on child rows.
    pub fn r#where(mut self, filter: impl Into<Filter>) -> Self {
        self.filter = self.filter.and_then(filter.into());
        self
    }

    /// The full WHERE filter: foreign key membership plus extra conditions.
    pub fn where_filter(&self) -> Filter {
        Filter::In(self.foreign_key.clone(), self.parent_ids.clone()).and_then(self.filter.clone())
    }

    /// The aggregate expression, e.g. `COUNT(*)` or `SUM(score)`.
    pub fn aggregate_sql(&self) -> String {
        let target = match &self.column {
            Some(column) => quote_identifier(column),
            None => "*".to_string(),
        };
        format!("{}({})", self.op.sql_function(), target)
    }

    /// Build the SQL query.
    pub fn to_sql(&self, db: DatabaseType) -> (String, Vec<FilterValue>) {
        let (where_sql, params) = self.where_filter().to_sql(0, db);
        let fk = quote_identifier(&self.foreign_key);
        let sql = format!(
            "SELECT {}, {} FROM {} WHERE {} GROUP BY {}",
            fk,
            self.aggregate_sql(),
            quote_identifier(&self.table),
            where_sql,
            fk
        );
        (sql, params)
    }
}

/// Aggregate values per parent key.
#[derive(Debug, Clone)]
pub struct AggregateResult {
    op: AggregateOp,
    empty: EmptyAggregate,
    values: HashMap<RecordKey, FilterValue>,
}

impl AggregateResult {
    /// Number of parents that had at least one child row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no parent had any child row.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The raw value for a parent, without defaults.
    pub fn get(&self, key: &RecordKey) -> Option<&FilterValue> {
        self.values.get(key)
    }

    /// The attribute to bind on a parent.
    ///
    /// Parents without child rows get 0, except that min, max and avg are
    /// [`Attribute::Absent`] under [`EmptyAggregate::Absent`].
    pub fn attribute_for(&self, key: &RecordKey) -> Attribute {
        match self.values.get(key) {
            Some(value) => Attribute::Value(value.clone()),
            None if self.empty == EmptyAggregate::Absent && self.op.undefined_on_empty() => {
                Attribute::Absent
            }
            None => Attribute::Value(FilterValue::Int(0)),
        }
    }
}

/// Runs one grouped aggregate.
#[derive(Debug, Clone)]
pub struct AggregateExecutor {
    attribute: String,
    query: GroupedAggregate,
    empty: EmptyAggregate,
}

impl AggregateExecutor {
    /// Validate a request and prepare its query. Nothing runs yet.
    pub fn prepare(
        attribute: &str,
        request: &AggregateRequest,
        relation: &ResolvedRelation,
        parent_ids: Vec<FilterValue>,
        empty: EmptyAggregate,
    ) -> QueryResult<Self> {
        let column = request.column.as_deref().filter(|c| !c.is_empty());
        if request.op.requires_column() && column.is_none() {
            return Err(QueryError::invalid_aggregate(
                attribute,
                format!("`{}` needs a column to aggregate", request.op),
            )
            .with_association(request.association.as_str()));
        }

        Ok(Self {
            attribute: attribute.to_string(),
            query: GroupedAggregate::new(relation, request.op, column, parent_ids),
            empty,
        })
    }

    /// The attribute this executor fills.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// The prepared query.
    pub fn query(&self) -> &GroupedAggregate {
        &self.query
    }

    /// Run the query. Exactly one engine call.
    pub async fn execute<E: BatchEngine + ?Sized>(
        &self,
        engine: &E,
        db: DatabaseType,
    ) -> QueryResult<AggregateResult> {
        if tracing::enabled!(tracing::Level::DEBUG) {
            let (sql, params) = self.query.to_sql(db);
            debug!(
                attribute = %self.attribute,
                table = %self.query.table,
                parents = self.query.parent_ids.len(),
                params = params.len(),
                sql = %sql,
                "Executing grouped aggregate"
            );
        }

        let rows = engine.aggregate_grouped(&self.query).await?;

        Ok(AggregateResult {
            op: self.query.op,
            empty: self.empty,
            values: rows.into_iter().collect(),
        })
    }
}
