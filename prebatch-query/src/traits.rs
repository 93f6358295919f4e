//! Collaborator traits: parent models, the query engine, and parent sources.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::QueryResult;
use crate::filter::FilterValue;
use crate::key::RecordKey;
use crate::operations::{GroupedAggregate, LookupQuery};
use crate::row::Record;

/// A parent entity that can be annotated with derived attributes.
pub trait Model: Send + Sync {
    /// The name of the model, as used for relation lookup.
    const MODEL_NAME: &'static str;

    /// The database table name.
    const TABLE_NAME: &'static str;

    /// The primary key column.
    const PRIMARY_KEY: &'static str;

    /// All column names of this model. Derived attributes may not reuse them.
    const COLUMNS: &'static [&'static str];

    /// The stable identity of this record.
    ///
    /// Keys are expected to be unique within a collection. Parents that share
    /// a key receive the same derived values.
    fn key(&self) -> RecordKey;
}

/// Query engine able to run the two grouped query shapes the batcher needs.
///
/// Implementations run exactly one round trip per call. Errors are returned
/// to the caller of `materialize` as-is.
#[async_trait]
pub trait BatchEngine: Send + Sync {
    /// Run a grouped aggregate and return one `(foreign key, value)` pair per
    /// group that has at least one child row.
    async fn aggregate_grouped(
        &self,
        query: &GroupedAggregate,
    ) -> QueryResult<Vec<(RecordKey, FilterValue)>>;

    /// Return every row of the target table whose key column is in the
    /// query's key list and that satisfies its scope.
    async fn find_in(&self, query: &LookupQuery) -> QueryResult<Vec<Record>>;
}

#[async_trait]
impl<E: BatchEngine + ?Sized> BatchEngine for Arc<E> {
    async fn aggregate_grouped(
        &self,
        query: &GroupedAggregate,
    ) -> QueryResult<Vec<(RecordKey, FilterValue)>> {
        (**self).aggregate_grouped(query).await
    }

    async fn find_in(&self, query: &LookupQuery) -> QueryResult<Vec<Record>> {
        (**self).find_in(query).await
    }
}

/// A lazily loaded parent collection.
#[async_trait]
pub trait ParentSource<M: Model>: Send + Sync {
    /// Load the whole collection.
    async fn load(&self) -> QueryResult<Vec<M>>;

    /// Load up to `limit` parents with keys strictly greater than `after`,
    /// ordered by key.
    ///
    /// Parents sharing the last key of a page must all be on that page, or
    /// the next page (which starts after that key) would skip them. A page
    /// may therefore exceed `limit` when keys repeat.
    async fn load_batch(&self, after: Option<&RecordKey>, limit: usize) -> QueryResult<Vec<M>>;
}

#[async_trait]
impl<M: Model + Clone> ParentSource<M> for Vec<M> {
    async fn load(&self) -> QueryResult<Vec<M>> {
        Ok(self.clone())
    }

    async fn load_batch(&self, after: Option<&RecordKey>, limit: usize) -> QueryResult<Vec<M>> {
        let mut page: Vec<&M> = self
            .iter()
            .filter(|m| after.is_none_or(|after| m.key() > *after))
            .collect();
        page.sort_by_key(|m| m.key());

        let boundary = match limit.checked_sub(1).map(|last| page.get(last)) {
            None => return Ok(Vec::new()),
            Some(None) => return Ok(page.into_iter().cloned().collect()),
            Some(Some(last)) => last.key(),
        };
        let end = page
            .iter()
            .position(|m| m.key() > boundary)
            .unwrap_or(page.len());
        Ok(page.into_iter().take(end).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Tag {
        id: i64,
    }

    impl Model for Tag {
        const MODEL_NAME: &'static str = "Tag";
        const TABLE_NAME: &'static str = "tags";
        const PRIMARY_KEY: &'static str = "id";
        const COLUMNS: &'static [&'static str] = &["id"];

        fn key(&self) -> RecordKey {
            RecordKey::Int(self.id)
        }
    }

    #[tokio::test]
    async fn test_vec_source_pages_by_key() {
        let source = vec![Tag { id: 3 }, Tag { id: 1 }, Tag { id: 2 }, Tag { id: 5 }];

        let first = source.load_batch(None, 2).await.unwrap();
        assert_eq!(first, vec![Tag { id: 1 }, Tag { id: 2 }]);

        let after = first.last().map(Model::key);
        let second = source.load_batch(after.as_ref(), 2).await.unwrap();
        assert_eq!(second, vec![Tag { id: 3 }, Tag { id: 5 }]);

        let done = source.load_batch(Some(&RecordKey::Int(5)), 2).await.unwrap();
        assert!(done.is_empty());
    }

    #[tokio::test]
    async fn test_vec_source_keeps_duplicate_keys_on_one_page() {
        let source = vec![Tag { id: 1 }, Tag { id: 2 }, Tag { id: 2 }, Tag { id: 3 }];

        let first = source.load_batch(None, 2).await.unwrap();
        assert_eq!(first, vec![Tag { id: 1 }, Tag { id: 2 }, Tag { id: 2 }]);

        let after = first.last().map(Model::key);
        let second = source.load_batch(after.as_ref(), 2).await.unwrap();
        assert_eq!(second, vec![Tag { id: 3 }]);

        let streamed = first.len() + second.len();
        assert_eq!(streamed, source.load().await.unwrap().len());
    }

    #[tokio::test]
    async fn test_vec_source_load_keeps_order() {
        let source = vec![Tag { id: 3 }, Tag { id: 1 }];
        assert_eq!(source.load().await.unwrap(), source);
    }
}
