//! Deferred materialization of batched attributes.
//!
//! A [`Prebatcher`] wraps a lazily loaded parent collection. Requests added
//! to it are only recorded; the first call to
//! [`materialize`](Prebatcher::materialize) loads the parents, resolves every
//! association, runs one grouped query per attribute and binds the results
//! onto the parents in a single traversal.
//!
//! ```rust
//! use std::sync::Arc;
//! use prebatch_query::memory::MemoryEngine;
//! use prebatch_query::relations::{RelationRegistry, RelationSpec};
//! use prebatch_query::{Model, Prebatcher, Record, RecordKey};
//!
//! #[derive(Clone)]
//! struct Post { id: i64 }
//!
//! impl Model for Post {
//!     const MODEL_NAME: &'static str = "Post";
//!     const TABLE_NAME: &'static str = "posts";
//!     const PRIMARY_KEY: &'static str = "id";
//!     const COLUMNS: &'static [&'static str] = &["id"];
//!     fn key(&self) -> RecordKey { RecordKey::Int(self.id) }
//! }
//!
//! let relations = RelationRegistry::new()
//!     .with("Post", RelationSpec::one_to_many("comments", "Comment", "comments"))
//!     .with("Comment", RelationSpec::many_to_one("post", "Post", "posts"));
//!
//! let engine = MemoryEngine::new();
//! engine.insert("comments", vec![
//!     Record::new().with("post_id", 1),
//!     Record::new().with("post_id", 1),
//! ]);
//!
//! # futures::executor::block_on(async {
//! let mut batch = Prebatcher::new(vec![Post { id: 1 }, Post { id: 2 }], engine, Arc::new(relations))
//!     .count("comments");
//!
//! let posts = batch.materialize().await.unwrap();
//! assert_eq!(posts[0].count("comments_count"), Some(2));
//! assert_eq!(posts[1].count("comments_count"), Some(0));
//! # });
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::try_join_all;
use futures::stream::{self, Stream};
use tracing::{debug, info};

use crate::annotated::{Annotated, Binder};
use crate::batch::{AggregateOp, BatchRequest, BatchSpec, LookupRequest};
use crate::config::PrebatchConfig;
use crate::error::{QueryError, QueryResult};
use crate::filter::FilterValue;
use crate::key::RecordKey;
use crate::operations::{AggregateExecutor, AggregateResult, LookupExecutor, LookupResult};
use crate::relations::{RelationProvider, RelationshipResolver, ResolutionCache};
use crate::sql::DatabaseType;
use crate::traits::{BatchEngine, Model, ParentSource};

enum State<M> {
    Pending,
    Loaded(Vec<M>),
    Materialized(Vec<Annotated<M>>),
}

/// A parent collection with deferred batched attributes.
pub struct Prebatcher<M: Model, E: BatchEngine> {
    source: Box<dyn ParentSource<M>>,
    batcher: Batcher<M, E>,
    state: State<M>,
}

impl<M, E> Prebatcher<M, E>
where
    M: Model + 'static,
    E: BatchEngine,
{
    /// Create a prebatcher over a parent source.
    pub fn new(
        source: impl ParentSource<M> + 'static,
        engine: E,
        provider: Arc<dyn RelationProvider>,
    ) -> Self {
        Self {
            source: Box::new(source),
            batcher: Batcher {
                engine,
                resolver: RelationshipResolver::new(provider),
                spec: BatchSpec::new(),
                config: PrebatchConfig::default(),
            },
            state: State::Pending,
        }
    }

    /// Replace the accumulated requests.
    pub fn with_spec(mut self, spec: BatchSpec<M>) -> Self {
        self.batcher.spec = spec;
        self
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: PrebatchConfig) -> Self {
        self.batcher.config = config;
        self
    }

    /// The accumulated requests.
    pub fn spec(&self) -> &BatchSpec<M> {
        &self.batcher.spec
    }

    /// The configuration.
    pub fn config(&self) -> &PrebatchConfig {
        &self.batcher.config
    }

    fn update(mut self, f: impl FnOnce(BatchSpec<M>) -> BatchSpec<M>) -> Self {
        self.batcher.spec = f(std::mem::take(&mut self.batcher.spec));
        self
    }

    /// Request an aggregate under its derived name.
    pub fn aggregate(self, op: AggregateOp, association: &str, column: Option<&str>) -> Self {
        self.update(|spec| spec.aggregate(op, association, column))
    }

    /// Request an aggregate under an explicit name.
    pub fn aggregate_as(
        self,
        name: &str,
        op: AggregateOp,
        association: &str,
        column: Option<&str>,
    ) -> Self {
        self.update(|spec| spec.aggregate_as(name, op, association, column))
    }

    /// Request `{association}_count`.
    pub fn count(self, association: &str) -> Self {
        self.update(|spec| spec.count(association))
    }

    /// Request `{association}_{column}_count`.
    pub fn count_column(self, association: &str, column: &str) -> Self {
        self.update(|spec| spec.count_column(association, column))
    }

    /// Request `{association}_{column}_sum`.
    pub fn sum(self, association: &str, column: &str) -> Self {
        self.update(|spec| spec.sum(association, column))
    }

    /// Request `{association}_{column}_avg`.
    pub fn avg(self, association: &str, column: &str) -> Self {
        self.update(|spec| spec.avg(association, column))
    }

    /// Request `{association}_{column}_min`.
    pub fn min(self, association: &str, column: &str) -> Self {
        self.update(|spec| spec.min(association, column))
    }

    /// Request `{association}_{column}_max`.
    pub fn max(self, association: &str, column: &str) -> Self {
        self.update(|spec| spec.max(association, column))
    }

    /// Request a keyed lookup bound under `attribute`.
    pub fn lookup(self, attribute: &str, request: LookupRequest<M>) -> Self {
        self.update(|spec| spec.lookup(attribute, request))
    }

    /// Merge more requests in.
    pub fn merge(self, other: BatchSpec<M>) -> Self {
        self.update(|spec| spec.merge(other))
    }

    /// Whether the batch has been executed.
    pub fn is_materialized(&self) -> bool {
        matches!(self.state, State::Materialized(_))
    }

    /// The parents, loading them if needed. Does not execute the batch.
    pub async fn records(&mut self) -> QueryResult<Vec<&M>> {
        if let State::Pending = self.state {
            self.state = State::Loaded(self.source.load().await?);
        }
        Ok(match &self.state {
            State::Loaded(parents) => parents.iter().collect(),
            State::Materialized(bound) => bound.iter().map(Annotated::record).collect(),
            State::Pending => Vec::new(),
        })
    }

    /// Execute the batch and return the annotated parents.
    ///
    /// Runs at most once; later calls return the same parents without
    /// querying. On error nothing is bound and a later call starts over.
    pub async fn materialize(&mut self) -> QueryResult<&[Annotated<M>]> {
        if !self.is_materialized() {
            let parents = match std::mem::replace(&mut self.state, State::Pending) {
                State::Loaded(parents) => parents,
                State::Pending => self.source.load().await?,
                State::Materialized(_) => {
                    return Err(QueryError::internal("prebatcher state changed during materialize"));
                }
            };

            match self.batcher.prepare(&parents).await {
                Ok(outcomes) => {
                    self.state = State::Materialized(self.batcher.bind(parents, outcomes));
                }
                Err(err) => {
                    self.state = State::Loaded(parents);
                    return Err(err);
                }
            }
        }

        match &self.state {
            State::Materialized(bound) => Ok(bound),
            _ => Err(QueryError::internal("prebatcher failed to materialize")),
        }
    }

    /// Execute the batch and take ownership of the annotated parents.
    pub async fn into_records(mut self) -> QueryResult<Vec<Annotated<M>>> {
        self.materialize().await?;
        match self.state {
            State::Materialized(bound) => Ok(bound),
            _ => Err(QueryError::internal("prebatcher failed to materialize")),
        }
    }

    /// Stream the parents in sub-batches of the configured size.
    pub fn batches(self) -> impl Stream<Item = QueryResult<Vec<Annotated<M>>>> {
        let size = self.batcher.config.batch_size;
        self.in_batches(size)
    }

    /// Stream the parents in sub-batches of `batch_size`, ordered by key.
    ///
    /// Each sub-batch is loaded with keyset pagination and materialized on
    /// its own. Values bound on a parent do not depend on the sub-batch
    /// size. The stream ends after the first error.
    pub fn in_batches(self, batch_size: usize) -> impl Stream<Item = QueryResult<Vec<Annotated<M>>>> {
        let size = batch_size.max(1);
        let Self { source, batcher, .. } = self;

        stream::unfold(
            Some((source, batcher, None::<RecordKey>)),
            move |cursor| async move {
                let Some((source, batcher, after)) = cursor else {
                    return None;
                };

                let page = match source.load_batch(after.as_ref(), size).await {
                    Ok(page) => page,
                    Err(err) => return Some((Err(err), None)),
                };
                if page.is_empty() {
                    return None;
                }

                let last = page.last().map(Model::key);
                let exhausted = page.len() < size;
                debug!(model = M::MODEL_NAME, parents = page.len(), "Materializing sub-batch");

                match batcher.run(page).await {
                    Ok(bound) => {
                        let next = (!exhausted).then(|| (source, batcher, last));
                        Some((Ok(bound), next))
                    }
                    Err(err) => Some((Err(err), None)),
                }
            },
        )
    }
}

impl<M: Model, E: BatchEngine> std::fmt::Debug for Prebatcher<M, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            State::Pending => "pending",
            State::Loaded(_) => "loaded",
            State::Materialized(_) => "materialized",
        };
        f.debug_struct("Prebatcher")
            .field("model", &M::MODEL_NAME)
            .field("attributes", &self.batcher.spec.len())
            .field("state", &state)
            .finish()
    }
}

/// Everything one materialization pass needs besides the parents.
struct Batcher<M, E> {
    engine: E,
    resolver: RelationshipResolver,
    spec: BatchSpec<M>,
    config: PrebatchConfig,
}

enum Step<M> {
    Aggregate(AggregateExecutor),
    Lookup(LookupExecutor, LookupRequest<M>),
}

enum Outcome<M> {
    Aggregate(String, AggregateResult),
    Lookup(String, LookupResult, LookupRequest<M>),
}

impl<M, E> Batcher<M, E>
where
    M: Model + 'static,
    E: BatchEngine,
{
    /// Full pass over one parent collection.
    async fn run(&self, parents: Vec<M>) -> QueryResult<Vec<Annotated<M>>> {
        let outcomes = self.prepare(&parents).await?;
        Ok(self.bind(parents, outcomes))
    }

    /// Validate and resolve every request, then run the grouped queries.
    async fn prepare(&self, parents: &[M]) -> QueryResult<Vec<Outcome<M>>> {
        if parents.is_empty() {
            crate::prebatch_debug!(model = M::MODEL_NAME, "Empty parent collection, nothing to batch");
            return Ok(Vec::new());
        }

        let steps = self.plan(parents)?;
        let db = self.config.database;

        let outcomes = if self.config.concurrent_queries {
            try_join_all(steps.into_iter().map(|step| self.execute(step, db))).await?
        } else {
            let mut outcomes = Vec::with_capacity(steps.len());
            for step in steps {
                outcomes.push(self.execute(step, db).await?);
            }
            outcomes
        };

        Ok(outcomes)
    }

    /// Build one step per requested attribute. No query runs here.
    fn plan(&self, parents: &[M]) -> QueryResult<Vec<Step<M>>> {
        let mut cache = ResolutionCache::new();
        let mut seen = HashSet::new();
        let parent_ids: Vec<FilterValue> = parents
            .iter()
            .map(Model::key)
            .filter(|key| seen.insert(key.clone()))
            .map(FilterValue::from)
            .collect();

        if let Some(name) = self.spec.ambiguous_names().next() {
            return Err(QueryError::ambiguous_attribute(name).with_model(M::MODEL_NAME));
        }

        self.spec
            .iter()
            .map(|(name, request)| -> QueryResult<Step<M>> {
                validate_name::<M>(name)?;
                match request {
                    BatchRequest::Aggregate(aggregate) => {
                        let relation =
                            cache.resolve(&self.resolver, M::MODEL_NAME, &aggregate.association)?;
                        AggregateExecutor::prepare(
                            name,
                            aggregate,
                            &relation,
                            parent_ids.clone(),
                            self.config.empty_aggregate,
                        )
                        .map(Step::Aggregate)
                    }
                    BatchRequest::Lookup(lookup) => Ok(Step::Lookup(
                        LookupExecutor::prepare(name, lookup, parents),
                        lookup.clone(),
                    )),
                }
            })
            .collect()
    }

    async fn execute(&self, step: Step<M>, db: DatabaseType) -> QueryResult<Outcome<M>> {
        Ok(match step {
            Step::Aggregate(executor) => {
                let result = executor.execute(&self.engine, db).await?;
                Outcome::Aggregate(executor.attribute().to_string(), result)
            }
            Step::Lookup(executor, request) => {
                let result = executor.execute(&self.engine, db).await?;
                Outcome::Lookup(executor.attribute().to_string(), result, request)
            }
        })
    }

    /// Wrap the parents and apply every binder in one traversal.
    fn bind(&self, parents: Vec<M>, outcomes: Vec<Outcome<M>>) -> Vec<Annotated<M>> {
        let attributes = outcomes.len();
        let binders: Vec<Binder<M>> = outcomes.into_iter().map(make_binder).collect();

        let mut bound: Vec<Annotated<M>> = parents.into_iter().map(Annotated::new).collect();
        for parent in bound.iter_mut() {
            for binder in &binders {
                binder(&mut *parent);
            }
        }

        info!(
            model = M::MODEL_NAME,
            parents = bound.len(),
            attributes,
            "Materialized batch"
        );
        bound
    }
}

fn make_binder<M: Model + 'static>(outcome: Outcome<M>) -> Binder<M> {
    match outcome {
        Outcome::Aggregate(name, result) => Box::new(move |parent: &mut Annotated<M>| {
            let value = result.attribute_for(&parent.key());
            parent.set(name.as_str(), value);
        }),
        Outcome::Lookup(name, result, request) => Box::new(move |parent: &mut Annotated<M>| {
            let key = request.key_for(parent.record());
            let value = result.attribute_for(key.as_ref());
            parent.set(name.as_str(), value);
        }),
    }
}

fn validate_name<M: Model>(name: &str) -> QueryResult<()> {
    if name.trim().is_empty() {
        return Err(QueryError::invalid_attribute_name(name).with_model(M::MODEL_NAME));
    }
    if M::COLUMNS.contains(&name) {
        return Err(QueryError::attribute_conflict(M::MODEL_NAME, name));
    }
    Ok(())
}
