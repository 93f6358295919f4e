//! # Prebatch
//!
//! Batch derived attributes onto parent collections without N+1 queries.
//!
//! Prebatch provides:
//! - Deferred requests for counts, sums, averages, minimums and maximums over associations
//! - Keyed lookups into arbitrary tables, bound as one row or many rows per parent
//! - One grouped query per requested attribute, however many parents there are
//! - Lazy materialization, concurrent dispatch and keyset-paginated streaming
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use prebatch::prelude::*;
//! use prebatch::memory::MemoryEngine;
//!
//! #[derive(Clone)]
//! struct Author {
//!     id: i64,
//! }
//!
//! impl Model for Author {
//!     const MODEL_NAME: &'static str = "Author";
//!     const TABLE_NAME: &'static str = "authors";
//!     const PRIMARY_KEY: &'static str = "id";
//!     const COLUMNS: &'static [&'static str] = &["id"];
//!
//!     fn key(&self) -> RecordKey {
//!         RecordKey::Int(self.id)
//!     }
//! }
//!
//! let relations = RelationRegistry::new()
//!     .with("Author", RelationSpec::one_to_many("books", "Book", "books"))
//!     .with("Book", RelationSpec::many_to_one("author", "Author", "authors"));
//!
//! let engine = MemoryEngine::new();
//! engine.insert("books", vec![
//!     Record::new().with("author_id", 1).with("pages", 320),
//!     Record::new().with("author_id", 1).with("pages", 180),
//! ]);
//!
//! # futures::executor::block_on(async {
//! let authors = Prebatcher::new(vec![Author { id: 1 }, Author { id: 2 }], engine, Arc::new(relations))
//!     .count("books")
//!     .sum("books", "pages")
//!     .into_records()
//!     .await?;
//!
//! assert_eq!(authors[0].count("books_count"), Some(2));
//! assert_eq!(authors[0].count("books_pages_sum"), Some(500));
//! assert_eq!(authors[1].count("books_count"), Some(0));
//! # Ok::<(), QueryError>(())
//! # }).unwrap();
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use prebatch_query::*;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use prebatch_query::prelude::*;
}
