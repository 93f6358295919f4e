//! Grouped query executors.
//!
//! Each requested attribute runs through one executor:
//! - `AggregateExecutor` - count/sum/avg/min/max over an association, grouped by foreign key
//! - `LookupExecutor` - rows of an arbitrary table matched by a key, grouped by that key
//!
//! Executors are prepared first (validation, key collection) and executed
//! later, so every request of a pass can be checked before any query runs.

mod aggregate;
mod lookup;

pub use aggregate::{AggregateExecutor, AggregateResult, GroupedAggregate};
pub use lookup::{LookupExecutor, LookupQuery, LookupResult};
