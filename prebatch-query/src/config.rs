//! Batching configuration.
//!
//! Configuration can be built in code, read from `PREBATCH_*` environment
//! variables or parsed from TOML:
//!
//! ```rust
//! use prebatch_query::config::{EmptyAggregate, PrebatchConfig};
//!
//! let config = PrebatchConfig::from_toml(
//!     r#"
//!     batch_size = 250
//!     empty_aggregate = "absent"
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.batch_size, 250);
//! assert_eq!(config.empty_aggregate, EmptyAggregate::Absent);
//! assert!(!config.concurrent_queries);
//! ```
//!
//! # Environment Variables
//!
//! - `PREBATCH_BATCH_SIZE` - Parents per streamed sub-batch
//! - `PREBATCH_EMPTY_AGGREGATE=zero|absent` - Value of min/max/avg over no rows
//! - `PREBATCH_CONCURRENT=true|false` - Dispatch grouped queries concurrently
//! - `PREBATCH_DATABASE=postgres|mysql|sqlite` - Dialect used to render SQL in logs

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{QueryError, QueryResult};
use crate::sql::DatabaseType;

/// Default number of parents per streamed sub-batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// What parents with no child rows receive for min, max and avg.
///
/// Count and sum are always 0 for such parents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyAggregate {
    /// Bind 0.
    #[default]
    Zero,
    /// Bind [`Attribute::Absent`](crate::annotated::Attribute::Absent).
    Absent,
}

impl EmptyAggregate {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "zero" | "0" => Some(Self::Zero),
            "absent" | "null" | "none" => Some(Self::Absent),
            _ => None,
        }
    }
}

/// Configuration for a [`Prebatcher`](crate::prebatcher::Prebatcher).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrebatchConfig {
    /// Parents per sub-batch when streaming without an explicit size.
    pub batch_size: usize,
    /// Value of undefined aggregates.
    pub empty_aggregate: EmptyAggregate,
    /// Run the grouped queries of one pass concurrently.
    pub concurrent_queries: bool,
    /// Dialect used to render grouped queries for logging.
    pub database: DatabaseType,
}

impl Default for PrebatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            empty_aggregate: EmptyAggregate::Zero,
            concurrent_queries: false,
            database: DatabaseType::PostgreSQL,
        }
    }
}

impl PrebatchConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> QueryResult<Self> {
        Self::from_env_source(&StdEnvSource)
    }

    /// Read configuration from an environment source. Unset variables keep
    /// their defaults.
    pub fn from_env_source(env: &impl EnvSource) -> QueryResult<Self> {
        let mut config = Self::default();

        if let Some(size) = env.get("PREBATCH_BATCH_SIZE") {
            config.batch_size = size.trim().parse().map_err(|_| {
                QueryError::invalid_configuration(format!(
                    "PREBATCH_BATCH_SIZE must be a positive integer, got `{}`",
                    size
                ))
            })?;
        }

        if let Some(policy) = env.get("PREBATCH_EMPTY_AGGREGATE") {
            config.empty_aggregate = EmptyAggregate::from_name(policy.trim()).ok_or_else(|| {
                QueryError::invalid_configuration(format!(
                    "PREBATCH_EMPTY_AGGREGATE must be `zero` or `absent`, got `{}`",
                    policy
                ))
            })?;
        }

        if let Some(flag) = env.get("PREBATCH_CONCURRENT") {
            config.concurrent_queries = match flag.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(QueryError::invalid_configuration(format!(
                        "PREBATCH_CONCURRENT must be a boolean, got `{}`",
                        flag
                    )));
                }
            };
        }

        if let Some(name) = env.get("PREBATCH_DATABASE") {
            config.database = DatabaseType::from_name(name.trim()).ok_or_else(|| {
                QueryError::invalid_configuration(format!("Unknown database `{}`", name))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> QueryResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            QueryError::invalid_configuration(e.message().to_string()).with_source(e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values that can never work.
    pub fn validate(&self) -> QueryResult<()> {
        if self.batch_size == 0 {
            return Err(QueryError::invalid_configuration(
                "batch_size must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Set the streamed sub-batch size.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the empty aggregate policy.
    pub fn empty_aggregate(mut self, policy: EmptyAggregate) -> Self {
        self.empty_aggregate = policy;
        self
    }

    /// Enable or disable concurrent query dispatch.
    pub fn concurrent_queries(mut self, enabled: bool) -> Self {
        self.concurrent_queries = enabled;
        self
    }

    /// Set the SQL dialect used for logging.
    pub fn database(mut self, database: DatabaseType) -> Self {
        self.database = database;
        self
    }
}

/// Source for environment variables.
pub trait EnvSource: Send + Sync {
    /// Get an environment variable value.
    fn get(&self, name: &str) -> Option<String>;

    /// Check if a variable exists.
    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// Environment source reading the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Environment source backed by a HashMap.
#[derive(Debug, Clone, Default)]
pub struct MapEnvSource {
    vars: HashMap<String, String>,
}

impl MapEnvSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl EnvSource for MapEnvSource {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = PrebatchConfig::default();
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.empty_aggregate, EmptyAggregate::Zero);
        assert!(!config.concurrent_queries);
        assert_eq!(config.database, DatabaseType::PostgreSQL);
    }

    #[test]
    fn test_from_env_source() {
        let env = MapEnvSource::new()
            .set("PREBATCH_BATCH_SIZE", "64")
            .set("PREBATCH_EMPTY_AGGREGATE", "Absent")
            .set("PREBATCH_CONCURRENT", "1")
            .set("PREBATCH_DATABASE", "sqlite");

        let config = PrebatchConfig::from_env_source(&env).unwrap();
        assert_eq!(
            config,
            PrebatchConfig::new()
                .batch_size(64)
                .empty_aggregate(EmptyAggregate::Absent)
                .concurrent_queries(true)
                .database(DatabaseType::SQLite)
        );
    }

    #[test]
    fn test_from_env_source_empty_keeps_defaults() {
        let config = PrebatchConfig::from_env_source(&MapEnvSource::new()).unwrap();
        assert_eq!(config, PrebatchConfig::default());
    }

    #[test]
    fn test_from_env_source_rejects_garbage() {
        let err = PrebatchConfig::from_env_source(
            &MapEnvSource::new().set("PREBATCH_BATCH_SIZE", "lots"),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidConfiguration);

        let err = PrebatchConfig::from_env_source(
            &MapEnvSource::new().set("PREBATCH_CONCURRENT", "maybe"),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidConfiguration);

        let err =
            PrebatchConfig::from_env_source(&MapEnvSource::new().set("PREBATCH_BATCH_SIZE", "0"))
                .unwrap_err();
        assert!(err.message.contains("batch_size"));
    }

    #[test]
    fn test_from_toml() {
        let config = PrebatchConfig::from_toml(
            r#"
            concurrent_queries = true
            database = "mysql"
            "#,
        )
        .unwrap();
        assert!(config.concurrent_queries);
        assert_eq!(config.database, DatabaseType::MySQL);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn test_from_toml_rejects_unknown_fields() {
        let err = PrebatchConfig::from_toml("batchsize = 10").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidConfiguration);
    }
}
