//! Integration tests for configuration parsing and handling.
//!
//! These tests verify that configuration loaded from TOML or the environment
//! changes how a batch is executed.

use std::sync::Arc;

use prebatch::memory::MemoryEngine;
use prebatch::prelude::*;
use prebatch::{DatabaseType, ErrorCode, MapEnvSource};

#[derive(Debug, Clone)]
struct Shop {
    id: i64,
}

impl Model for Shop {
    const MODEL_NAME: &'static str = "Shop";
    const TABLE_NAME: &'static str = "shops";
    const PRIMARY_KEY: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &["id"];

    fn key(&self) -> RecordKey {
        RecordKey::Int(self.id)
    }
}

fn relations() -> Arc<RelationRegistry> {
    Arc::new(
        RelationRegistry::new()
            .with("Shop", RelationSpec::one_to_many("orders", "Order", "orders"))
            .with("Order", RelationSpec::many_to_one("shop", "Shop", "shops")),
    )
}

/// Test full configuration with all options
#[test]
fn test_config_full() {
    let config = PrebatchConfig::from_toml(
        r#"
        batch_size = 50
        empty_aggregate = "absent"
        concurrent_queries = true
        database = "sqlite"
        "#,
    )
    .expect("Failed to parse config");

    assert_eq!(config.batch_size, 50);
    assert_eq!(config.empty_aggregate, EmptyAggregate::Absent);
    assert!(config.concurrent_queries);
    assert_eq!(config.database, DatabaseType::SQLite);
}

/// Test invalid values are reported as configuration errors
#[test]
fn test_config_invalid() {
    for content in ["batch_size = 0", "empty_aggregate = \"maybe\"", "batch_size = \"ten\""] {
        let err = PrebatchConfig::from_toml(content).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidConfiguration, "{}", content);
    }
}

/// Test environment configuration drives execution
#[tokio::test]
async fn test_env_config_applies_to_batch() {
    let config = PrebatchConfig::from_env_source(
        &MapEnvSource::new()
            .set("PREBATCH_EMPTY_AGGREGATE", "absent")
            .set("PREBATCH_DATABASE", "mysql"),
    )
    .unwrap();

    let engine = Arc::new(MemoryEngine::new().with_database(config.database));
    engine.insert(
        "orders",
        vec![Record::new().with("shop_id", 1).with("total", 40)],
    );

    let shops = Prebatcher::new(vec![Shop { id: 1 }, Shop { id: 2 }], engine.clone(), relations())
        .with_config(config)
        .avg("orders", "total")
        .into_records()
        .await
        .unwrap();

    assert_eq!(shops[0].value("orders_total_avg"), Some(&FilterValue::Float(40.0)));
    assert_eq!(shops[1].get("orders_total_avg"), Some(&Attribute::Absent));
    assert_eq!(
        engine.queries()[0].sql,
        "SELECT shop_id, AVG(total) FROM orders WHERE shop_id IN (?, ?) GROUP BY shop_id"
    );
}

/// Test configured batch size is used for streaming
#[tokio::test]
async fn test_configured_batch_size_streams() {
    use futures::StreamExt;

    let shops: Vec<Shop> = (1..=5).map(|id| Shop { id }).collect();
    let pages: Vec<_> = Prebatcher::new(shops, Arc::new(MemoryEngine::new()), relations())
        .with_config(PrebatchConfig::new().batch_size(2))
        .count("orders")
        .batches()
        .collect()
        .await;

    let sizes: Vec<_> = pages.into_iter().map(|page| page.unwrap().len()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
}
