//! The SQLite-backed key-value store shared between processes.

use coinbox_core::{KeyValueStore, StoreValue};
use coinbox_storage::{Database, DatabaseConfig, SqliteStore};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(300);

async fn open(path: &std::path::Path) -> Database {
    Database::new(
        DatabaseConfig::new(path.to_str().unwrap())
            .max_connections(4)
            .busy_timeout(Duration::from_secs(10)),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_entries_visible_across_database_handles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");

    // Two pools on one file stand in for the listener and the web process
    let listener_db = open(&path).await;
    let web_db = open(&path).await;
    let listener = SqliteStore::new(&listener_db);
    let web = SqliteStore::new(&web_db);

    listener
        .put("coinbox.D1.status", StoreValue::Text("READY".into()), TTL)
        .await
        .unwrap();
    listener
        .increment("coinbox.D1.pending_coins", Decimal::from(5), TTL)
        .await
        .unwrap();
    listener
        .increment("coinbox.D1.pending_coins", Decimal::from(10), TTL)
        .await
        .unwrap();

    assert_eq!(
        web.get("coinbox.D1.status").await.unwrap(),
        Some(StoreValue::Text("READY".to_string()))
    );
    assert_eq!(
        web.take("coinbox.D1.pending_coins").await.unwrap(),
        Some(StoreValue::Amount(Decimal::from(15)))
    );
    assert!(listener.get("coinbox.D1.pending_coins").await.unwrap().is_none());

    listener_db.close().await;
    web_db.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_from_two_handles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contended.db");
    let first_db = open(&path).await;
    let second_db = open(&path).await;
    let first = SqliteStore::new(&first_db);
    let second = SqliteStore::new(&second_db);

    let increments = (0..20).map(|i| {
        let store = if i % 2 == 0 { first.clone() } else { second.clone() };
        async move { store.increment("coins", Decimal::ONE, TTL).await }
    });

    for result in join_all(increments).await {
        result.unwrap();
    }

    assert_eq!(
        first.get("coins").await.unwrap(),
        Some(StoreValue::Amount(Decimal::from(20)))
    );

    first_db.close().await;
    second_db.close().await;
}
