//! Integration tests against a live Postgres server.
//!
//! Gated on `CHECKPOINT_TEST_DATABASE_URL`; without it every test returns
//! early. The store's observable properties are exercised in one sequential
//! test so the shared `checkpoints` table never races with itself.
//!
//! ```text
//! CHECKPOINT_TEST_DATABASE_URL=postgres://localhost/checkpoint_test cargo test
//! ```

use futures::StreamExt;
use serde_json::json;
use session_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointError, CheckpointStore, StateValue,
};
use session_checkpoint_postgres::PostgresCheckpointStore;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, PgConnection};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

const DATABASE_URL_VAR: &str = "CHECKPOINT_TEST_DATABASE_URL";

fn database_url() -> Option<String> {
    std::env::var(DATABASE_URL_VAR).ok()
}

/// Session ids are namespaced per run so reruns never collide.
fn unique_session(label: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{label}-{nanos}")
}

fn state(value: serde_json::Value) -> StateValue {
    StateValue::from(value)
}

async fn listed_versions(
    store: &PostgresCheckpointStore,
    session: &str,
    before: Option<&CheckpointConfig>,
    limit: Option<usize>,
) -> Vec<String> {
    let stream = store
        .list(Some(&CheckpointConfig::new(session)), None, before, limit)
        .await
        .unwrap();
    stream
        .map(|tuple| tuple.unwrap().checkpoint.version)
        .collect()
        .await
}

#[tokio::test]
async fn postgres_store_end_to_end() {
    let Some(url) = database_url() else {
        return;
    };
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("connect to test database");
    let store = PostgresCheckpointStore::with_pool(pool);

    store.ensure_schema().await.unwrap();
    store.ensure_schema().await.unwrap(); // idempotent

    // A fresh session resumes empty, not with an error.
    let session = unique_session("resume");
    let config = CheckpointConfig::new(&session);
    assert!(store.get_tuple(&config).await.unwrap().is_none());

    // First put; the ack carries the stored version.
    let ack = store
        .put(
            &config,
            Checkpoint::new("v1", state(json!({"messages": ["hi"]}))),
            state(json!({"step": 0})),
        )
        .await
        .unwrap();
    assert_eq!(ack.version.as_deref(), Some("v1"));

    let tuple = store.get_tuple(&config).await.unwrap().unwrap();
    assert_eq!(tuple.checkpoint.version, "v1");
    assert_eq!(tuple.checkpoint.state, state(json!({"messages": ["hi"]})));
    assert_eq!(tuple.metadata, state(json!({"step": 0})));
    assert!(tuple.parent_config.is_none());

    // Identical re-put leaves exactly one row.
    store
        .put(
            &config,
            Checkpoint::new("v1", state(json!({"messages": ["hi"]}))),
            state(json!({"step": 0})),
        )
        .await
        .unwrap();
    assert_eq!(listed_versions(&store, &session, None, None).await, ["v1"]);

    // A new payload at the same key overwrites in place.
    store
        .put(
            &config,
            Checkpoint::new("v1", state(json!("rewritten"))),
            StateValue::Null,
        )
        .await
        .unwrap();
    let rewritten = store
        .get_tuple(&CheckpointConfig::new(&session).with_version("v1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rewritten.checkpoint.state, state(json!("rewritten")));
    assert_eq!(listed_versions(&store, &session, None, None).await, ["v1"]);

    // Chaining through the ack records the parent, and by-version retrieval
    // reports the stored parent column, not the queried version.
    let ack2 = store
        .put(&ack, Checkpoint::new("v2", state(json!(2))), StateValue::Null)
        .await
        .unwrap();
    assert_eq!(ack2.version.as_deref(), Some("v2"));
    let by_version = store
        .get_tuple(&CheckpointConfig::new(&session).with_version("v2"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        by_version.parent_config,
        Some(CheckpointConfig::new(&session).with_version("v1"))
    );

    // Rewriting v2 through a different config changes payload and metadata
    // only; the parent recorded at first insert stays v1.
    store
        .put(
            &CheckpointConfig::new(&session).with_version("v0"),
            Checkpoint::new("v2", state(json!(22))),
            StateValue::Null,
        )
        .await
        .unwrap();
    let rewritten2 = store
        .get_tuple(&CheckpointConfig::new(&session).with_version("v2"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rewritten2.checkpoint.state, state(json!(22)));
    assert_eq!(
        rewritten2.parent_config,
        Some(CheckpointConfig::new(&session).with_version("v1"))
    );

    // Latest is the greatest version string, not the last insert.
    let order_session = unique_session("order");
    let order_config = CheckpointConfig::new(&order_session);
    for version in ["v1", "v3", "v2"] {
        store
            .put(
                &order_config,
                Checkpoint::new(version, state(json!({"at": version}))),
                StateValue::Null,
            )
            .await
            .unwrap();
    }
    let latest = store.get_tuple(&order_config).await.unwrap().unwrap();
    assert_eq!(latest.checkpoint.version, "v3");

    // Enumeration is newest-first, truncates, and excludes the cutoff.
    assert_eq!(
        listed_versions(&store, &order_session, None, None).await,
        ["v3", "v2", "v1"]
    );
    assert_eq!(
        listed_versions(&store, &order_session, None, Some(2)).await,
        ["v3", "v2"]
    );
    let before = CheckpointConfig::new(&order_session).with_version("v3");
    assert_eq!(
        listed_versions(&store, &order_session, Some(&before), None).await,
        ["v2", "v1"]
    );

    // Sessions never observe each other.
    let other_session = unique_session("other");
    store
        .put(
            &CheckpointConfig::new(&other_session),
            Checkpoint::new("v9", state(json!("elsewhere"))),
            StateValue::Null,
        )
        .await
        .unwrap();
    assert_eq!(
        listed_versions(&store, &order_session, None, None).await,
        ["v3", "v2", "v1"]
    );
    let other = store
        .get_tuple(&CheckpointConfig::new(&other_session))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(other.checkpoint.version, "v9");

    // Raw binary payloads round-trip through BYTEA with their kind intact.
    let blob_session = unique_session("blob");
    let blob_config = CheckpointConfig::new(&blob_session);
    store
        .put(
            &blob_config,
            Checkpoint::new("v1", StateValue::Bytes(vec![0x00, 0xff, 0x42])),
            StateValue::ByteArray(b"meta".to_vec()),
        )
        .await
        .unwrap();
    let blob = store.get_tuple(&blob_config).await.unwrap().unwrap();
    assert_eq!(blob.checkpoint.state, StateValue::Bytes(vec![0x00, 0xff, 0x42]));
    assert_eq!(blob.metadata, StateValue::ByteArray(b"meta".to_vec()));

    // Metadata predicates are rejected, not silently ignored.
    let mut filter = HashMap::new();
    filter.insert("step".to_string(), json!(0));
    let err = match store.list(Some(&config), Some(filter), None, None).await {
        Ok(_) => panic!("expected list() to reject unsupported metadata filter"),
        Err(e) => e,
    };
    assert!(matches!(err, CheckpointError::FilterNotSupported));

    // A single pre-opened connection works interchangeably with the pool.
    let conn = PgConnection::connect(&url)
        .await
        .expect("open single connection");
    let single = PostgresCheckpointStore::with_connection(conn);
    let single_session = unique_session("single");
    single
        .put(
            &CheckpointConfig::new(&single_session),
            Checkpoint::new("v1", state(json!("via single connection"))),
            StateValue::Null,
        )
        .await
        .unwrap();
    let seen_by_pool = store
        .get_tuple(&CheckpointConfig::new(&single_session))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        seen_by_pool.checkpoint.state,
        state(json!("via single connection"))
    );

    // Teardown: drop, then recreate so the table is left in place.
    store.drop_schema().await.unwrap();
    store.ensure_schema().await.unwrap();
    assert!(store.get_tuple(&config).await.unwrap().is_none());
}
