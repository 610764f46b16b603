//! StoreHandle behaviour against the in-memory engine

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use webmarket_core::{
    DatabaseName, Engine, MemoryEngine, MemoryError, Record, RecordId, Schema, StoreConfig,
    StoreHandle,
};

async fn open_handle(engine: &MemoryEngine, name: &str) -> StoreHandle<MemoryEngine> {
    StoreHandle::open(engine.clone(), StoreConfig::new(name))
        .await
        .unwrap()
}

fn payloads(records: &[Record]) -> HashSet<String> {
    records.iter().map(|r| r.data.to_string()).collect()
}

/// Counts opens and yields before delegating, so concurrent callers overlap.
#[derive(Clone, Default)]
struct CountingEngine {
    inner: MemoryEngine,
    opens: Arc<AtomicUsize>,
}

impl Engine for CountingEngine {
    type Connection = <MemoryEngine as Engine>::Connection;
    type Error = MemoryError;

    async fn open(
        &self,
        name: &DatabaseName,
        schema: &Schema,
    ) -> Result<Self::Connection, MemoryError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.inner.open(name, schema).await
    }

    async fn delete_database(&self, name: &DatabaseName) -> Result<(), MemoryError> {
        self.inner.delete_database(name).await
    }

    async fn database_names(&self) -> Result<Vec<String>, MemoryError> {
        self.inner.database_names().await
    }
}

#[tokio::test]
async fn test_insert_then_select_by_id() {
    let engine = MemoryEngine::new();
    let handle = open_handle(&engine, "shop").await;

    for data in [
        json!({"sku": "A-1", "tags": ["new"]}),
        json!("plain string"),
        json!(42),
        json!(null),
        json!([1, {"nested": true}]),
    ] {
        let id = handle.insert_one(data.clone()).await.unwrap();
        let record = handle.select_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.id, Some(id));
        assert_eq!(record.data, data);
    }
}

#[tokio::test]
async fn test_select_missing_id_is_none() {
    let engine = MemoryEngine::new();
    let handle = open_handle(&engine, "shop").await;
    assert_eq!(handle.select_by_id(RecordId(99)).await.unwrap(), None);
}

#[tokio::test]
async fn test_insert_many_keys_in_input_order() {
    let engine = MemoryEngine::new();
    let handle = open_handle(&engine, "shop").await;
    handle.insert_one(json!("before")).await.unwrap();

    let items: Vec<Value> = (0..5).map(|i| json!({"n": i})).collect();
    let ids = handle.insert_many(items.clone()).await.unwrap();

    assert_eq!(ids.len(), items.len());
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    for (id, item) in ids.iter().zip(&items) {
        let record = handle.select_by_id(*id).await.unwrap().unwrap();
        assert_eq!(&record.data, item);
    }
}

#[tokio::test]
async fn test_insert_many_empty() {
    let engine = MemoryEngine::new();
    let handle = open_handle(&engine, "shop").await;
    let ids = handle.insert_many(Vec::new()).await.unwrap();
    assert!(ids.is_empty());
    assert!(handle.select_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_overwrites() {
    let engine = MemoryEngine::new();
    let handle = open_handle(&engine, "shop").await;

    let id = handle.insert_one(json!({"qty": 1})).await.unwrap();
    let written = handle.update_one(id, json!({"qty": 2})).await.unwrap();
    assert_eq!(written, id);

    let record = handle.select_by_id(id).await.unwrap().unwrap();
    assert_eq!(record.data, json!({"qty": 2}));
    assert_eq!(handle.select_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_update_creates_missing_and_moves_generator() {
    let engine = MemoryEngine::new();
    let handle = open_handle(&engine, "shop").await;

    handle.update_one(RecordId(50), json!("explicit")).await.unwrap();
    let next = handle.insert_one(json!("generated")).await.unwrap();
    assert_eq!(next, RecordId(51));
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let engine = MemoryEngine::new();
    let handle = open_handle(&engine, "shop").await;

    let id = handle.insert_one(json!("doomed")).await.unwrap();
    handle.delete_one(id).await.unwrap();
    assert_eq!(handle.select_by_id(id).await.unwrap(), None);

    // Second delete (and delete of a never-used key) is a no-op
    handle.delete_one(id).await.unwrap();
    handle.delete_one(RecordId(12345)).await.unwrap();
}

#[tokio::test]
async fn test_select_all_counts_inserts() {
    let engine = MemoryEngine::new();
    let handle = open_handle(&engine, "shop").await;

    let mut expected = HashSet::new();
    for i in 0..7 {
        let data = json!({"i": i});
        expected.insert(data.to_string());
        handle.insert_one(data).await.unwrap();
    }
    handle
        .insert_many(vec![json!("x"), json!("y")])
        .await
        .unwrap();
    expected.insert(json!("x").to_string());
    expected.insert(json!("y").to_string());

    let all = handle.select_all().await.unwrap();
    assert_eq!(all.len(), 9);
    assert_eq!(payloads(&all), expected);
}

#[tokio::test]
async fn test_change_database_isolates_and_restores() {
    let engine = MemoryEngine::new();
    let handle = open_handle(&engine, "first").await;
    handle.insert_one(json!("in first")).await.unwrap();

    handle.change_database("second").await.unwrap();
    assert_eq!(handle.database_name().await.as_str(), "second");
    assert!(handle.select_all().await.unwrap().is_empty());
    handle.insert_one(json!("in second")).await.unwrap();

    handle.change_database("first").await.unwrap();
    let all = handle.select_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].data, json!("in first"));
}

#[tokio::test]
async fn test_change_database_closes_old_connection() {
    let engine = MemoryEngine::new();
    let handle = open_handle(&engine, "first").await;
    let first = DatabaseName::new("first");
    let second = DatabaseName::new("second");
    assert_eq!(engine.open_connections(&first), 1);

    handle.change_database("second").await.unwrap();
    assert_eq!(engine.open_connections(&first), 0);
    assert_eq!(engine.open_connections(&second), 1);
}

#[tokio::test]
async fn test_list_databases_strips_prefix() {
    let engine = MemoryEngine::new();
    let a = open_handle(&engine, "a").await;
    let b = open_handle(&engine, "webmarket.b").await;
    a.insert_one(json!(1)).await.unwrap();
    b.insert_one(json!(2)).await.unwrap();

    let names: HashSet<String> = StoreHandle::list_databases(&engine)
        .await
        .unwrap()
        .into_iter()
        .collect();
    assert!(names.contains("a"));
    assert!(names.contains("b"));
    assert!(names.iter().all(|n| !n.starts_with("webmarket.")));
}

#[tokio::test]
async fn test_delete_database_removes_from_list() {
    let engine = MemoryEngine::new();
    let handle = open_handle(&engine, "temp").await;
    handle.insert_one(json!("gone soon")).await.unwrap();

    // Still open: the engine reports the conflict
    let blocked = StoreHandle::delete_database(&engine, "temp").await;
    assert_eq!(
        blocked,
        Err(MemoryError::Blocked("webmarket.temp".to_string()))
    );

    handle.close().await;
    assert!(!handle.is_ready().await);
    StoreHandle::delete_database(&engine, "temp").await.unwrap();

    let names = StoreHandle::list_databases(&engine).await.unwrap();
    assert!(!names.contains(&"temp".to_string()));

    // Reusing the handle recreates an empty database
    assert!(handle.select_all().await.unwrap().is_empty());
    assert!(handle.is_ready().await);
}

#[tokio::test]
async fn test_lazy_initialization() {
    let engine = MemoryEngine::new();
    let handle = StoreHandle::create(engine.clone(), StoreConfig::new("lazy"));
    assert!(!handle.is_ready().await);
    assert!(StoreHandle::list_databases(&engine).await.unwrap().is_empty());

    handle.insert_one(json!("first use")).await.unwrap();
    assert!(handle.is_ready().await);
    assert_eq!(
        StoreHandle::list_databases(&engine).await.unwrap(),
        vec!["lazy".to_string()]
    );
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let engine = CountingEngine::default();
    let handle = StoreHandle::create(engine.clone(), StoreConfig::default());

    handle.init().await.unwrap();
    handle.init().await.unwrap();
    handle.select_all().await.unwrap();
    assert_eq!(engine.opens.load(Ordering::SeqCst), 1);
    assert_eq!(handle.database_name().await.as_str(), "webmarket");
}

#[tokio::test]
async fn test_concurrent_first_calls_open_once() {
    let engine = CountingEngine::default();
    let handle = StoreHandle::create(engine.clone(), StoreConfig::new("race"));

    let (a, b, c, d) = tokio::join!(
        handle.insert_one(json!("a")),
        handle.insert_one(json!("b")),
        handle.select_all(),
        handle.init(),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();
    d.unwrap();

    assert_eq!(engine.opens.load(Ordering::SeqCst), 1);
    assert_eq!(
        engine.inner.open_connections(&DatabaseName::new("race")),
        1
    );
}

#[tokio::test]
async fn test_concurrent_operations_on_ready_handle() {
    let engine = MemoryEngine::new();
    let handle = open_handle(&engine, "busy").await;

    let inserts = (0..20).map(|i| handle.insert_one(json!(i)));
    let ids = futures::future::try_join_all(inserts).await.unwrap();
    let unique: HashSet<RecordId> = ids.iter().copied().collect();
    assert_eq!(unique.len(), 20);
    assert_eq!(handle.select_all().await.unwrap().len(), 20);
}

#[tokio::test]
async fn test_failed_open_leaves_handle_uninitialized() {
    let engine = MemoryEngine::new();
    let newer = StoreHandle::open(engine.clone(), StoreConfig::new("versioned").version(2))
        .await
        .unwrap();
    newer.close().await;

    let older = StoreHandle::create(engine.clone(), StoreConfig::new("versioned"));
    let result = older.select_all().await;
    assert_eq!(
        result,
        Err(MemoryError::Version {
            requested: 1,
            existing: 2
        })
    );
    assert!(!older.is_ready().await);
}

#[tokio::test]
async fn test_custom_collection() {
    let engine = MemoryEngine::new();
    let handle = StoreHandle::open(engine.clone(), StoreConfig::new("shop").collection("carts"))
        .await
        .unwrap();
    assert_eq!(handle.collection(), "carts");

    let id = handle.insert_one(json!({"items": 3})).await.unwrap();
    assert_eq!(
        handle.select_by_id(id).await.unwrap().unwrap().data,
        json!({"items": 3})
    );
}

#[tokio::test]
async fn test_version_zero_is_rejected_without_creating_database() {
    let engine = MemoryEngine::new();
    let result = StoreHandle::open(engine.clone(), StoreConfig::new("zero").version(0)).await;
    assert!(matches!(result, Err(MemoryError::InvalidVersion(0))));

    assert!(StoreHandle::list_databases(&engine).await.unwrap().is_empty());
    assert_eq!(engine.version(&DatabaseName::new("zero")), None);
}
