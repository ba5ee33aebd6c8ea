//! Store → snapshot → per-version payload, through the public API only.

use std::sync::Arc;
use std::time::Duration;

use cp_sync::compat::CompatProcessor;
use cp_sync::snapshot::EntityKind;
use cp_sync::snapshot::Envelope;
use cp_sync::snapshot::Snapshot;
use cp_sync::snapshot::SnapshotLoader;
use cp_sync::storage::MemoryStore;
use cp_sync::ChangeRegistry;
use cp_sync::DataPlaneVersion;
use serde_json::json;

const CLUSTER: &str = "5d2a4c1e-0f0b-4c63-8d8e-6a9e1f3b7c20";

fn store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.put_entity(CLUSTER, EntityKind::Service, json!({"id": "s1", "host": "orders.internal"}));
    store.put_entity(
        CLUSTER,
        EntityKind::Plugin,
        json!({
            "id": "p1",
            "name": "zipkin",
            "service": {"id": "s1"},
            "config": {"http_endpoint": "http://zipkin:9411", "http_span_name": "method", "read_timeout": 5000}
        }),
    );
    store
}

#[tokio::test]
async fn older_data_planes_get_a_downgraded_copy_of_the_same_snapshot() {
    let loader = SnapshotLoader::new(store(), Duration::from_secs(5));
    let snapshot = Snapshot::assemble(&loader, CLUSTER).await.unwrap();
    let (payload, hash) = snapshot.into_payload().unwrap();

    let registry = Arc::new(ChangeRegistry::with_default_catalog().unwrap());
    let processor = CompatProcessor::new(registry, DataPlaneVersion::parse("3.0.0").unwrap());

    let current = processor.process("3.0.0", &payload).unwrap();
    assert_eq!(current.payload, payload);
    assert!(current.report.is_empty());

    let older = processor.process("2.8.1", &payload).unwrap();
    let ids: Vec<&str> = older.report.change_ids().collect();
    assert!(ids.contains(&"P116"), "{ids:?}");

    let envelope = Envelope::decode(&older.payload).unwrap();
    assert_eq!(envelope.config_hash, hash);
    let config = &envelope.config_table["plugins"][0]["config"];
    assert!(config.get("http_span_name").is_none());
    assert!(config.get("read_timeout").is_none());
    assert_eq!(config["http_endpoint"], json!("http://zipkin:9411"));
}
