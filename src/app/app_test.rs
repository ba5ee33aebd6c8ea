use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::*;
use crate::storage::MemoryStore;
use crate::test_utils::seed_entities;
use crate::test_utils::CLUSTER;
use crate::Error;

fn plaintext_config() -> CpSyncConfig {
    let mut config = CpSyncConfig::default();
    config.cluster.cluster_id = CLUSTER.to_string();
    config.network.listen_address = "127.0.0.1:0".parse().unwrap();
    config.network.event_poll_interval_in_ms = 50;
    config.tls.enable_tls = false;
    config
}

#[tokio::test]
async fn runs_until_cancelled_and_loads_the_first_snapshot() {
    let store = Arc::new(MemoryStore::new());
    seed_entities(&store);
    let cancel = CancellationToken::new();

    let control_plane = ControlPlaneBuilder::new(plaintext_config(), cancel.clone())
        .stores(store)
        .build()
        .unwrap();
    let manager = control_plane.manager().clone();
    assert!(control_plane.streamer().is_registered(CLUSTER));

    let running = tokio::spawn(control_plane.run());

    let mut loaded = false;
    for _ in 0..100 {
        if manager.current_hash().is_some() {
            loaded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(loaded, "initial reconfigure never produced a payload");

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), running).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn opens_sled_when_no_store_is_given() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = plaintext_config();
    config.cluster.data_dir = dir.path().to_path_buf();

    let control_plane = ControlPlaneBuilder::new(config, CancellationToken::new()).build();
    assert!(control_plane.is_ok());
}

#[tokio::test]
async fn missing_certificates_fail_the_build() {
    let mut config = plaintext_config();
    config.tls.enable_tls = true;
    config.tls.cluster_certificate_path = "/nonexistent/cluster.crt".to_string();

    let result = ControlPlaneBuilder::new(config, CancellationToken::new())
        .stores(Arc::new(MemoryStore::new()))
        .build();
    assert!(matches!(result, Err(Error::System(_))));
}

#[tokio::test]
async fn bad_compatibility_version_fails_the_build() {
    let mut config = plaintext_config();
    config.cluster.cp_version = "three".to_string();

    let result = ControlPlaneBuilder::new(config, CancellationToken::new())
        .stores(Arc::new(MemoryStore::new()))
        .build();
    assert!(result.is_err());
}
