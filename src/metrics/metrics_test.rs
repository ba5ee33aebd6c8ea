use super::*;

fn create_test_registry() -> Registry {
    let registry = Registry::new_custom(Some("cpsync".to_string()), None).unwrap();
    register_custom_metrics(&registry);
    registry
}

#[test]
fn test_custom_registry() {
    let registry = create_test_registry();

    BROADCASTS_TOTAL.with_label_values(&["registry-test"]).inc();
    let metrics = registry.gather();
    let metric_names: Vec<_> = metrics.iter().map(|m| m.get_name()).collect();

    assert!(
        metric_names.contains(&"cpsync_cp_broadcasts_total"),
        "Missing cpsync_cp_broadcasts_total"
    );
}

#[test]
fn test_counter_increment() {
    HASH_MATCH_SKIPS_TOTAL.with_label_values(&["counter-test"]).inc();
    HASH_MATCH_SKIPS_TOTAL.with_label_values(&["counter-test"]).inc();

    let value = HASH_MATCH_SKIPS_TOTAL.with_label_values(&["counter-test"]).get();
    assert_eq!(value, 2, "Counter should increment correctly");
}

#[test]
fn test_encode_registry_renders_text_format() {
    let registry = create_test_registry();
    CONNECTED_NODES.with_label_values(&["encode-test"]).set(3);

    let body = encode_registry(&registry);
    assert!(body.contains("cpsync_cp_connected_nodes{cluster_id=\"encode-test\"} 3"));
}
