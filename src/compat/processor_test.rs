use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::json;
use serde_json::Map;
use serde_json::Value;

use super::*;
use crate::snapshot::Envelope;
use crate::CompatError;

const CONFIG_HASH: &str = "0123456789abcdef0123456789abcdef";

fn processor() -> CompatProcessor {
    let registry = Arc::new(ChangeRegistry::with_default_catalog().unwrap());
    CompatProcessor::new(registry, DataPlaneVersion::parse("3.0.0").unwrap())
}

fn payload(table: Value) -> Bytes {
    let Value::Object(table) = table else {
        panic!("config table must be an object");
    };
    let mut hashes = BTreeMap::new();
    hashes.insert("plugins".to_string(), "ffffffffffffffffffffffffffffffff".to_string());
    Bytes::from(
        Envelope::reconfigure(table, CONFIG_HASH.to_string(), hashes)
            .encode()
            .unwrap(),
    )
}

fn table_of(bytes: &Bytes) -> Map<String, Value> {
    Envelope::decode(bytes).unwrap().config_table
}

fn zipkin_table() -> Value {
    json!({
        "_format_version": "1.1",
        "plugins": [{
            "id": "z1",
            "name": "zipkin",
            "config": {
                "http_endpoint": "http://zipkin:9411/api/v2/spans",
                "http_span_name": "method_path",
                "connect_timeout": 2000,
                "read_timeout": 5000,
                "send_timeout": 5000,
                "sample_ratio": 0.5
            }
        }]
    })
}

#[test]
fn current_version_gets_input_bytes_unchanged() {
    let mut extra = MockExtraProcessor::new();
    extra.expect_process().times(0);
    let processor = processor().with_extra_processor(Arc::new(extra));

    let input = payload(zipkin_table());
    for dp_version in ["3.0.0", "3.0.1", "3.1.0.2", "3.0.0.0-enterprise-edition"] {
        let out = processor.process(dp_version, &input).unwrap();
        assert_eq!(out.payload, input, "{dp_version}");
        assert!(out.report.is_empty());
    }
}

#[test]
fn zipkin_fields_are_removed_for_older_planes() {
    let out = processor().process("2.8.0", &payload(zipkin_table())).unwrap();

    let table = table_of(&out.payload);
    let config = &table["plugins"][0]["config"];
    for field in ["http_span_name", "connect_timeout", "read_timeout", "send_timeout"] {
        assert!(config.get(field).is_none(), "{field} should be removed");
    }
    assert_eq!(config["sample_ratio"], json!(0.5));

    assert_eq!(out.report.change_ids().collect::<Vec<_>>(), vec!["P116"]);
    let resources = &out.report.get("P116").unwrap().resources;
    assert_eq!(resources, &vec![Resource::new("plugin", "z1")]);
}

#[test]
fn hashes_are_carried_forward() {
    let input = payload(zipkin_table());
    let out = processor().process("2.8.0", &input).unwrap();

    let before = Envelope::decode(&input).unwrap();
    let after = Envelope::decode(&out.payload).unwrap();
    assert_eq!(after.config_hash, CONFIG_HASH);
    assert_eq!(after.hashes, before.hashes);
    assert_eq!(after.kind, "reconfigure");
}

#[test]
fn benign_removal_is_not_reported() {
    let table = json!({
        "plugins": [{
            "id": "l1",
            "name": "aws-lambda",
            "config": {"function_name": "f", "base64_encode_body": true}
        }]
    });
    let out = processor().process("2.5.0", &payload(table)).unwrap();

    let table = table_of(&out.payload);
    assert!(table["plugins"][0]["config"].get("base64_encode_body").is_none());
    assert!(out.report.is_empty());
}

#[test]
fn non_default_removal_is_reported() {
    let table = json!({
        "plugins": [{
            "id": "l1",
            "name": "aws-lambda",
            "config": {"function_name": "f", "base64_encode_body": false}
        }]
    });
    let out = processor().process("2.5.0", &payload(table)).unwrap();

    assert_eq!(out.report.change_ids().collect::<Vec<_>>(), vec!["P101"]);
}

#[test]
fn vaults_are_removed_below_three() {
    let table = json!({
        "services": [{"id": "s1", "name": "svc", "host": "example.com"}],
        "vaults": [{"id": "v1", "name": "env", "prefix": "my-env", "config": {"prefix": "SECRET_"}}]
    });
    let input = payload(table);

    let old = processor().process("2.8.0", &input).unwrap();
    let old_table = table_of(&old.payload);
    assert!(old_table.get("vaults").is_none());
    assert!(old_table.get("services").is_some());
    let resources = &old.report.get("C101").unwrap().resources;
    assert_eq!(resources, &vec![Resource::new("vault", "v1")]);

    let current = processor().process("3.0.0", &input).unwrap();
    assert_eq!(table_of(&current.payload)["vaults"][0]["id"], json!("v1"));
}

#[test]
fn plugin_removal_keeps_other_plugins_in_order() {
    let table = json!({
        "plugins": [
            {"id": "a", "name": "cors", "config": {}},
            {"id": "b", "name": "opentelemetry", "config": {"endpoint": "http://otel"}},
            {"id": "c", "name": "key-auth", "config": {}}
        ]
    });
    let out = processor().process("2.8.0", &payload(table)).unwrap();

    let ids: Vec<_> = table_of(&out.payload)["plugins"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].clone())
        .collect();
    assert_eq!(ids, vec![json!("a"), json!("c")]);
    assert!(out.report.get("P120").is_some());
}

#[test]
fn array_elements_matching_predicate_are_removed() {
    let table = json!({
        "plugins": [{
            "id": "s1",
            "name": "statsd",
            "config": {
                "metrics": [
                    {"name": "request_count", "stat_type": "counter"},
                    {"name": "latency", "stat_type": "distribution"},
                    {"name": "request_size", "stat_type": "timer"}
                ]
            }
        }]
    });
    let out = processor().process("2.8.0", &payload(table)).unwrap();

    let metrics = table_of(&out.payload)["plugins"][0]["config"]["metrics"].clone();
    assert_eq!(
        metrics,
        json!([
            {"name": "request_count", "stat_type": "counter"},
            {"name": "request_size", "stat_type": "timer"}
        ])
    );
    assert!(out.report.get("P112").is_some());
}

#[test]
fn guarded_literal_update() {
    let table = json!({
        "upstreams": [
            {"id": "u1", "name": "a", "hash_on": "query_arg", "hash_on_query_arg": "user"},
            {"id": "u2", "name": "b", "hash_on": "ip"}
        ]
    });
    let out = processor().process("2.8.0", &payload(table)).unwrap();

    let upstreams = table_of(&out.payload)["upstreams"].clone();
    assert_eq!(upstreams[0]["hash_on"], json!("none"));
    assert!(upstreams[0].get("hash_on_query_arg").is_none());
    assert_eq!(upstreams[1]["hash_on"], json!("ip"));

    let touched = &out.report.get("C104").unwrap().resources;
    assert_eq!(touched, &vec![Resource::new("upstream", "u1")]);
}

#[test]
fn copy_respects_must_be_empty_and_empty_sources() {
    let table = json!({
        "plugins": [
            {"id": "p1", "name": "pre-function", "config": {"access": ["return"], "functions": []}},
            {"id": "p2", "name": "pre-function", "config": {"access": ["a"], "functions": ["keep"]}},
            {"id": "p3", "name": "pre-function", "config": {"access": []}}
        ]
    });
    let out = processor().process("2.8.0", &payload(table)).unwrap();

    let plugins = table_of(&out.payload)["plugins"].clone();
    assert_eq!(plugins[0]["config"]["functions"], json!(["return"]));
    assert_eq!(plugins[1]["config"]["functions"], json!(["keep"]));
    assert!(plugins[2]["config"].get("functions").is_none());

    let touched = &out.report.get("P117").unwrap().resources;
    assert_eq!(touched, &vec![Resource::new("plugin", "p1")]);
}

#[test]
fn processing_is_idempotent() {
    let processor = processor();
    let once = processor.process("2.8.0", &payload(zipkin_table())).unwrap();
    let twice = processor.process("2.8.0", &once.payload).unwrap();

    assert_eq!(table_of(&once.payload), table_of(&twice.payload));
    assert!(twice.report.is_empty());
}

#[test]
fn newer_planes_are_touched_by_a_subset_of_changes() {
    let table = json!({
        "services": [{"id": "s1", "name": "svc", "enabled": false}],
        "plugins": [
            {"id": "z1", "name": "zipkin", "config": {"http_span_name": "method"}},
            {"id": "l1", "name": "aws-lambda", "config": {"base64_encode_body": false}}
        ]
    });
    let input = payload(table);
    let processor = processor();

    let old: Vec<String> = processor
        .process("2.5.0", &input)
        .unwrap()
        .report
        .change_ids()
        .map(String::from)
        .collect();
    let newer: Vec<String> = processor
        .process("2.8.0", &input)
        .unwrap()
        .report
        .change_ids()
        .map(String::from)
        .collect();

    assert!(newer.iter().all(|id| old.contains(id)));
    assert!(old.len() > newer.len());
}

#[test]
fn extra_processor_replaces_the_table() {
    let mut extra = MockExtraProcessor::new();
    extra
        .expect_process()
        .withf(|document, dp_version, report| {
            dp_version == "2.8.0" && document.contains("zipkin") && report.get("P116").is_some()
        })
        .times(1)
        .returning(|_, _, _| Ok(r#"{"_format_version":"1.1","plugins":[]}"#.to_string()));

    let out = processor()
        .with_extra_processor(Arc::new(extra))
        .process("2.8.0", &payload(zipkin_table()))
        .unwrap();

    assert_eq!(table_of(&out.payload)["plugins"], json!([]));
}

#[test]
fn extra_processor_must_return_an_object() {
    let mut extra = MockExtraProcessor::new();
    extra.expect_process().returning(|_, _, _| Ok("[1, 2]".to_string()));

    let result = processor()
        .with_extra_processor(Arc::new(extra))
        .process("2.8.0", &payload(zipkin_table()));

    assert!(matches!(result, Err(CompatError::ExtraProcessingInvalid(_))));
}

#[test]
fn bad_inputs_fail_with_typed_errors() {
    let processor = processor();

    assert!(matches!(
        processor.process("two.eight", &payload(zipkin_table())),
        Err(CompatError::BadDataPlaneVersion(_))
    ));
    assert!(matches!(
        processor.process("2.8.0", &Bytes::from_static(b"not gzip")),
        Err(CompatError::CorruptPayload(_))
    ));

    let not_an_envelope = Bytes::from(crate::snapshot::envelope::gzip(br#"[1,2,3]"#).unwrap());
    assert!(matches!(
        processor.process("2.8.0", &not_an_envelope),
        Err(CompatError::InvalidDocument(_))
    ));
}

#[test]
fn malformed_section_skips_only_that_change() {
    let table = json!({
        "upstreams": {"oops": true},
        "plugins": [{"id": "z1", "name": "zipkin", "config": {"read_timeout": 1}}]
    });
    let out = processor().process("2.8.0", &payload(table)).unwrap();

    assert!(out.report.get("P116").is_some());
    assert_eq!(table_of(&out.payload)["upstreams"], json!({"oops": true}));
}

#[test]
fn one_change_filters_several_arrays() {
    let mut registry = ChangeRegistry::new();
    let change: ChangeSpec = serde_json::from_value(json!({
        "id": "P190",
        "severity": "warning",
        "description": "statsd metrics unsupported",
        "resolution": "upgrade",
        "version_ceiling": 3_000_000_000u64,
        "rule": {
            "type": "remove_elements",
            "plugin": "statsd",
            "filters": [
                {"field": "metrics", "predicate": "stat_type=distribution"},
                {"field": "extra_metrics", "predicate": "name=latency"}
            ]
        }
    }))
    .unwrap();
    registry.register(change).unwrap();
    let processor = CompatProcessor::new(Arc::new(registry), DataPlaneVersion::parse("3.0.0").unwrap());

    let table = json!({
        "plugins": [{
            "id": "s1",
            "name": "statsd",
            "config": {
                "metrics": [
                    {"name": "request_count", "stat_type": "counter"},
                    {"name": "upstream", "stat_type": "distribution"}
                ],
                "extra_metrics": [{"name": "latency"}, {"name": "status"}]
            }
        }]
    });
    let out = processor.process("2.8.0", &payload(table)).unwrap();

    let config = table_of(&out.payload)["plugins"][0]["config"].clone();
    assert_eq!(config["metrics"], json!([{"name": "request_count", "stat_type": "counter"}]));
    assert_eq!(config["extra_metrics"], json!([{"name": "status"}]));
    assert_eq!(out.report.get("P190").map(|e| e.resources.len()), Some(1));
}
