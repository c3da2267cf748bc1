use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn ontograph_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ontograph"))
}

fn write(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

fn run(args: &[&str]) -> Output {
    Command::new(ontograph_bin())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run ontograph")
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "ontograph failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

fn garage() -> Value {
    json!({
        "owner": {"id": 17, "name": "Ada"},
        "cars": [{"vin": "V1", "make": "Volvo"}, {"vin": "V2", "make": "Saab"}]
    })
}

fn ontology() -> Value {
    json!({
        "metatypes": [
            {"id": "mt-person", "name": "Person", "keys": [
                {"id": "k-name", "name": "Name", "property_name": "name", "data_type": "string", "required": true}
            ]},
            {"id": "mt-car", "name": "Car", "keys": [
                {"id": "k-vin", "name": "VIN", "property_name": "vin", "data_type": "string", "required": true},
                {"id": "k-make", "name": "Make", "property_name": "make", "data_type": "string"}
            ]}
        ],
        "relationships": [{"id": "rel-owns", "name": "owns"}],
        "pairs": [{
            "id": "p-owns", "name": "person owns car",
            "origin_metatype_id": "mt-person", "destination_metatype_id": "mt-car",
            "relationship_id": "rel-owns", "relationship_type": "one:many"
        }]
    })
}

fn mapping() -> Value {
    json!({
        "id": "m1",
        "container_id": "c1",
        "data_source_id": "d1",
        "sample_payload": garage(),
        "active": true,
        "transformations": [
            {
                "id": "t-person", "metatype_id": "mt-person",
                "unique_identifier_key": "owner.id",
                "keys": [{"key": "owner.name", "metatype_key_id": "k-name"}]
            },
            {
                "id": "t-car", "metatype_id": "mt-car", "root_array": "cars[]",
                "unique_identifier_key": "cars[].vin",
                "keys": [
                    {"key": "cars[].vin", "metatype_key_id": "k-vin"},
                    {"key": "cars[].make", "metatype_key_id": "k-make"}
                ]
            },
            {
                "id": "t-owns", "metatype_relationship_pair_id": "p-owns", "root_array": "cars[]",
                "unique_identifier_key": "cars[].vin",
                "origin_id_key": "owner.id", "destination_id_key": "cars[].vin"
            }
        ]
    })
}

#[test]
fn fingerprint_ignores_values_and_array_length() {
    let dir = TempDir::new().unwrap();
    let a = write(dir.path(), "a.json", &garage());
    let mut other = garage();
    other["cars"] = json!([{"vin": "V9", "make": "Fiat"}]);
    let b = write(dir.path(), "b.json", &other);

    let hash = |path: &Path| {
        let output = run(&["fingerprint", path.to_str().unwrap()]);
        assert!(output.status.success());
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    };
    assert_eq!(hash(&a), hash(&b));

    let discriminated = run(&[
        "fingerprint",
        b.to_str().unwrap(),
        "--value-node",
        "make",
    ]);
    assert!(discriminated.status.success());
    assert_ne!(String::from_utf8(discriminated.stdout).unwrap().trim(), hash(&b));
}

#[test]
fn validate_applies_defaults_and_rejects_bad_enums() {
    let dir = TempDir::new().unwrap();
    let keys = write(
        dir.path(),
        "keys.json",
        &json!([{
            "name": "Color", "property_name": "color", "data_type": "enumeration",
            "options": ["red", "blue"], "default_value": "red"
        }]),
    );

    let empty = write(dir.path(), "empty.json", &json!({}));
    let out = stdout_json(&run(&["validate", "--keys", keys.to_str().unwrap(), empty.to_str().unwrap()]));
    assert_eq!(out, json!({"color": "red"}));

    let green = write(dir.path(), "green.json", &json!({"color": "green"}));
    let output = run(&["validate", "--keys", keys.to_str().unwrap(), green.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn transform_is_a_dry_run() {
    let dir = TempDir::new().unwrap();
    let ontology = write(dir.path(), "ontology.json", &ontology());
    let mapping = write(dir.path(), "mapping.json", &mapping());
    let payload = write(dir.path(), "payload.json", &garage());

    let out = stdout_json(&run(&[
        "transform",
        "--ontology",
        ontology.to_str().unwrap(),
        "--mapping",
        mapping.to_str().unwrap(),
        payload.to_str().unwrap(),
    ]));

    let results = out.as_array().unwrap();
    assert_eq!(results.len(), 3);
    let cars = &results[1];
    assert_eq!(cars["transformation"], "t-car");
    assert_eq!(cars["records"].as_array().unwrap().len(), 2);
    assert_eq!(
        cars["records"][1]["record"]["composite_original_id"],
        "c1+d1+cars[].vin+V2"
    );
    assert_eq!(cars["records"][1]["index"], json!([1]));
}

#[test]
fn ingest_twice_keeps_one_copy() {
    let dir = TempDir::new().unwrap();
    let ontology = write(dir.path(), "ontology.json", &ontology());
    let mapping = write(dir.path(), "mapping.json", &mapping());
    let payload = write(dir.path(), "payload.json", &garage());

    let out = stdout_json(&run(&[
        "--log-level",
        "info",
        "ingest",
        "--ontology",
        ontology.to_str().unwrap(),
        "--mapping",
        mapping.to_str().unwrap(),
        payload.to_str().unwrap(),
        payload.to_str().unwrap(),
    ]));

    assert_eq!(out["reports"].as_array().unwrap().len(), 2);
    assert_eq!(out["reports"][1]["failures"], json!([]));
    assert_eq!(out["graph"]["nodes"].as_array().unwrap().len(), 3);
    assert_eq!(out["graph"]["edges"].as_array().unwrap().len(), 2);
}

#[test]
fn ingest_refuses_a_different_shape() {
    let dir = TempDir::new().unwrap();
    let ontology = write(dir.path(), "ontology.json", &ontology());
    let mapping = write(dir.path(), "mapping.json", &mapping());
    let payload = write(dir.path(), "payload.json", &json!({"unrelated": true}));

    let output = run(&[
        "ingest",
        "--ontology",
        ontology.to_str().unwrap(),
        "--mapping",
        mapping.to_str().unwrap(),
        payload.to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("shape"));
}

#[test]
fn config_file_relaxes_shape_check() {
    let dir = TempDir::new().unwrap();
    let ontology = write(dir.path(), "ontology.json", &ontology());
    let mapping = write(dir.path(), "mapping.json", &mapping());
    let payload = write(dir.path(), "payload.json", &json!({"unrelated": true}));
    let config = write(
        dir.path(),
        "config.json",
        &json!({"ingest": {"require_shape_match": false}}),
    );

    let out = stdout_json(&run(&[
        "--config",
        config.to_str().unwrap(),
        "ingest",
        "--ontology",
        ontology.to_str().unwrap(),
        "--mapping",
        mapping.to_str().unwrap(),
        payload.to_str().unwrap(),
    ]));
    assert_eq!(out["graph"]["nodes"], json!([]));
}
