//! Integration tests for the complete Ontograph pipeline
//!
//! These tests run across crates:
//! - Ontology keys → compiled schema → validated properties
//! - Payload → fingerprint → mapping selection
//! - Mapping → transformation → cardinality → committed graph
//!
//! Run with: cargo test --test integration_tests

use ontograph_etl::{
    Condition, KeyMapping, Operator, StagedData, TransformationConfig, TypeMapping,
    TypeTransformation,
};
use ontograph_schema::{
    Cardinality, DataType, Metatype, MetatypeRelationship, MetatypeRelationshipPair,
    OntologySnapshot, PropertyKey, SchemaError,
};
use ontograph_storage::{
    CardinalityError, Endpoint, Ingestor, MemoryGraph, MemoryOntology, RecordError,
};
use serde_json::{json, Value};
use std::sync::Arc;

// ============================================================================
// Fixtures
// ============================================================================

fn fleet_ontology() -> Arc<MemoryOntology> {
    let mut car = Metatype::new("", "Car", "").with_id("mt-car");
    car.add_key(PropertyKey::new("Car id", "car_id", DataType::String).required().with_id("k-car-id"));

    let mut maintenance = Metatype::new("", "Maintenance", "").with_id("mt-maint");
    maintenance.add_key(PropertyKey::new("Kind", "kind", DataType::String).required().with_id("k-kind"));
    maintenance.add_key(PropertyKey::new("Serviced", "serviced", DataType::Date).with_id("k-serviced"));

    Arc::new(MemoryOntology::from_snapshot(
        "c1",
        OntologySnapshot {
            metatypes: vec![car, maintenance],
            relationships: vec![MetatypeRelationship::new("", "performed on", "").with_id("rel-on")],
            pairs: vec![MetatypeRelationshipPair::new(
                "",
                "maintenance performed on car",
                "mt-maint",
                "mt-car",
                "rel-on",
                Cardinality::ManyToOne,
            )
            .with_id("p-on")],
        },
    ))
}

fn fleet(shared_record: bool) -> Value {
    let second = if shared_record { "M1" } else { "M3" };
    json!({
        "fleet": "north",
        "cars": [
            {"id": "C1", "maintenance": [
                {"id": "M1", "kind": "oil", "date": "2024-03-01"},
                {"id": "M2", "kind": "tires", "date": "2024-04-01"}
            ]},
            {"id": "C2", "maintenance": [
                {"id": second, "kind": "brakes", "date": "2024-05-01"}
            ]}
        ]
    })
}

fn fleet_mapping() -> TypeMapping {
    let mut mapping = TypeMapping::new("c1", "d1", fleet(false)).activate();
    mapping.add_transformation(
        TypeTransformation::node("c1", "mt-car")
            .with_id("t-car")
            .with_root_array("cars[]")
            .with_unique_key("cars[].id")
            .with_key(KeyMapping::metatype("cars[].id", "k-car-id")),
    );

    let mut maintenance = TypeTransformation::node("c1", "mt-maint")
        .with_id("t-maint")
        .with_root_array("cars[].maintenance[]")
        .with_unique_key("cars[].maintenance[].id")
        .with_key(KeyMapping::metatype("cars[].maintenance[].kind", "k-kind"))
        .with_key(KeyMapping::metatype("cars[].maintenance[].date", "k-serviced"));
    maintenance.config = TransformationConfig {
        convert_values: true,
        ..TransformationConfig::default()
    };
    mapping.add_transformation(maintenance);

    mapping.add_transformation(
        TypeTransformation::edge("c1", "p-on", "cars[].maintenance[].id", "cars[].id")
            .with_id("t-on")
            .with_root_array("cars[].maintenance[]"),
    );
    mapping
}

// ============================================================================
// Schema
// ============================================================================

#[test]
fn test_enumeration_default_and_rejection() {
    let mut thing = Metatype::new("c1", "Thing", "").with_id("mt-thing");
    thing.add_key(
        PropertyKey::new("Color", "color", DataType::Enumeration)
            .with_options(["red", "blue"])
            .with_default("red"),
    );

    let filled = thing.validate_properties(&json!({})).unwrap();
    assert_eq!(Value::Object(filled), json!({"color": "red"}));

    let err = thing.validate_properties(&json!({"color": "green"})).unwrap_err();
    match err {
        SchemaError::SchemaMismatch { mismatches } => {
            assert_eq!(mismatches.len(), 1);
            assert_eq!(mismatches[0].field, "color");
        }
        other => panic!("expected a schema mismatch, got {other:?}"),
    }
}

// ============================================================================
// Mapping selection
// ============================================================================

#[test]
fn test_fingerprint_selects_the_mapping() {
    let orders = TypeMapping::new("c1", "d1", json!({"order": {"id": 1, "lines": [{"sku": "a"}]}}))
        .activate();
    let fleet = fleet_mapping();
    let mappings = [orders, fleet];

    let payload = json!({
        "fleet": "south",
        "cars": [{"id": "C9", "maintenance": [{"id": "M9", "kind": "wash", "date": "2024-01-01"}]}]
    });
    let selected = mappings.iter().find(|m| m.matches(&payload)).unwrap();
    assert_eq!(selected.transformations.len(), 3);

    let unknown = json!({"fleet": 7});
    assert!(mappings.iter().all(|m| !m.matches(&unknown)));
}

// ============================================================================
// End to end
// ============================================================================

#[tokio::test]
async fn test_nested_fleet_is_ingested() {
    let graph = MemoryGraph::new();
    let ingestor = Ingestor::new(graph.clone(), fleet_ontology());

    let report = ingestor
        .ingest(&fleet_mapping(), &StagedData::new("d1", fleet(false)))
        .await
        .unwrap();

    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.nodes.len(), 5);
    assert_eq!(report.edges.len(), 3);

    let nodes = graph.nodes().await;
    let m2 = nodes
        .iter()
        .find(|n| n.composite_original_id.as_deref() == Some("c1+d1+cars[].maintenance[].id+M2"))
        .unwrap();
    assert_eq!(m2.properties.get("kind"), Some(&json!("tires")));
    assert_eq!(m2.properties.get("serviced"), Some(&json!("2024-04-01T00:00:00.000Z")));
    assert!(!m2.metadata.conversions.is_empty());

    let c1 = nodes
        .iter()
        .find(|n| n.properties.get("car_id") == Some(&json!("C1")))
        .unwrap();
    let into_c1 = graph
        .edges()
        .await
        .into_iter()
        .filter(|e| e.destination_node_id == c1.id)
        .count();
    assert_eq!(into_c1, 2);
}

#[tokio::test]
async fn test_shared_record_violates_many_to_one() {
    let graph = MemoryGraph::new();
    let ingestor = Ingestor::new(graph.clone(), fleet_ontology());

    let report = ingestor
        .ingest(&fleet_mapping(), &StagedData::new("d1", fleet(true)))
        .await
        .unwrap();

    // M1 is one node, performed on C1 first; the second claim is refused.
    assert_eq!(graph.nodes().await.len(), 4);
    assert_eq!(report.edges.len(), 2);
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.transformation_id.as_deref(), Some("t-on"));
    assert_eq!(failure.index, vec![1, 0]);
    assert!(matches!(
        failure.error,
        RecordError::Cardinality(CardinalityError::CardinalityViolation {
            cardinality: Cardinality::ManyToOne,
            endpoint: Endpoint::Origin,
            ..
        })
    ));
}

#[tokio::test]
async fn test_conditions_gate_branches_end_to_end() {
    let mut product = Metatype::new("", "Product", "").with_id("mt-product");
    product.add_key(PropertyKey::new("SKU", "sku", DataType::String).with_id("k-sku"));
    product.add_key(PropertyKey::new("Quantity", "qty", DataType::Number).with_id("k-qty"));
    let ontology = Arc::new(MemoryOntology::from_snapshot(
        "c1",
        OntologySnapshot {
            metatypes: vec![product],
            ..OntologySnapshot::default()
        },
    ));

    let payload = json!({"items": [
        {"sku": "abc", "qty": 2},
        {"sku": "def", "qty": 0},
        {"sku": "ghi", "qty": 5}
    ]});
    let mut mapping = TypeMapping::new("c1", "d1", payload.clone()).activate();
    mapping.add_transformation(
        TypeTransformation::node("c1", "mt-product")
            .with_root_array("items[]")
            .with_unique_key("items[].sku")
            .with_key(KeyMapping::metatype("items[].sku", "k-sku"))
            .with_key(KeyMapping::metatype("items[].qty", "k-qty"))
            .with_condition(Condition::new("items[].qty", Operator::Gt, 0)),
    );

    let graph = MemoryGraph::new();
    let report = Ingestor::new(graph.clone(), ontology)
        .ingest(&mapping, &StagedData::new("d1", payload))
        .await
        .unwrap();

    assert!(report.failures.is_empty());
    let mut composites: Vec<_> = graph
        .nodes()
        .await
        .into_iter()
        .filter_map(|n| n.composite_original_id)
        .collect();
    composites.sort();
    assert_eq!(
        composites,
        vec!["c1+d1+items[].sku+abc".to_string(), "c1+d1+items[].sku+ghi".to_string()]
    );
}
