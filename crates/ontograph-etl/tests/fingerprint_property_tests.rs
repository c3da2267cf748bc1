//! Property-based tests for shape fingerprints.
//!
//! 1. Array length never changes the fingerprint
//! 2. Scalar values never change the fingerprint, only their types
//! 3. Key order never changes the fingerprint

use ontograph_etl::{shape_hash, shape_hash_with, ShapeHashOptions};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

// ============================================================================
// Strategies
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Kind {
    Str,
    Num,
    Bool,
}

fn kind_strategy() -> impl Strategy<Value = Kind> {
    prop_oneof![Just(Kind::Str), Just(Kind::Num), Just(Kind::Bool)]
}

fn field_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("[a-z]{1,8}", 1..6).prop_map(|s| s.into_iter().collect())
}

/// A value of `kind` drawn from `seed`.
fn sample(kind: Kind, seed: u32) -> Value {
    match kind {
        Kind::Str => json!(format!("v{seed}")),
        Kind::Num => json!(seed),
        Kind::Bool => json!(seed % 2 == 0),
    }
}

fn build(fields: &[(String, Kind)], items: &[(String, Kind)], len: usize, seed: u32) -> Value {
    let mut root = Map::new();
    for (i, (name, kind)) in fields.iter().enumerate() {
        root.insert(name.clone(), sample(*kind, seed.wrapping_add(i as u32)));
    }
    let elements: Vec<Value> = (0..len)
        .map(|n| {
            let mut el = Map::new();
            for (name, kind) in items {
                el.insert(name.clone(), sample(*kind, seed.wrapping_mul(31).wrapping_add(n as u32)));
            }
            Value::Object(el)
        })
        .collect();
    root.insert("items".to_string(), Value::Array(elements));
    Value::Object(root)
}

fn shape_strategy() -> impl Strategy<Value = (Vec<(String, Kind)>, Vec<(String, Kind)>)> {
    let fields = field_names().prop_flat_map(|names| {
        let n = names.len();
        (Just(names), prop::collection::vec(kind_strategy(), n))
    });
    let items = field_names().prop_flat_map(|names| {
        let n = names.len();
        (Just(names), prop::collection::vec(kind_strategy(), n))
    });
    (fields, items).prop_map(|((fnames, fkinds), (inames, ikinds))| {
        let fields = fnames
            .into_iter()
            .filter(|n| n != "items")
            .zip(fkinds)
            .collect();
        let items = inames.into_iter().zip(ikinds).collect();
        (fields, items)
    })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn array_length_does_not_matter(
        (fields, items) in shape_strategy(),
        a in 1usize..6,
        b in 1usize..6,
        seed in any::<u32>(),
    ) {
        let p1 = build(&fields, &items, a, seed);
        let p2 = build(&fields, &items, b, seed);
        prop_assert_eq!(shape_hash(&p1), shape_hash(&p2));
    }

    #[test]
    fn values_do_not_matter(
        (fields, items) in shape_strategy(),
        s1 in any::<u32>(),
        s2 in any::<u32>(),
    ) {
        let p1 = build(&fields, &items, 2, s1);
        let p2 = build(&fields, &items, 2, s2);
        prop_assert_eq!(shape_hash(&p1), shape_hash(&p2));
    }

    #[test]
    fn key_order_does_not_matter((fields, items) in shape_strategy(), seed in any::<u32>()) {
        let forward = build(&fields, &items, 1, seed);
        let mut reversed_fields = fields.clone();
        reversed_fields.reverse();
        let backward = build(&reversed_fields, &items, 1, seed);
        prop_assert_eq!(shape_hash(&forward), shape_hash(&backward));
    }

    #[test]
    fn stop_nodes_hide_their_subtree((fields, items) in shape_strategy(), seed in any::<u32>()) {
        let options = ShapeHashOptions { stop_nodes: vec!["items".to_string()], value_nodes: vec![] };
        let with_items = build(&fields, &items, 3, seed);
        let without_items = build(&fields, &[], 0, seed);
        prop_assert_eq!(
            shape_hash_with(&with_items, &options),
            shape_hash_with(&without_items, &options)
        );
    }
}
