//! Property-based tests for the key schema compiler.
//!
//! 1. Applying a schema to its own output succeeds and changes nothing
//! 2. Defaults never overwrite a value that was supplied
//! 3. Keys without validation never produce `ValidationFailed`

use ontograph_schema::{CompiledSchema, DataType, KeyValidation, PropertyKey, SchemaError};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

// ============================================================================
// Strategies
// ============================================================================

fn data_type_strategy() -> impl Strategy<Value = DataType> {
    prop_oneof![
        Just(DataType::Number),
        Just(DataType::Date),
        Just(DataType::String),
        Just(DataType::Boolean),
        Just(DataType::Enumeration),
        Just(DataType::File),
        Just(DataType::List),
        Just(DataType::Unknown),
    ]
}

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(|n| json!(n)),
        "[a-z0-9]{0,6}".prop_map(Value::String),
        prop_oneof![Just("red".to_string()), Just("blue".to_string())].prop_map(Value::String),
        prop::collection::vec(0i64..10, 0..3).prop_map(|v| json!(v)),
    ]
}

fn default_strategy() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        Just(None),
        Just(Some(json!("12"))),
        Just(Some(json!("t"))),
        Just(Some(json!("red"))),
        Just(Some(json!("not a number"))),
    ]
}

fn validation_strategy() -> impl Strategy<Value = Option<KeyValidation>> {
    prop_oneof![
        Just(None),
        (0.0f64..5.0, 5.0f64..50.0).prop_map(|(min, max)| Some(KeyValidation {
            regex: None,
            min: Some(min),
            max: Some(max),
        })),
        Just(Some(KeyValidation {
            regex: Some("^[a-z0-9]*$".to_string()),
            min: None,
            max: None,
        })),
    ]
}

fn key_strategy() -> impl Strategy<Value = (DataType, bool, Option<Value>, Option<KeyValidation>)> {
    (
        data_type_strategy(),
        any::<bool>(),
        default_strategy(),
        validation_strategy(),
    )
}

fn keys_strategy() -> impl Strategy<Value = Vec<PropertyKey>> {
    prop::collection::vec(key_strategy(), 0..6).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (data_type, required, default, validation))| {
                let name = format!("k{i}");
                let mut key = PropertyKey::new(name.clone(), name, data_type);
                key.required = required;
                key.default_value = default;
                key.validation = validation;
                if data_type == DataType::Enumeration {
                    key.options = Some(vec!["red".to_string(), "blue".to_string()]);
                }
                key
            })
            .collect()
    })
}

fn payload_strategy() -> impl Strategy<Value = Value> {
    prop::collection::vec(prop::option::of(value_strategy()), 6).prop_map(|slots| {
        let mut map = Map::new();
        for (i, slot) in slots.into_iter().enumerate() {
            if let Some(v) = slot {
                map.insert(format!("k{i}"), v);
            }
        }
        Value::Object(map)
    })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn apply_is_idempotent(keys in keys_strategy(), payload in payload_strategy()) {
        let schema = CompiledSchema::compile(&keys).unwrap();
        if let Ok(first) = schema.apply(&payload) {
            let second = schema.apply(&Value::Object(first.clone()));
            prop_assert!(second.is_ok(), "re-validation failed: {:?}", second);
            prop_assert_eq!(second.unwrap(), first);
        }
    }

    #[test]
    fn defaults_never_overwrite_supplied_values(keys in keys_strategy(), payload in payload_strategy()) {
        let schema = CompiledSchema::compile(&keys).unwrap();
        if let Ok(out) = schema.apply(&payload) {
            let input = payload.as_object().unwrap();
            for (name, value) in input {
                prop_assert_eq!(out.get(name), Some(value));
            }
        }
    }

    #[test]
    fn unvalidated_keys_never_fail_validation(keys in keys_strategy(), payload in payload_strategy()) {
        let keys: Vec<PropertyKey> = keys
            .into_iter()
            .map(|mut k| { k.validation = None; k })
            .collect();
        let schema = CompiledSchema::compile(&keys).unwrap();
        let result = schema.apply(&payload);
        prop_assert!(
            !matches!(result, Err(SchemaError::ValidationFailed { .. })),
            "unexpected validation failure: {:?}",
            result
        );
    }
}
