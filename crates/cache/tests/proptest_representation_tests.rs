//! Property-based tests for the value representation codec.
//!
//! - Round-trip: deserialize(serialize(v)) == v for nested values
//! - Serialized values without paths are always valid
//! - Serialization is deterministic, including side file names

use proptest::prelude::*;
use simmer_cache::{deserialize, is_valid, serialize};
use simmer_core::{Fingerprinter, Value};
use tempfile::TempDir;

fn leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::None),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        any::<f64>().prop_map(Value::Float),
        ".{0,12}".prop_map(Value::Str),
        proptest::collection::vec(any::<u8>(), 0..32).prop_map(Value::Bytes),
    ]
}

fn value_strategy() -> impl Strategy<Value = Value> {
    leaf_strategy().prop_recursive(3, 32, 5, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..5).prop_map(Value::List),
            proptest::collection::vec((inner.clone(), inner), 0..4).prop_map(Value::Map),
        ]
    })
}

proptest! {
    #[test]
    fn round_trip_preserves_structure(value in value_strategy()) {
        let tmp = TempDir::new().unwrap();
        let hasher = Fingerprinter::default();
        let repr = serialize(&value, tmp.path(), &hasher).unwrap();
        let back = deserialize(&repr, tmp.path(), &hasher).unwrap();
        prop_assert_eq!(back, value);
    }

    #[test]
    fn round_trip_preserves_fingerprint(value in value_strategy()) {
        let tmp = TempDir::new().unwrap();
        let hasher = Fingerprinter::default();
        let repr = serialize(&value, tmp.path(), &hasher).unwrap();
        let back = deserialize(&repr, tmp.path(), &hasher).unwrap();
        prop_assert_eq!(hasher.fingerprint(&back).unwrap(), hasher.fingerprint(&value).unwrap());
    }

    #[test]
    fn pathless_values_stay_valid(value in value_strategy()) {
        let tmp = TempDir::new().unwrap();
        let hasher = Fingerprinter::default();
        let repr = serialize(&value, tmp.path(), &hasher).unwrap();
        prop_assert!(is_valid(&repr, &hasher));
    }

    #[test]
    fn serialization_is_deterministic(value in value_strategy()) {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let hasher = Fingerprinter::default();
        prop_assert_eq!(
            serialize(&value, first.path(), &hasher).unwrap(),
            serialize(&value, second.path(), &hasher).unwrap()
        );
    }
}
