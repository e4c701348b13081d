//! Property-based tests for fingerprint stability.
//!
//! - Determinism: the same value always produces the same fingerprint
//! - Structural equality implies equal fingerprints
//! - Sensitivity: changing a leaf changes the fingerprint
//! - Function fingerprints ignore names but follow defaults and captures

use proptest::prelude::*;
use simmer_core::{Fingerprinter, Function, Value};

fn leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::None),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        (-1.0e9..1.0e9f64).prop_map(Value::Float),
        "[a-z0-9 _-]{0,12}".prop_map(Value::Str),
        proptest::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
    ]
}

fn value_strategy() -> impl Strategy<Value = Value> {
    leaf_strategy().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::List),
            proptest::collection::vec((inner.clone(), inner), 0..4).prop_map(Value::Map),
        ]
    })
}

fn noop(name: &str) -> Function {
    Function::new(name, |_| Ok(Value::None))
}

proptest! {
    #[test]
    fn fingerprint_is_deterministic(value in value_strategy()) {
        let hasher = Fingerprinter::default();
        let first = hasher.fingerprint(&value).unwrap();
        let second = hasher.fingerprint(&value.clone()).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn equal_values_fingerprint_equal(a in value_strategy(), b in value_strategy()) {
        let hasher = Fingerprinter::default();
        if a == b {
            prop_assert_eq!(hasher.fingerprint(&a).unwrap(), hasher.fingerprint(&b).unwrap());
        }
    }

    #[test]
    fn appending_changes_list_fingerprint(items in proptest::collection::vec(leaf_strategy(), 0..8), extra in leaf_strategy()) {
        let hasher = Fingerprinter::default();
        let base = Value::List(items.clone());
        let mut longer = items;
        longer.push(extra);
        prop_assert_ne!(
            hasher.fingerprint(&base).unwrap(),
            hasher.fingerprint(&Value::List(longer)).unwrap()
        );
    }

    #[test]
    fn distinct_ints_fingerprint_distinct(a in any::<i64>(), b in any::<i64>()) {
        prop_assume!(a != b);
        let hasher = Fingerprinter::default();
        prop_assert_ne!(
            hasher.fingerprint(&Value::Int(a)).unwrap(),
            hasher.fingerprint(&Value::Int(b)).unwrap()
        );
    }

    #[test]
    fn function_name_never_matters(
        first in "[a-z_]{1,10}",
        second in "[a-z_]{1,10}",
        captured in value_strategy(),
    ) {
        let hasher = Fingerprinter::default();
        let a = noop(&first).capture("state", captured.clone());
        let b = noop(&second).capture("state", captured);
        prop_assert_eq!(
            hasher.fingerprint_function(&a).unwrap(),
            hasher.fingerprint_function(&b).unwrap()
        );
    }

    #[test]
    fn changing_a_default_changes_function(a in any::<i64>(), b in any::<i64>()) {
        prop_assume!(a != b);
        let hasher = Fingerprinter::default();
        prop_assert_ne!(
            hasher.fingerprint_function(&noop("f").default_arg("n", a)).unwrap(),
            hasher.fingerprint_function(&noop("f").default_arg("n", b)).unwrap()
        );
    }
}
