//! Golden vector tests for canonical JSON.
//!
//! Plan fingerprints and derived idempotency keys are hashes of this
//! encoding, so any change in output here changes every stored checkpoint
//! key. The expected strings match
//! `json.dumps(value, sort_keys=True, separators=(',', ':'), ensure_ascii=False)`.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use ignite_core::canonical_json::{CanonicalJsonError, to_canonical_bytes, to_canonical_string};
use serde_json::{Value, json};

struct Vector {
    name: &'static str,
    input: Value,
    expected_canonical: &'static str,
}

fn vectors() -> Vec<Vector> {
    vec![
        Vector {
            name: "nested_objects_sorted",
            input: json!({"b": 1, "a": {"d": [3, {"z": true, "y": null}], "c": "x"}}),
            expected_canonical: r#"{"a":{"c":"x","d":[3,{"y":null,"z":true}]},"b":1}"#,
        },
        Vector {
            name: "array_order_preserved",
            input: json!(["USDT", "USDC", "WBTC"]),
            expected_canonical: r#"["USDT","USDC","WBTC"]"#,
        },
        Vector {
            name: "utf8_keys_sort_by_bytes",
            input: json!({"é": "ü", "a": "\n"}),
            expected_canonical: "{\"a\":\"\\n\",\"é\":\"ü\"}",
        },
        Vector {
            name: "integer_extremes",
            input: json!({"n": -5, "m": u64::MAX}),
            expected_canonical: r#"{"m":18446744073709551615,"n":-5}"#,
        },
        Vector {
            name: "tagged_param_value",
            input: json!({"value": "1000000000000000000000", "type": "amount"}),
            expected_canonical: r#"{"type":"amount","value":"1000000000000000000000"}"#,
        },
        Vector {
            name: "empty_containers",
            input: json!({"steps": [], "roles": {}}),
            expected_canonical: r#"{"roles":{},"steps":[]}"#,
        },
    ]
}

#[test]
fn canonical_json_golden_vectors() {
    for vector in vectors() {
        let canonical = to_canonical_string(&vector.input)
            .unwrap_or_else(|e| panic!("Failed to canonicalize '{}': {}", vector.name, e));
        assert_eq!(
            canonical, vector.expected_canonical,
            "vector '{}' mismatch:\n  got:      {}\n  expected: {}",
            vector.name, canonical, vector.expected_canonical
        );
        assert_eq!(
            to_canonical_bytes(&vector.input).unwrap(),
            vector.expected_canonical.as_bytes()
        );
    }
}

#[test]
fn floats_are_rejected_with_their_path() {
    let err = to_canonical_string(&json!({"params": [1, 2.5]})).unwrap_err();
    match err {
        CanonicalJsonError::FloatNotAllowed { path } => assert_eq!(path, "/params/1"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn key_order_of_the_input_does_not_matter() {
    let a: Value = serde_json::from_str(r#"{"operator":"0xOP","name":"x","steps":[]}"#).unwrap();
    let b: Value = serde_json::from_str(r#"{"steps":[],"name":"x","operator":"0xOP"}"#).unwrap();
    assert_eq!(to_canonical_string(&a).unwrap(), to_canonical_string(&b).unwrap());
}
