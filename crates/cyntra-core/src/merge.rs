// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deterministic deep merge for JSON-shaped data.
//!
//! Used for config `include:` composition and manifest overrides. Objects
//! merge recursively; everything else (arrays and scalars included) is
//! replaced by the override value.

use serde_json::Value;

/// Merge `overlay` onto `base`, returning the merged value.
///
/// The merge is associative on object-only inputs:
/// `deep_merge(a, deep_merge(b, c)) == deep_merge(deep_merge(a, b), c)`.
///
/// # Examples
///
/// ```
/// use cyntra_core::merge::deep_merge;
/// use serde_json::json;
///
/// let merged = deep_merge(
///     json!({"gates": {"test_command": "pytest", "retry_flaky": 2}}),
///     json!({"gates": {"test_command": "cargo test"}}),
/// );
/// assert_eq!(merged["gates"]["test_command"], "cargo test");
/// assert_eq!(merged["gates"]["retry_flaky"], 2);
/// ```
#[must_use]
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.remove(&key) {
                    Some(existing) => {
                        base_map.insert(key, deep_merge(existing, value));
                    }
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Merge `overlay` onto `base` in place.
pub fn deep_merge_into(base: &mut Value, overlay: Value) {
    let current = std::mem::replace(base, Value::Null);
    *base = deep_merge(current, overlay);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn scalar_replaced() {
        assert_eq!(deep_merge(json!(1), json!(2)), json!(2));
        assert_eq!(deep_merge(json!("a"), json!(null)), json!(null));
    }

    #[test]
    fn lists_replaced_not_merged() {
        let merged = deep_merge(json!({"use": ["codex", "claude"]}), json!({"use": ["crush"]}));
        assert_eq!(merged["use"], json!(["crush"]));
    }

    #[test]
    fn nested_objects_merge_recursively() {
        let merged = deep_merge(
            json!({"a": {"b": {"c": 1, "d": 2}}, "keep": true}),
            json!({"a": {"b": {"c": 9}}}),
        );
        assert_eq!(merged, json!({"a": {"b": {"c": 9, "d": 2}}, "keep": true}));
    }

    #[test]
    fn object_replaces_scalar_and_vice_versa() {
        assert_eq!(
            deep_merge(json!({"x": 1}), json!({"x": {"y": 2}})),
            json!({"x": {"y": 2}})
        );
        assert_eq!(
            deep_merge(json!({"x": {"y": 2}}), json!({"x": 1})),
            json!({"x": 1})
        );
    }

    #[test]
    fn merge_into_matches_owned_merge() {
        let mut base = json!({"a": 1, "b": {"c": 2}});
        deep_merge_into(&mut base, json!({"b": {"d": 3}}));
        assert_eq!(base, json!({"a": 1, "b": {"c": 2, "d": 3}}));
    }

    // Associativity holds when no key flips between object and scalar
    // across the inputs (a scalar in the middle input would discard keys
    // the left input contributed). Flat scalar maps exercise the law
    // without manufacturing that conflict.
    fn flat_obj_strategy() -> impl Strategy<Value = serde_json::Value> {
        proptest::collection::btree_map("[a-d]{1,3}", any::<i64>(), 0..6)
            .prop_map(|m| serde_json::to_value(m).unwrap())
    }

    fn nested_obj_strategy() -> impl Strategy<Value = serde_json::Value> {
        proptest::collection::btree_map(
            "[a-d]{1,3}",
            prop_oneof![
                any::<i64>().prop_map(|n| json!(n)),
                "[a-z]{0,4}".prop_map(|s| json!(s)),
                proptest::collection::btree_map("[a-b]{1,2}", any::<i64>(), 0..3)
                    .prop_map(|m| serde_json::to_value(m).unwrap()),
            ],
            0..5,
        )
        .prop_map(|m| serde_json::to_value(m).unwrap())
    }

    proptest! {
        #[test]
        fn merge_is_associative_on_flat_objects(
            a in flat_obj_strategy(),
            b in flat_obj_strategy(),
            c in flat_obj_strategy(),
        ) {
            let left = deep_merge(a.clone(), deep_merge(b.clone(), c.clone()));
            let right = deep_merge(deep_merge(a, b), c);
            prop_assert_eq!(left, right);
        }

        #[test]
        fn merge_is_right_biased_on_flat_objects(
            a in flat_obj_strategy(),
            b in flat_obj_strategy(),
        ) {
            let merged = deep_merge(a, b.clone());
            for (key, value) in b.as_object().unwrap() {
                prop_assert_eq!(&merged[key], value);
            }
        }

        #[test]
        fn empty_object_is_identity(a in nested_obj_strategy()) {
            prop_assert_eq!(deep_merge(a.clone(), json!({})), a.clone());
            prop_assert_eq!(deep_merge(json!({}), a.clone()), a);
        }
    }
}
