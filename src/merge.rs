use std::collections::BTreeMap;

use crate::value::Value;

/// Deep-merge `overlay` on top of `base`.
/// If both sides have a Map for the same key, recurse.
/// A `Null` overlay keeps whatever `base` has.
/// Otherwise, `overlay`'s value wins.
///
/// Keys match ASCII case-insensitively and keep `base`'s spelling, so a
/// lower-cased store key lands on a `maxBackups`-style default key.
pub fn deep_merge(mut base: BTreeMap<String, Value>, overlay: BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    for (key, overlay_val) in overlay {
        let key = matching_key(&base, &key).unwrap_or(key);
        match (base.remove(&key), overlay_val) {
            (Some(Value::Map(base_map)), Value::Map(overlay_map)) => {
                base.insert(key, Value::Map(deep_merge(base_map, overlay_map)));
            }
            (Some(base_val), Value::Null) => {
                base.insert(key, base_val);
            }
            (_, overlay_val) => {
                base.insert(key, overlay_val);
            }
        }
    }
    base
}

fn matching_key(map: &BTreeMap<String, Value>, key: &str) -> Option<String> {
    if map.contains_key(key) {
        return None;
    }
    map.keys().find(|k| k.eq_ignore_ascii_case(key)).cloned()
}

/// Insert `value` at the dotted `key`, creating intermediate maps and
/// replacing any scalar that stands in the way.
pub fn insert_dotted(map: &mut BTreeMap<String, Value>, key: &str, value: Value) {
    let mut segments = key.split('.');
    let Some(first) = segments.next() else {
        return;
    };
    let rest: Vec<&str> = segments.collect();
    insert_segments(map, first, &rest, value);
}

fn insert_segments(map: &mut BTreeMap<String, Value>, head: &str, rest: &[&str], value: Value) {
    let Some((next, tail)) = rest.split_first() else {
        map.insert(head.to_string(), value);
        return;
    };
    let slot = map
        .entry(head.to_string())
        .or_insert_with(|| Value::Map(BTreeMap::new()));
    if !matches!(slot, Value::Map(_)) {
        *slot = Value::Map(BTreeMap::new());
    }
    if let Value::Map(sub) = slot {
        insert_segments(sub, next, tail, value);
    }
}
