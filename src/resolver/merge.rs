//! Deep-default merge of JSON documents.

use serde_json::Value;

/// Fill what `target` lacks from `source`.
///
/// Values already present in `target` win, including explicit `null`.
/// Objects present on both sides merge key by key and arrays index by
/// index: elements past the end of the target array are appended from the
/// source. A type mismatch keeps the target value.
pub fn deep_default_merge(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, incoming) in source {
                match target.get_mut(key) {
                    Some(existing) => deep_default_merge(existing, incoming),
                    None => {
                        target.insert(key.clone(), incoming.clone());
                    }
                }
            }
        }
        (Value::Array(target), Value::Array(source)) => {
            for (index, incoming) in source.iter().enumerate() {
                match target.get_mut(index) {
                    Some(existing) => deep_default_merge(existing, incoming),
                    None => target.push(incoming.clone()),
                }
            }
        }
        _ => {}
    }
}

/// Merge `sources` into `base` in priority order: `base` first, then each
/// source before the ones after it.
pub fn merge_all<'a>(mut base: Value, sources: impl IntoIterator<Item = &'a Value>) -> Value {
    for source in sources {
        deep_default_merge(&mut base, source);
    }
    base
}
