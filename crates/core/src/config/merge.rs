use serde_json::Value;

/// Deep-merge `overrides` over a copy of `base`.
///
/// Keys missing from `base` are inserted as-is. Where both sides hold an
/// object the merge recurses; otherwise the override value replaces the base
/// value (arrays are replaced, never concatenated). `base` is left untouched.
#[must_use]
pub fn merge(base: &Value, overrides: &Value) -> Value {
  let mut merged = base.clone();
  merge_values(&mut merged, overrides.clone());
  merged
}

fn merge_values(base: &mut Value, overlay: Value) {
  match (base, overlay) {
    (Value::Object(base_map), Value::Object(overlay_map)) => {
      for (k, v) in overlay_map {
        match base_map.get_mut(&k) {
          Some(existing) => merge_values(existing, v),
          None => {
            base_map.insert(k, v);
          }
        }
      }
    }
    (base_slot, new_v) => *base_slot = new_v,
  }
}
