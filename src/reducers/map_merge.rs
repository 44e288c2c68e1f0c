use super::Reducer;
use serde_json::Value;

/// Shallow JSON-object merge: keys in the incoming write overwrite keys of
/// the same name in the prior object; other keys are preserved.
#[derive(Debug, Default, Clone, Copy)]
pub struct MapMerge;

impl Reducer for MapMerge {
    fn apply(&self, channel: &str, prior: Option<&Value>, incoming: &Value) -> Value {
        let mut merged = match prior {
            Some(Value::Object(map)) => map.clone(),
            Some(_) | None => serde_json::Map::new(),
        };
        match incoming {
            Value::Object(incoming_map) => {
                for (k, v) in incoming_map {
                    merged.insert(k.clone(), v.clone());
                }
            }
            other => {
                tracing::warn!(channel, "map_merge reducer: incoming write is not an object, ignoring");
                let _ = other;
            }
        }
        Value::Object(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_objects() {
        let reducer = MapMerge;
        let prior = serde_json::json!({"a": 1, "b": 2});
        let incoming = serde_json::json!({"b": 3, "c": 4});
        let merged = reducer.apply("extra", Some(&prior), &incoming);
        assert_eq!(merged, serde_json::json!({"a": 1, "b": 3, "c": 4}));
    }
}
