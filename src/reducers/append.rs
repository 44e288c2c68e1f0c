use super::Reducer;
use serde_json::Value;

/// List-append semantics: the incoming write is pushed onto the channel's
/// prior array (`spec.md` §4.4 step 3: "list-append semantics as indicated
/// by the graph declaration").
///
/// If the prior value exists but isn't an array, or the incoming write isn't
/// an array, it is treated as a single element to append rather than
/// rejected — graphs that need strict typing should validate in the node.
#[derive(Debug, Default, Clone, Copy)]
pub struct Append;

impl Reducer for Append {
    fn apply(&self, channel: &str, prior: Option<&Value>, incoming: &Value) -> Value {
        let mut items: Vec<Value> = match prior {
            Some(Value::Array(items)) => items.clone(),
            Some(other) => {
                tracing::warn!(channel, "append reducer: prior value is not an array, wrapping it");
                vec![other.clone()]
            }
            None => Vec::new(),
        };
        match incoming {
            Value::Array(incoming_items) => items.extend(incoming_items.clone()),
            other => items.push(other.clone()),
        }
        Value::Array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_arrays() {
        let reducer = Append;
        let prior = serde_json::json!(["a"]);
        let incoming = serde_json::json!(["b", "c"]);
        let merged = reducer.apply("log", Some(&prior), &incoming);
        assert_eq!(merged, serde_json::json!(["a", "b", "c"]));
    }

    #[test]
    fn starts_fresh_when_no_prior() {
        let reducer = Append;
        let merged = reducer.apply("log", None, &serde_json::json!("first"));
        assert_eq!(merged, serde_json::json!(["first"]));
    }
}
