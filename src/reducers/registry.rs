use rustc_hash::FxHashMap;
use std::sync::Arc;

use super::Reducer;

/// Maps channel names to the reducer that governs writes to them.
///
/// Channels with no registered reducer overwrite on write, which is the
/// runner's default and needs no entry here.
#[derive(Clone, Default)]
pub struct ReducerRegistry {
    reducers: FxHashMap<String, Arc<dyn Reducer>>,
}

impl ReducerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a reducer for a channel, returning `self` for chaining from
    /// [`crate::graph::GraphBuilder`].
    #[must_use]
    pub fn with_reducer(mut self, channel: impl Into<String>, reducer: Arc<dyn Reducer>) -> Self {
        self.reducers.insert(channel.into(), reducer);
        self
    }

    pub fn register(&mut self, channel: impl Into<String>, reducer: Arc<dyn Reducer>) -> &mut Self {
        self.reducers.insert(channel.into(), reducer);
        self
    }

    /// Merge `incoming` into `prior` for `channel`, using the registered
    /// reducer if one exists, otherwise overwriting.
    #[must_use]
    pub fn merge(
        &self,
        channel: &str,
        prior: Option<&serde_json::Value>,
        incoming: &serde_json::Value,
    ) -> serde_json::Value {
        match self.reducers.get(channel) {
            Some(reducer) => reducer.apply(channel, prior, incoming),
            None => incoming.clone(),
        }
    }

    #[must_use]
    pub fn has_reducer(&self, channel: &str) -> bool {
        self.reducers.contains_key(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducers::Append;

    #[test]
    fn overwrites_without_reducer() {
        let registry = ReducerRegistry::new();
        let prior = serde_json::json!("old");
        let merged = registry.merge("summary", Some(&prior), &serde_json::json!("new"));
        assert_eq!(merged, serde_json::json!("new"));
    }

    #[test]
    fn uses_registered_reducer() {
        let registry = ReducerRegistry::new().with_reducer("log", Arc::new(Append));
        let prior = serde_json::json!(["a"]);
        let merged = registry.merge("log", Some(&prior), &serde_json::json!(["b"]));
        assert_eq!(merged, serde_json::json!(["a", "b"]));
    }
}
