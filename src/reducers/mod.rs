//! Per-channel merge strategies.
//!
//! A [`Reducer`] combines a channel's prior value with an incoming write
//! instead of letting the write overwrite it outright. Reducers are declared
//! per channel name on the [`crate::graph::GraphBuilder`] (`spec.md` §9:
//! "implementers should not hard-code reducer behavior in the runner"); a
//! channel with no registered reducer simply overwrites, which is the
//! runner's default.

mod append;
mod map_merge;
mod registry;

pub use append::Append;
pub use map_merge::MapMerge;
pub use registry::ReducerRegistry;

/// Combines a channel's prior value with an incoming write.
pub trait Reducer: Send + Sync {
    /// Produce the new channel value from its prior value (`None` if the
    /// channel has never been written) and the incoming write.
    fn apply(
        &self,
        channel: &str,
        prior: Option<&serde_json::Value>,
        incoming: &serde_json::Value,
    ) -> serde_json::Value;
}
