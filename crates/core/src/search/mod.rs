//! Search planning: hybrid fusion strategies.

/// Hybrid planner and Reciprocal Rank Fusion.
pub mod hybrid;

pub use hybrid::{rrf_fuse, sparse_query_tokens};
