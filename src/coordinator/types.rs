// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public result types for the cache façade.

use serde::Serialize;

use crate::tree_node::{CacheNode, NodeId};

/// Outcome of [`super::TreeCache::load_element`].
///
/// Expected failures (not found, busy, backend error) are reported here
/// rather than as an `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadResult {
    pub success: bool,
    pub message: String,
    /// Live descendants of the loaded node now in the cache
    pub descendants_count: usize,
    /// The loaded node first, then its live cached descendants
    pub loaded_nodes: Vec<CacheNode>,
}

impl LoadResult {
    pub(crate) fn loaded(message: String, loaded_nodes: Vec<CacheNode>) -> Self {
        Self {
            success: true,
            message,
            descendants_count: loaded_nodes.len().saturating_sub(1),
            loaded_nodes,
        }
    }

    pub(crate) fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            descendants_count: 0,
            loaded_nodes: Vec::new(),
        }
    }
}

/// Outcome of [`super::TreeCache::apply_operations`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResult {
    /// True only if every replayed operation succeeded
    pub success: bool,
    pub applied_count: usize,
    /// One entry per failed operation, in replay order
    pub errors: Vec<String>,
    pub message: String,
    /// Ids the backing store transitioned to deleted during replay
    pub deleted_ids: Vec<NodeId>,
}

impl ApplyResult {
    pub(crate) fn busy() -> Self {
        Self {
            success: false,
            applied_count: 0,
            errors: vec![BUSY_MESSAGE.to_string()],
            message: BUSY_MESSAGE.to_string(),
            deleted_ids: Vec::new(),
        }
    }
}

pub(crate) const BUSY_MESSAGE: &str = "another load or apply is in flight";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_result_counts_descendants() {
        let nodes = vec![
            CacheNode::new("a".into(), None, "a".into()),
            CacheNode::new("b".into(), Some("a".into()), "b".into()),
        ];
        let result = LoadResult::loaded("ok".into(), nodes);
        assert!(result.success);
        assert_eq!(result.descendants_count, 1);

        let failed = LoadResult::failed("nope");
        assert!(!failed.success);
        assert_eq!(failed.descendants_count, 0);
        assert!(failed.loaded_nodes.is_empty());
    }

    #[test]
    fn test_apply_result_busy() {
        let busy = ApplyResult::busy();
        assert!(!busy.success);
        assert_eq!(busy.applied_count, 0);
        assert_eq!(busy.errors.len(), 1);
    }

    #[test]
    fn test_apply_result_json_shape() {
        let result = ApplyResult {
            success: true,
            applied_count: 2,
            errors: vec![],
            message: "done".into(),
            deleted_ids: vec!["x".into()],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["appliedCount"], 2);
        assert_eq!(json["deletedIds"][0], "x");
    }
}
