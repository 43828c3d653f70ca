// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tree_node::NodeId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Node '{0}' not found")]
    NotFound(NodeId),
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Backing store {operation} timed out after {after_ms}ms")]
    Timeout {
        operation: &'static str,
        after_ms: u64,
    },
    #[error("Conflict: {0}")]
    Conflict(String),
}

/// A node as returned by the backing store, descendants inlined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackingNode {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub value: String,
    pub is_deleted: bool,
    #[serde(default)]
    pub children: Vec<BackingNode>,
}

/// The authoritative tree the cache hydrates from and replays into.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Fetch a live node with every live descendant, or `None` if it is
    /// missing or deleted.
    async fn fetch_one_with_children(&self, id: &str) -> Result<Option<BackingNode>, StorageError>;

    async fn create(
        &self,
        id: &str,
        parent_id: Option<&str>,
        value: &str,
    ) -> Result<BackingNode, StorageError>;

    /// Write a new value; `None` if the node is missing or deleted.
    async fn update(&self, id: &str, value: &str) -> Result<Option<BackingNode>, StorageError>;

    /// Flag `id` and its whole subtree deleted.
    /// Returns every id that actually transitioned, for cache reconciliation.
    async fn mark_subtree_deleted(&self, id: &str) -> Result<Vec<NodeId>, StorageError>;

    /// Live top-level nodes with their live descendants.
    async fn list_roots(&self) -> Result<Vec<BackingNode>, StorageError>;

    /// Restore the store's initial contents.
    async fn reset_to_seed(&self) -> Result<(), StorageError>;
}
