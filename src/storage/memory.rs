// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory reference backing store.
//!
//! Seeded with a small fixed tree, supports the full [`BackingStore`]
//! contract, and can inject latency and per-id failures for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tracing::debug;

use super::traits::{BackingNode, BackingStore, StorageError};
use crate::tree_node::NodeId;

/// A flat stored row; hierarchy comes from `parent_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredNode {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub value: String,
    pub is_deleted: bool,
}

impl StoredNode {
    pub fn new(id: &str, parent_id: Option<&str>, value: &str) -> Self {
        Self {
            id: id.to_string(),
            parent_id: parent_id.map(str::to_string),
            value: value.to_string(),
            is_deleted: false,
        }
    }
}

/// The default seed:
///
/// ```text
/// root
/// ├── A1
/// │   ├── A2_1 → A3 → A4 → A5
/// │   └── A2_2
/// └── B1 → B2 → B3
/// ```
#[must_use]
pub fn default_seed() -> Vec<StoredNode> {
    vec![
        StoredNode::new("root", None, "Root Element"),
        StoredNode::new("A1", Some("root"), "A1"),
        StoredNode::new("A2_1", Some("A1"), "A2_1"),
        StoredNode::new("A3", Some("A2_1"), "A3"),
        StoredNode::new("A4", Some("A3"), "A4"),
        StoredNode::new("A5", Some("A4"), "A5"),
        StoredNode::new("A2_2", Some("A1"), "A2_2"),
        StoredNode::new("B1", Some("root"), "B1"),
        StoredNode::new("B2", Some("B1"), "B2"),
        StoredNode::new("B3", Some("B2"), "B3"),
    ]
}

pub struct InMemoryBackingStore {
    data: DashMap<NodeId, StoredNode>,
    seed: Vec<StoredNode>,
    latency: Option<Duration>,
    failing: DashSet<NodeId>,
    fetches: AtomicU64,
}

impl InMemoryBackingStore {
    /// Store seeded with [`default_seed`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(default_seed())
    }

    #[must_use]
    pub fn with_seed(seed: Vec<StoredNode>) -> Self {
        let data = seed.iter().map(|n| (n.id.clone(), n.clone())).collect();
        Self {
            data,
            seed,
            latency: None,
            failing: DashSet::new(),
            fetches: AtomicU64::new(0),
        }
    }

    /// Sleep this long inside every call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every call that targets `id` fail with a backend error.
    pub fn fail_on(&self, id: &str) {
        self.failing.insert(id.to_string());
    }

    pub fn heal(&self, id: &str) {
        self.failing.remove(id);
    }

    /// Number of `fetch_one_with_children` calls served.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Stored row, including deleted ones.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<StoredNode> {
        self.data.get(id).map(|r| r.value().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    async fn before_call(&self, id: &str) -> Result<(), StorageError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.contains(id) {
            return Err(StorageError::Backend(format!("injected failure for '{}'", id)));
        }
        Ok(())
    }

    /// Live rows grouped by parent, children ordered by id.
    fn live_children_by_parent(&self) -> HashMap<NodeId, Vec<StoredNode>> {
        let mut by_parent: HashMap<NodeId, Vec<StoredNode>> = HashMap::new();
        for entry in self.data.iter() {
            let node = entry.value();
            if node.is_deleted {
                continue;
            }
            if let Some(parent_id) = &node.parent_id {
                by_parent.entry(parent_id.clone()).or_default().push(node.clone());
            }
        }
        for children in by_parent.values_mut() {
            children.sort_by(|a, b| a.id.cmp(&b.id));
        }
        by_parent
    }

    /// Assemble `root` with its live descendants, post-order with an explicit stack.
    fn assemble(root: StoredNode, by_parent: &HashMap<NodeId, Vec<StoredNode>>) -> Option<BackingNode> {
        struct Frame<'a> {
            node: StoredNode,
            pending: std::slice::Iter<'a, StoredNode>,
            built: Vec<BackingNode>,
        }

        let empty: &[StoredNode] = &[];
        let frame_for = |node: StoredNode| {
            let pending = by_parent.get(&node.id).map_or(empty, Vec::as_slice).iter();
            Frame { node, pending, built: Vec::new() }
        };

        let mut stack = vec![frame_for(root)];
        while let Some(mut frame) = stack.pop() {
            if let Some(child) = frame.pending.next().cloned() {
                stack.push(frame);
                stack.push(frame_for(child));
                continue;
            }
            let built = BackingNode {
                id: frame.node.id,
                parent_id: frame.node.parent_id,
                value: frame.node.value,
                is_deleted: frame.node.is_deleted,
                children: frame.built,
            };
            match stack.last_mut() {
                Some(parent) => parent.built.push(built),
                None => return Some(built),
            }
        }
        None
    }
}

impl Default for InMemoryBackingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackingStore for InMemoryBackingStore {
    async fn fetch_one_with_children(&self, id: &str) -> Result<Option<BackingNode>, StorageError> {
        self.before_call(id).await?;
        self.fetches.fetch_add(1, Ordering::Relaxed);

        let root = match self.data.get(id) {
            Some(r) if !r.is_deleted => r.value().clone(),
            _ => return Ok(None),
        };
        let by_parent = self.live_children_by_parent();
        Ok(Self::assemble(root, &by_parent))
    }

    async fn create(
        &self,
        id: &str,
        parent_id: Option<&str>,
        value: &str,
    ) -> Result<BackingNode, StorageError> {
        self.before_call(id).await?;

        // Keyed by id: replaying a create that already landed is a no-op,
        // even if the node was deleted later in the same batch.
        if let Some(existing) = self.data.get(id) {
            if existing.parent_id.as_deref() != parent_id {
                return Err(StorageError::Conflict(format!(
                    "node '{}' already exists under a different parent",
                    id
                )));
            }
            return Ok(BackingNode {
                id: existing.id.clone(),
                parent_id: existing.parent_id.clone(),
                value: existing.value.clone(),
                is_deleted: existing.is_deleted,
                children: Vec::new(),
            });
        }

        if let Some(parent_id) = parent_id {
            match self.data.get(parent_id) {
                None => return Err(StorageError::NotFound(parent_id.to_string())),
                Some(parent) if parent.is_deleted => {
                    return Err(StorageError::Conflict(format!("parent '{}' is deleted", parent_id)))
                }
                Some(_) => {}
            }
        }

        let node = StoredNode::new(id, parent_id, value);
        self.data.insert(id.to_string(), node.clone());
        debug!(id, parent = ?parent_id, "Created node in backing store");

        Ok(BackingNode {
            id: node.id,
            parent_id: node.parent_id,
            value: node.value,
            is_deleted: false,
            children: Vec::new(),
        })
    }

    async fn update(&self, id: &str, value: &str) -> Result<Option<BackingNode>, StorageError> {
        self.before_call(id).await?;

        let Some(mut node) = self.data.get_mut(id) else {
            return Ok(None);
        };
        if node.is_deleted {
            return Ok(None);
        }
        node.value = value.to_string();
        Ok(Some(BackingNode {
            id: node.id.clone(),
            parent_id: node.parent_id.clone(),
            value: node.value.clone(),
            is_deleted: false,
            children: Vec::new(),
        }))
    }

    async fn mark_subtree_deleted(&self, id: &str) -> Result<Vec<NodeId>, StorageError> {
        self.before_call(id).await?;

        if !self.data.contains_key(id) {
            return Err(StorageError::NotFound(id.to_string()));
        }

        // Children by parent over all rows: deleted rows can still have live children.
        let mut by_parent: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for entry in self.data.iter() {
            if let Some(parent_id) = &entry.value().parent_id {
                by_parent.entry(parent_id.clone()).or_default().push(entry.key().clone());
            }
        }

        let mut transitioned = Vec::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if let Some(mut node) = self.data.get_mut(&current) {
                if !node.is_deleted {
                    node.is_deleted = true;
                    transitioned.push(current.clone());
                }
            }
            if let Some(children) = by_parent.get(&current) {
                stack.extend(children.iter().cloned());
            }
        }

        debug!(id, count = transitioned.len(), "Marked subtree deleted in backing store");
        Ok(transitioned)
    }

    async fn list_roots(&self) -> Result<Vec<BackingNode>, StorageError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut roots: Vec<StoredNode> = self
            .data
            .iter()
            .filter(|r| r.parent_id.is_none() && !r.is_deleted)
            .map(|r| r.value().clone())
            .collect();
        roots.sort_by(|a, b| a.id.cmp(&b.id));

        let by_parent = self.live_children_by_parent();
        Ok(roots.into_iter().filter_map(|r| Self::assemble(r, &by_parent)).collect())
    }

    async fn reset_to_seed(&self) -> Result<(), StorageError> {
        self.data.clear();
        for node in &self.seed {
            self.data.insert(node.id.clone(), node.clone());
        }
        debug!(count = self.seed.len(), "Backing store reset to seed");
        Ok(())
    }
}
