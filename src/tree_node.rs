// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cached tree node data structures.
//!
//! A [`CacheNode`] is the unit owned by the cache's node set. Its `children`
//! field is a projection rebuilt from the [`Index`](crate::index::Index); the
//! index, not this field, is authoritative for parent/child relationships.
//!
//! [`TreeView`] is the nested, serializable rendering of the cached hierarchy
//! handed to presentation layers.

use std::collections::HashMap;
use serde::{Deserialize, Serialize};

/// Opaque node identifier.
pub type NodeId = String;

/// The cache's node set: every hydrated or locally created node, keyed by id.
pub type NodeSet = HashMap<NodeId, CacheNode>;

/// A node held by the cache.
///
/// # Example
///
/// ```
/// use tree_cache::CacheNode;
///
/// let node = CacheNode::new("A1".into(), Some("root".into()), "A1".into());
///
/// assert_eq!(node.id, "A1");
/// assert_eq!(node.parent_id.as_deref(), Some("root"));
/// assert!(!node.is_deleted);
/// assert!(node.children.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheNode {
    pub id: NodeId,
    /// Parent as known to the backing store (or given at creation).
    ///
    /// A hydrated chain root keeps its backing-store parent here for display
    /// even though the index holds it as a root.
    pub parent_id: Option<NodeId>,
    pub value: String,
    /// Irreversible once set; the node stays addressable in the node set.
    pub is_deleted: bool,
    /// Materialized child ids, rebuilt from the index when the node is dirty.
    #[serde(default)]
    pub children: Vec<NodeId>,
}

impl CacheNode {
    /// Create a live node with no materialized children.
    pub fn new(id: NodeId, parent_id: Option<NodeId>, value: String) -> Self {
        Self {
            id,
            parent_id,
            value,
            is_deleted: false,
            children: Vec::new(),
        }
    }

    /// True if the node is present and not flagged deleted.
    #[inline]
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.is_deleted
    }
}

/// Nested rendering of a cached chain, children inlined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeView {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub value: String,
    pub is_deleted: bool,
    pub children: Vec<TreeView>,
}

impl TreeView {
    /// Render `root_id` and its materialized descendants.
    ///
    /// Follows the `children` projections, so callers must rebuild dirty
    /// projections first. Built with an explicit stack; ids missing from the
    /// node set are skipped.
    pub fn build(root_id: &str, nodes: &NodeSet) -> Option<Self> {
        let root = nodes.get(root_id)?;

        // Post-order: a frame is finished once all of its children are.
        struct Frame<'a> {
            node: &'a CacheNode,
            next_child: usize,
            built: Vec<TreeView>,
        }

        let mut stack = vec![Frame { node: root, next_child: 0, built: Vec::new() }];
        loop {
            let top = stack.last_mut()?;
            let current: &CacheNode = top.node;
            if let Some(child_id) = current.children.get(top.next_child) {
                top.next_child += 1;
                if let Some(child) = nodes.get(child_id) {
                    stack.push(Frame { node: child, next_child: 0, built: Vec::new() });
                }
                continue;
            }

            let frame = stack.pop()?;
            let view = TreeView {
                id: frame.node.id.clone(),
                parent_id: frame.node.parent_id.clone(),
                value: frame.node.value.clone(),
                is_deleted: frame.node.is_deleted,
                children: frame.built,
            };
            match stack.last_mut() {
                Some(parent) => parent.built.push(view),
                None => return Some(view),
            }
        }
    }

    /// Every id in this view, depth first.
    pub fn ids(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(view) = stack.pop() {
            out.push(view.id.clone());
            stack.extend(view.children.iter().rev());
        }
        out
    }
}
