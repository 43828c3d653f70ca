// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tree algorithms over the node set and the [`Index`].
//!
//! Chains are connected fragments of the cached tree. A hydration either
//! splices a fresh chain into existing ones ([`Hierarchy::merge_chains`]) or,
//! when nothing cached relates to it, replaces every chain
//! ([`Hierarchy::replace_all_with_new_chain`]) so the cache never accumulates
//! unrelated islands.
//!
//! All traversals use explicit stacks; tree depth never grows the call stack.

use tracing::debug;

use crate::index::Index;
use crate::storage::traits::BackingNode;
use crate::tree_node::{CacheNode, NodeId, NodeSet};

/// Stateless chain operations.
#[derive(Debug)]
pub struct Hierarchy;

impl Hierarchy {
    /// Flatten every descendant of a fetched node into cache nodes.
    ///
    /// Pre-order: a parent always precedes its children. The root itself is
    /// not included.
    pub fn extract_all_descendants(root: &BackingNode) -> Vec<CacheNode> {
        let mut out = Vec::new();
        let mut stack: Vec<&BackingNode> = root.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            out.push(CacheNode {
                id: node.id.clone(),
                parent_id: node.parent_id.clone(),
                value: node.value.clone(),
                is_deleted: node.is_deleted,
                children: Vec::new(),
            });
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Live cached descendants of `id` (excluding `id`), following the index.
    pub fn cached_descendants(id: &str, nodes: &NodeSet, index: &Index) -> Vec<CacheNode> {
        let mut out = Vec::new();
        let mut stack: Vec<&NodeId> = index.children_of(id).rev().collect();
        while let Some(child_id) = stack.pop() {
            let Some(child) = nodes.get(child_id) else {
                continue;
            };
            if child.is_deleted {
                continue;
            }
            out.push(child.clone());
            stack.extend(index.children_of(child_id).rev());
        }
        out
    }

    /// Splice a freshly hydrated chain with previously cached chains.
    ///
    /// `root` goes in as a root. Each id in `existing_children` is a cached
    /// root whose backing-store parent lies inside the fetched chain: it is
    /// detached from its old slot and re-added under that parent, keeping
    /// its own cached descendants. Direct children of `root` thus land under
    /// `root.id`.
    pub fn merge_chains(
        root: CacheNode,
        descendants: Vec<CacheNode>,
        existing_children: &[NodeId],
        nodes: &mut NodeSet,
        index: &mut Index,
    ) -> Vec<NodeId> {
        let root_id = root.id.clone();
        let inserted = Self::insert_chain(root, descendants, nodes, index);

        for child_id in existing_children {
            let Some(parent_id) = nodes.get(child_id).and_then(|c| c.parent_id.clone()) else {
                continue;
            };
            if !nodes.contains_key(&parent_id) {
                continue;
            }
            Self::detach(child_id, nodes, index);
            Self::attach(child_id, &parent_id, nodes, index);
            debug!(child = %child_id, parent = %parent_id, root = %root_id, "Merged cached chain");
        }

        inserted
    }

    /// Drop every cached chain, then insert `root` and its descendants as the
    /// only live chain.
    ///
    /// Deleted subtrees are kept as hidden roots so a later hydration cannot
    /// bring them back live.
    pub fn replace_all_with_new_chain(
        root: CacheNode,
        descendants: Vec<CacheNode>,
        nodes: &mut NodeSet,
        index: &mut Index,
    ) -> Vec<NodeId> {
        let roots: Vec<NodeId> = index.roots().iter().cloned().collect();
        let mut removed = 0usize;
        for root_id in &roots {
            removed += Self::remove_chain(root_id, nodes, index);
        }
        debug!(chains = roots.len(), removed, new_root = %root.id, "Replaced cached chains");

        Self::insert_chain(root, descendants, nodes, index)
    }

    /// Live roots, in index order.
    ///
    /// Deleted roots stay addressable by id but are left out of the structure.
    pub fn build_cache_structure(nodes: &NodeSet, index: &Index) -> Vec<CacheNode> {
        index
            .roots()
            .iter()
            .filter_map(|id| nodes.get(id))
            .filter(|node| node.is_live())
            .cloned()
            .collect()
    }

    /// Flag `id` and every indexed descendant deleted.
    ///
    /// Returns the ids that actually transitioned. Already-deleted nodes are
    /// left as they are, and their subtrees are still walked.
    pub fn mark_subtree_deleted(id: &str, nodes: &mut NodeSet, index: &mut Index) -> Vec<NodeId> {
        let mut transitioned = Vec::new();
        for node_id in index.subtree_ids(id) {
            let Some(node) = nodes.get_mut(&node_id) else {
                continue;
            };
            if node.is_deleted {
                continue;
            }
            node.is_deleted = true;
            let parent = if index.is_root(&node_id) { None } else { node.parent_id.clone() };
            index.mark_dirty(&node_id, parent.as_deref());
            transitioned.push(node_id);
        }
        transitioned
    }

    /// Attach roots whose recorded parent is now cached under that parent.
    ///
    /// Runs after every hydration so no node stays a root once its parent
    /// has been loaded. Returns the number of roots reattached.
    pub fn reattach_roots_to_cached_parents(nodes: &mut NodeSet, index: &mut Index) -> usize {
        let candidates: Vec<(NodeId, NodeId)> = index
            .roots()
            .iter()
            .filter_map(|root_id| {
                let parent_id = nodes.get(root_id)?.parent_id.clone()?;
                nodes.contains_key(&parent_id).then(|| (root_id.clone(), parent_id))
            })
            .collect();

        let mut reattached = 0;
        for (root_id, parent_id) in candidates {
            // Never hang a chain below one of its own descendants.
            if index.subtree_ids(&root_id).contains(&parent_id) {
                continue;
            }
            index.remove_from_parent_index(&root_id, None);
            Self::attach(&root_id, &parent_id, nodes, index);
            reattached += 1;
        }
        reattached
    }

    /// Insert `root` as an index root plus every descendant not already cached.
    ///
    /// Cached copies win over fetched ones so local edits and deletions
    /// survive re-hydration. A fetched node whose cached parent is deleted
    /// comes in deleted.
    fn insert_chain(
        root: CacheNode,
        descendants: Vec<CacheNode>,
        nodes: &mut NodeSet,
        index: &mut Index,
    ) -> Vec<NodeId> {
        let mut inserted = Vec::with_capacity(descendants.len() + 1);

        let root_id = root.id.clone();
        if nodes.contains_key(&root_id) {
            Self::detach(&root_id, nodes, index);
        }
        index.add_to_parent_index(&root_id, None);
        index.mark_dirty(&root_id, None);
        nodes.insert(root_id.clone(), root);
        inserted.push(root_id);

        for mut node in descendants {
            if nodes.contains_key(&node.id) {
                continue;
            }
            let parent_id = node.parent_id.clone();
            if let Some(parent) = parent_id.as_deref().and_then(|p| nodes.get(p)) {
                if parent.is_deleted {
                    node.is_deleted = true;
                }
            }
            index.add_to_parent_index(&node.id, parent_id.as_deref());
            index.mark_dirty(&node.id, parent_id.as_deref());
            inserted.push(node.id.clone());
            nodes.insert(node.id.clone(), node);
        }

        inserted
    }

    /// Remove `id` from whichever index slot holds it.
    fn detach(id: &str, nodes: &NodeSet, index: &mut Index) {
        if index.is_root(id) {
            index.remove_from_parent_index(id, None);
            index.mark_dirty(id, None);
        }
        if let Some(parent_id) = nodes.get(id).and_then(|n| n.parent_id.as_deref()) {
            if index.is_attached_under(id, parent_id) {
                index.remove_from_parent_index(id, Some(parent_id));
                index.mark_dirty(id, Some(parent_id));
            }
        }
    }

    /// Index `id` under `parent_id`; a deleted parent deletes the subtree.
    fn attach(id: &str, parent_id: &str, nodes: &mut NodeSet, index: &mut Index) {
        if let Some(node) = nodes.get_mut(id) {
            node.parent_id = Some(parent_id.to_string());
        }
        index.add_to_parent_index(id, Some(parent_id));
        index.mark_dirty(id, Some(parent_id));

        if nodes.get(parent_id).map_or(false, |p| p.is_deleted) {
            Self::mark_subtree_deleted(id, nodes, index);
        }
    }

    /// Remove the live nodes of a chain. Returns nodes removed.
    ///
    /// The topmost deleted node of each deleted subtree becomes a root and
    /// the subtree stays cached.
    fn remove_chain(id: &str, nodes: &mut NodeSet, index: &mut Index) -> usize {
        let ids = index.subtree_ids(id);
        let tombstones: Vec<NodeId> = ids
            .iter()
            .filter(|node_id| is_deleted(nodes, node_id.as_str()))
            .filter(|node_id| {
                index.is_root(node_id)
                    || nodes
                        .get(*node_id)
                        .and_then(|n| n.parent_id.as_deref())
                        .map_or(true, |parent_id| !is_deleted(nodes, parent_id))
            })
            .cloned()
            .collect();
        for tombstone in &tombstones {
            if !index.is_root(tombstone) {
                Self::detach(tombstone, nodes, index);
                index.add_to_parent_index(tombstone, None);
            }
        }

        let mut removed = 0;
        // Children first so each parent's child set empties before it goes.
        for node_id in ids.iter().rev() {
            if is_deleted(nodes, node_id.as_str()) {
                continue;
            }
            Self::detach(node_id, nodes, index);
            if nodes.remove(node_id).is_some() {
                removed += 1;
            }
        }
        if !tombstones.is_empty() {
            debug!(root = %id, kept = tombstones.len(), "Kept deleted subtrees as hidden roots");
        }
        removed
    }
}

fn is_deleted(nodes: &NodeSet, id: &str) -> bool {
    nodes.get(id).is_some_and(|n| n.is_deleted)
}
