// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Structural index over the cache's node set.
//!
//! Holds only ids, never node references:
//! - `parent_to_children`: authoritative parent → children adjacency
//! - `roots`: ids with no cached parent
//! - `dirty`: ids whose materialized `children` projection is stale
//!
//! Every id in the node set appears either in `roots` or in exactly one
//! `parent_to_children` entry. Ordered sets keep traversal and projection
//! order deterministic.

use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

use crate::tree_node::{NodeId, NodeSet};

#[derive(Debug, Default, Clone)]
pub struct Index {
    parent_to_children: HashMap<NodeId, BTreeSet<NodeId>>,
    roots: BTreeSet<NodeId>,
    dirty: BTreeSet<NodeId>,
}

impl Index {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` as a root when `parent_id` is absent, else under `parent_id`.
    pub fn add_to_parent_index(&mut self, id: &str, parent_id: Option<&str>) {
        match parent_id {
            None => {
                self.roots.insert(id.to_string());
            }
            Some(parent_id) => {
                self.parent_to_children
                    .entry(parent_id.to_string())
                    .or_default()
                    .insert(id.to_string());
            }
        }
    }

    /// Inverse of [`add_to_parent_index`](Self::add_to_parent_index).
    /// Drops the parent's entry once its child set is empty.
    pub fn remove_from_parent_index(&mut self, id: &str, parent_id: Option<&str>) {
        match parent_id {
            None => {
                self.roots.remove(id);
            }
            Some(parent_id) => {
                if let Some(children) = self.parent_to_children.get_mut(parent_id) {
                    children.remove(id);
                    if children.is_empty() {
                        self.parent_to_children.remove(parent_id);
                    }
                }
            }
        }
    }

    /// A structural change at `id` invalidates its own projection and its parent's.
    pub fn mark_dirty(&mut self, id: &str, parent_id: Option<&str>) {
        self.dirty.insert(id.to_string());
        if let Some(parent_id) = parent_id {
            self.dirty.insert(parent_id.to_string());
        }
    }

    #[inline]
    #[must_use]
    pub fn is_root(&self, id: &str) -> bool {
        self.roots.contains(id)
    }

    #[must_use]
    pub fn roots(&self) -> &BTreeSet<NodeId> {
        &self.roots
    }

    #[must_use]
    pub fn dirty(&self) -> &BTreeSet<NodeId> {
        &self.dirty
    }

    /// Indexed children of `id`, empty if none.
    pub fn children_of(&self, id: &str) -> impl DoubleEndedIterator<Item = &NodeId> {
        self.parent_to_children.get(id).into_iter().flatten()
    }

    /// True if `id` is listed under `parent_id` in the adjacency.
    #[must_use]
    pub fn is_attached_under(&self, id: &str, parent_id: &str) -> bool {
        self.parent_to_children
            .get(parent_id)
            .map_or(false, |children| children.contains(id))
    }

    /// Number of index slots holding `id` (roots plus every child set).
    #[cfg(test)]
    pub(crate) fn memberships(&self, id: &str) -> usize {
        usize::from(self.roots.contains(id))
            + self
                .parent_to_children
                .values()
                .filter(|children| children.contains(id))
                .count()
    }

    /// Recompute the `children` projection of every dirty node, then clear `dirty`.
    ///
    /// Deleted nodes get an empty projection; deleted children and ids absent
    /// from the node set are skipped.
    pub fn rebuild_projections(&mut self, nodes: &mut NodeSet) {
        if self.dirty.is_empty() {
            return;
        }
        let dirty = std::mem::take(&mut self.dirty);
        debug!(count = dirty.len(), "Rebuilding child projections");

        for id in &dirty {
            let children: Vec<NodeId> = match nodes.get(id) {
                None => continue,
                Some(node) if node.is_deleted => Vec::new(),
                Some(_) => self
                    .children_of(id)
                    .filter(|child_id| nodes.get(*child_id).map_or(false, |c| c.is_live()))
                    .cloned()
                    .collect(),
            };
            if let Some(node) = nodes.get_mut(id) {
                node.children = children;
            }
        }
    }

    /// Walk attached parent links upward from `id` until a root is reached.
    ///
    /// A link counts only if the parent is cached and the index lists `id`
    /// under it, so a fragment that merely names an uncached parent is not
    /// covered.
    #[must_use]
    pub fn is_descendant_of_any_root(&self, id: &str, nodes: &NodeSet) -> bool {
        let mut current = id;
        // Bounded by the node count so a corrupt parent cycle cannot spin.
        for _ in 0..=nodes.len() {
            let Some(node) = nodes.get(current) else {
                return false;
            };
            let Some(parent_id) = node.parent_id.as_deref() else {
                return false;
            };
            if !nodes.contains_key(parent_id) || !self.is_attached_under(current, parent_id) {
                return false;
            }
            if self.is_root(parent_id) {
                return true;
            }
            current = parent_id;
        }
        false
    }

    /// Cached roots that the backing store places under one of `fetched`.
    ///
    /// These are previously hydrated chains that a fresh fetch now connects to.
    /// Deleted roots count too: merging keeps their cached deleted copies.
    #[must_use]
    pub fn find_existing_children_in_cache(
        &self,
        loaded_id: &str,
        fetched: &HashSet<NodeId>,
        nodes: &NodeSet,
    ) -> Vec<NodeId> {
        self.roots
            .iter()
            .filter(|root_id| root_id.as_str() != loaded_id)
            .filter(|root_id| {
                nodes.get(*root_id).map_or(false, |node| {
                    node.parent_id
                        .as_ref()
                        .map_or(false, |parent_id| fetched.contains(parent_id))
                })
            })
            .cloned()
            .collect()
    }

    /// `id` followed by every indexed descendant, depth first, explicit stack.
    #[must_use]
    pub fn subtree_ids(&self, id: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            stack.extend(self.children_of(&current).rev().cloned());
            out.push(current);
        }
        out
    }

    pub fn clear(&mut self) {
        self.parent_to_children.clear();
        self.roots.clear();
        self.dirty.clear();
    }
}
