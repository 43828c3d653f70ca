// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Hydration from, and replay into, the backing store.
//!
//! A load runs in three steps so the caller can drop its state lock while
//! the backing store is awaited:
//!
//! 1. [`Loader::check_cached`] answers from the cache when it can.
//! 2. [`Loader::fetch`] calls the store, bounded by the backend timeout.
//! 3. [`Loader::merge_fetched`] splices the response into the cache.
//!
//! Cache state is only touched in step 3, so a load abandoned mid-fetch
//! leaves no trace.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::coordinator::{ApplyResult, LoadResult};
use crate::hierarchy::Hierarchy;
use crate::index::Index;
use crate::metrics::{self, LatencyTimer};
use crate::operation_log::CacheOperation;
use crate::resilience::retry::{retry, RetryConfig};
use crate::storage::traits::{BackingNode, BackingStore, StorageError};
use crate::tree_node::{CacheNode, NodeId, NodeSet};

/// Where a requested id stands before any fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheCheck {
    /// Already hydrated; answer with the cached subtree.
    Covered(LoadResult),
    /// Deleted locally; never re-fetched.
    Deleted,
    /// Must be fetched.
    Fetch,
}

/// Backing-store calls with timeout, retry and metrics around them.
#[derive(Debug, Clone)]
pub struct Loader {
    timeout: Option<Duration>,
    retry: RetryConfig,
}

impl Loader {
    pub fn new(timeout: Option<Duration>, retry: RetryConfig) -> Self {
        Self { timeout, retry }
    }

    /// Decide whether `id` can be served from the cache.
    pub fn check_cached(&self, id: &str, nodes: &NodeSet, index: &Index) -> CacheCheck {
        let Some(node) = nodes.get(id) else {
            return CacheCheck::Fetch;
        };
        if node.is_deleted {
            return CacheCheck::Deleted;
        }
        if index.is_root(id) || index.is_descendant_of_any_root(id, nodes) {
            let loaded = loaded_nodes(node, nodes, index);
            let message = format!("element and {} descendants already in cache", loaded.len() - 1);
            return CacheCheck::Covered(LoadResult::loaded(message, loaded));
        }
        CacheCheck::Fetch
    }

    /// Fetch `id` and its live descendants.
    pub async fn fetch(
        &self,
        store: &dyn BackingStore,
        id: &str,
    ) -> Result<Option<BackingNode>, StorageError> {
        self.bounded("fetch", store.fetch_one_with_children(id)).await
    }

    /// Splice a fetched subtree into the cache.
    ///
    /// `id` must have passed [`Loader::check_cached`] with
    /// [`CacheCheck::Fetch`] under the same lock.
    pub fn merge_fetched(
        &self,
        id: &str,
        fetched: BackingNode,
        nodes: &mut NodeSet,
        index: &mut Index,
    ) -> LoadResult {
        if let Some(parent_id) = fetched.parent_id.as_deref() {
            if nodes.get(parent_id).is_some_and(|parent| parent.is_deleted) {
                metrics::record_load("deleted");
                return LoadResult::failed("parent of element is deleted in cache");
            }
        }

        // Cached but hanging off nothing: the fragment is stale.
        if nodes.contains_key(id) {
            warn!(id, nodes = nodes.len(), "Orphaned element in cache, clearing before reload");
            nodes.clear();
            index.clear();
            metrics::record_orphan_recovery();
        }

        let descendants = Hierarchy::extract_all_descendants(&fetched);
        let root = CacheNode::new(fetched.id, fetched.parent_id, fetched.value);
        let root_id = root.id.clone();

        let mut fetched_ids: HashSet<NodeId> = descendants.iter().map(|d| d.id.clone()).collect();
        fetched_ids.insert(root_id.clone());

        let existing = index.find_existing_children_in_cache(&root_id, &fetched_ids, nodes);
        let parent_cached = root
            .parent_id
            .as_deref()
            .is_some_and(|parent_id| nodes.get(parent_id).is_some_and(CacheNode::is_live));

        if !existing.is_empty() || parent_cached {
            debug!(id = %root_id, existing = existing.len(), parent_cached, "Merging fetched chain");
            Hierarchy::merge_chains(root, descendants, &existing, nodes, index);
            metrics::record_chain_splice("merge");
        } else {
            debug!(id = %root_id, "Fetched chain unrelated to cache, replacing");
            Hierarchy::replace_all_with_new_chain(root, descendants, nodes, index);
            metrics::record_chain_splice("replace");
        }

        let reattached = Hierarchy::reattach_roots_to_cached_parents(nodes, index);
        if reattached > 0 {
            debug!(reattached, "Reattached roots to cached parents");
        }

        index.rebuild_projections(nodes);
        let Some(node) = nodes.get(&root_id) else {
            return LoadResult::failed("element missing after merge");
        };
        let loaded = loaded_nodes(node, nodes, index);
        metrics::record_load("fetched");
        info!(id = %root_id, descendants = loaded.len() - 1, "Element loaded into cache");
        LoadResult::loaded(
            format!("element and {} descendants loaded into cache", loaded.len() - 1),
            loaded,
        )
    }

    /// Replay `ops` in order, retrying each per the replay policy.
    ///
    /// A failed operation is recorded and replay moves on to the next one.
    pub async fn apply_operations(
        &self,
        store: &dyn BackingStore,
        ops: &[CacheOperation],
    ) -> ApplyResult {
        if ops.is_empty() {
            return ApplyResult {
                success: true,
                applied_count: 0,
                errors: Vec::new(),
                message: "no changes to apply".to_string(),
                deleted_ids: Vec::new(),
            };
        }

        let mut applied_count = 0;
        let mut errors = Vec::new();
        let mut deleted_ids = Vec::new();

        for op in ops {
            let label = op.to_string();
            match retry(&label, &self.retry, || self.apply_one(store, op)).await {
                Ok(deleted) => {
                    applied_count += 1;
                    deleted_ids.extend(deleted);
                }
                Err(e) => {
                    warn!(operation = %label, error = %e, "Failed to apply operation");
                    errors.push(format!("failed to apply {} for element {}: {}", op.kind(), op.id(), e));
                }
            }
        }

        let success = errors.is_empty();
        metrics::record_apply(success, applied_count, errors.len());
        let message = if success {
            format!("applied {applied_count} operations")
        } else {
            format!("applied {} of {} operations, {} failed", applied_count, ops.len(), errors.len())
        };
        info!(applied = applied_count, failed = errors.len(), "Replayed operation log");

        ApplyResult { success, applied_count, errors, message, deleted_ids }
    }

    /// One backing-store call per operation. Returns ids the store deleted.
    async fn apply_one(
        &self,
        store: &dyn BackingStore,
        op: &CacheOperation,
    ) -> Result<Vec<NodeId>, StorageError> {
        match op {
            CacheOperation::Create { id, parent_id, value } => {
                self.bounded("create", store.create(id, parent_id.as_deref(), value)).await?;
                Ok(Vec::new())
            }
            CacheOperation::Update { id, value } => {
                if self.bounded("update", store.update(id, value)).await?.is_none() {
                    warn!(id = %id, "Update target missing or deleted in backing store, skipping");
                }
                Ok(Vec::new())
            }
            CacheOperation::Delete { id } => {
                self.bounded("delete", store.mark_subtree_deleted(id)).await
            }
        }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<T, StorageError> {
        let _timer = LatencyTimer::new(operation);
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(StorageError::Timeout {
                    operation,
                    after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                }),
            },
            None => call.await,
        };
        metrics::record_backend_call(operation, if result.is_ok() { "success" } else { "error" });
        result
    }
}

/// `node` followed by its live cached descendants.
fn loaded_nodes(node: &CacheNode, nodes: &NodeSet, index: &Index) -> Vec<CacheNode> {
    let mut loaded = vec![node.clone()];
    loaded.extend(Hierarchy::cached_descendants(&node.id, nodes, index));
    loaded
}
