// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tree cache coordinator.
//!
//! The [`TreeCache`] is the single entry point an application talks to. It
//! owns the node set, the [`Index`] and the [`OperationLog`], and routes
//! every read and mutation through them.
//!
//! # Concurrency
//!
//! State sits behind one `parking_lot` mutex that is never held across an
//! await. Loads and applies additionally take an async gate, so at most one
//! of them is in flight; [`InFlightPolicy`] decides whether a second caller
//! queues or is turned away. Local mutations never wait on the gate.
//!
//! # Example
//!
//! ```rust
//! use tree_cache::{InMemoryBackingStore, TreeCache, TreeCacheConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = InMemoryBackingStore::new();
//! let cache = TreeCache::new(TreeCacheConfig::default());
//!
//! let loaded = cache.load_element(&store, "A1").await;
//! assert!(loaded.success);
//!
//! let node = cache.create_element(Some("A1"), "new child").unwrap();
//! assert_eq!(cache.get_operations().len(), 1);
//!
//! let applied = cache.apply_operations(&store).await;
//! assert!(applied.success);
//! assert!(cache.get_element(&node.id).is_some());
//! # }
//! ```

mod types;

pub use types::{ApplyResult, LoadResult};

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{InFlightPolicy, TreeCacheConfig};
use crate::hierarchy::Hierarchy;
use crate::index::Index;
use crate::loader::{CacheCheck, Loader};
use crate::metrics;
use crate::operation_log::{CacheOperation, OperationLog};
use crate::storage::traits::BackingStore;
use crate::tree_node::{CacheNode, NodeId, NodeSet, TreeView};
use crate::validation::{self, ValidationError};

#[derive(Debug, Default)]
struct CacheState {
    nodes: NodeSet,
    index: Index,
    log: OperationLog,
    /// Live roots as of the last structure read; `None` once invalidated.
    structure: Option<Arc<Vec<CacheNode>>>,
}

impl CacheState {
    /// Refresh children projections and drop the memoized structure.
    fn invalidate(&mut self) {
        self.index.rebuild_projections(&mut self.nodes);
        self.structure = None;
        metrics::set_cache_nodes(self.nodes.len());
        metrics::set_pending_operations(self.log.len());
    }
}

/// Client-side optimistic cache over a remotely stored tree.
pub struct TreeCache {
    config: TreeCacheConfig,
    state: Mutex<CacheState>,
    gate: AsyncMutex<()>,
    loader: Loader,
}

impl TreeCache {
    #[must_use]
    pub fn new(config: TreeCacheConfig) -> Self {
        let loader = Loader::new(config.backend_timeout(), config.apply_retry());
        Self {
            config,
            state: Mutex::new(CacheState::default()),
            gate: AsyncMutex::new(()),
            loader,
        }
    }

    #[must_use]
    pub fn config(&self) -> &TreeCacheConfig {
        &self.config
    }

    /// A live cached node, or `None` if it is absent or deleted.
    #[must_use]
    pub fn get_element(&self, id: &str) -> Option<CacheNode> {
        if !validation::is_valid_id(id) {
            return None;
        }
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.index.dirty().is_empty() {
            state.index.rebuild_projections(&mut state.nodes);
        }
        validation::live_node(&state.nodes, id).cloned()
    }

    /// Live roots of every cached chain.
    ///
    /// Returns the same `Arc` on repeated calls until something changes.
    #[must_use]
    pub fn get_cache_structure(&self) -> Arc<Vec<CacheNode>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.index.dirty().is_empty() {
            if let Some(structure) = &state.structure {
                return Arc::clone(structure);
            }
        }
        state.index.rebuild_projections(&mut state.nodes);
        let structure = Arc::new(Hierarchy::build_cache_structure(&state.nodes, &state.index));
        state.structure = Some(Arc::clone(&structure));
        structure
    }

    /// Nested rendering of every live chain.
    #[must_use]
    pub fn tree_view(&self) -> Vec<TreeView> {
        let roots = self.get_cache_structure();
        let state = self.state.lock();
        roots
            .iter()
            .filter_map(|root| TreeView::build(&root.id, &state.nodes))
            .collect()
    }

    /// Create a node under `parent_id` (or a new root) with a fresh id.
    #[tracing::instrument(skip(self, value))]
    pub fn create_element(
        &self,
        parent_id: Option<&str>,
        value: &str,
    ) -> Result<CacheNode, ValidationError> {
        let mut state = self.state.lock();
        let value = validation::validate_create(&state.nodes, parent_id, value)?;

        let id: NodeId = Uuid::new_v4().to_string();
        let parent_id = parent_id.map(str::to_string);
        let node = CacheNode::new(id.clone(), parent_id.clone(), value.clone());

        state.nodes.insert(id.clone(), node.clone());
        state.index.add_to_parent_index(&id, parent_id.as_deref());
        state.index.mark_dirty(&id, parent_id.as_deref());
        state.log.record(CacheOperation::Create { id: id.clone(), parent_id, value });
        state.invalidate();

        debug!(id = %id, "Created element");
        Ok(node)
    }

    /// Set a new value on a live node. Returns `false` if the input is
    /// invalid or the node is absent or deleted.
    #[tracing::instrument(skip(self, value))]
    pub fn update_element(&self, id: &str, value: &str) -> bool {
        let Ok(value) = validation::validate_update(id, value) else {
            return false;
        };
        let mut state = self.state.lock();
        let Some(node) = state.nodes.get_mut(id).filter(|n| n.is_live()) else {
            return false;
        };
        node.value = value.clone();
        state.log.record(CacheOperation::Update { id: id.to_string(), value });
        state.invalidate();
        true
    }

    /// Delete a live node and, logically, its whole cached subtree.
    ///
    /// Logs a single delete for `id`; the backing store cascades on replay.
    #[tracing::instrument(skip(self))]
    pub fn delete_element(&self, id: &str) -> bool {
        if validation::validate_delete(id).is_err() {
            return false;
        }
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if validation::live_node(&state.nodes, id).is_none() {
            return false;
        }
        let deleted = Hierarchy::mark_subtree_deleted(id, &mut state.nodes, &mut state.index);
        state.log.record(CacheOperation::Delete { id: id.to_string() });
        state.invalidate();

        debug!(id, cascaded = deleted.len(), "Deleted element");
        true
    }

    /// Hydrate `id` and its descendants from the backing store.
    #[tracing::instrument(skip(self, store))]
    pub async fn load_element(&self, store: &dyn BackingStore, id: &str) -> LoadResult {
        if !validation::is_valid_id(id) {
            return LoadResult::failed("invalid element id");
        }
        let Some(_gate) = self.enter("load").await else {
            metrics::record_load("busy");
            return LoadResult::failed(types::BUSY_MESSAGE);
        };

        if let Some(answer) = self.answer_from_cache(id) {
            return answer;
        }

        let fetched = match self.loader.fetch(store, id).await {
            Ok(Some(fetched)) => fetched,
            Ok(None) => {
                metrics::record_load("not_found");
                return LoadResult::failed("element not found in backing store");
            }
            Err(e) => {
                warn!(id, error = %e, "Failed to fetch element");
                metrics::record_load("error");
                return LoadResult::failed(format!("failed to load element: {e}"));
            }
        };

        let mut guard = self.state.lock();
        let state = &mut *guard;
        // Local mutations may have landed while the fetch was in flight.
        match self.loader.check_cached(id, &state.nodes, &state.index) {
            CacheCheck::Covered(result) => {
                metrics::record_load("cached");
                result
            }
            CacheCheck::Deleted => {
                metrics::record_load("deleted");
                LoadResult::failed("element is deleted in cache")
            }
            CacheCheck::Fetch => {
                let result = self.loader.merge_fetched(id, fetched, &mut state.nodes, &mut state.index);
                state.invalidate();
                result
            }
        }
    }

    /// Replay the operation log into the backing store.
    ///
    /// On full success the replayed operations leave the log and any ids the
    /// store deleted are marked deleted here. On partial failure the log is
    /// kept whole and the next call replays it again.
    #[tracing::instrument(skip(self, store))]
    pub async fn apply_operations(&self, store: &dyn BackingStore) -> ApplyResult {
        let Some(_gate) = self.enter("apply").await else {
            return ApplyResult::busy();
        };

        let (generation, ops) = {
            let state = self.state.lock();
            (state.log.generation(), state.log.list().to_vec())
        };
        let result = self.loader.apply_operations(store, &ops).await;
        if !result.success || ops.is_empty() {
            return result;
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.log.drain_applied(generation, ops.len()) {
            warn!(replayed = ops.len(), "Cache cleared during apply, keeping the log as it is");
            return result;
        }
        let mut reconciled = 0;
        for id in &result.deleted_ids {
            let Some(node) = state.nodes.get_mut(id) else {
                continue;
            };
            if node.is_deleted {
                continue;
            }
            node.is_deleted = true;
            let parent = if state.index.is_root(id) { None } else { node.parent_id.clone() };
            state.index.mark_dirty(id, parent.as_deref());
            reconciled += 1;
        }
        state.invalidate();

        info!(applied = result.applied_count, reconciled, remaining = state.log.len(), "Operation log applied");
        result
    }

    /// Pending operations in recording order.
    #[must_use]
    pub fn get_operations(&self) -> Vec<CacheOperation> {
        self.state.lock().log.list().to_vec()
    }

    #[must_use]
    pub fn pending_operations(&self) -> usize {
        self.state.lock().log.len()
    }

    /// Cached nodes, deleted ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().nodes.is_empty()
    }

    /// Whether `id` is currently the top of a cached chain.
    #[must_use]
    pub fn is_root(&self, id: &str) -> bool {
        self.state.lock().index.is_root(id)
    }

    /// Drop every node, the index, the log and the memoized structure.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let dropped = state.nodes.len();
        state.nodes.clear();
        state.index.clear();
        state.log.clear();
        state.invalidate();
        info!(dropped, "Cache cleared");
    }

    fn answer_from_cache(&self, id: &str) -> Option<LoadResult> {
        let state = self.state.lock();
        match self.loader.check_cached(id, &state.nodes, &state.index) {
            CacheCheck::Covered(result) => {
                metrics::record_load("cached");
                Some(result)
            }
            CacheCheck::Deleted => {
                metrics::record_load("deleted");
                Some(LoadResult::failed("element is deleted in cache"))
            }
            CacheCheck::Fetch => None,
        }
    }

    async fn enter(&self, entry_point: &'static str) -> Option<AsyncMutexGuard<'_, ()>> {
        match self.config.in_flight_policy {
            InFlightPolicy::Queue => Some(self.gate.lock().await),
            InFlightPolicy::Reject => match self.gate.try_lock() {
                Ok(guard) => Some(guard),
                Err(_) => {
                    debug!(entry_point, "Rejected while another load or apply is in flight");
                    metrics::record_busy(entry_point);
                    None
                }
            },
        }
    }
}

impl Default for TreeCache {
    fn default() -> Self {
        Self::new(TreeCacheConfig::default())
    }
}
