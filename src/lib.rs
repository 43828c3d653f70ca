// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Tree Cache
//!
//! A client-side optimistic cache over a remotely stored tree.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TreeCache (façade)                       │
//! │  • create / update / delete apply locally, logged          │
//! │  • memoized cache structure                                │
//! └─────────────────────────────────────────────────────────────┘
//!            │                                   │
//!            ▼                                   ▼
//! ┌──────────────────────────┐     ┌──────────────────────────────┐
//! │   Node set + Index       │     │   Operation log              │
//! │  • parent → children     │     │  • create / update / delete  │
//! │  • roots, dirty          │     │  • replayed in order         │
//! └──────────────────────────┘     └──────────────────────────────┘
//!            ▲                                   │
//!            │ hydrate (merge / replace)         │ apply
//!            │                                   ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Backing store                          │
//! │  • fetch subtree, create, update, cascade delete           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cache holds fragments of the remote tree. Each fragment is a chain
//! whose top is a root of the [`Index`]. Loading a node either splices it
//! into related cached chains or, when nothing cached relates to it,
//! replaces them all.
//!
//! ## Quick Start
//!
//! ```rust
//! use tree_cache::{InMemoryBackingStore, TreeCache, TreeCacheConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = InMemoryBackingStore::new();
//! let cache = TreeCache::new(TreeCacheConfig::default());
//!
//! cache.load_element(&store, "A3").await;
//! cache.load_element(&store, "A1").await;
//!
//! // A3's chain was merged under A1
//! let roots = cache.get_cache_structure();
//! assert_eq!(roots.len(), 1);
//! assert_eq!(roots[0].id, "A1");
//!
//! cache.update_element("A3", "edited");
//! let result = cache.apply_operations(&store).await;
//! assert!(result.success);
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: The [`TreeCache`] façade
//! - [`index`]: Parent/child adjacency, roots, dirty tracking
//! - [`hierarchy`]: Chain merge, replace and cascade algorithms
//! - [`loader`]: Hydration and replay against the backing store
//! - [`operation_log`]: Pending mutations
//! - [`storage`]: Backing-store trait and in-memory implementation
//! - [`resilience`]: Retry with backoff

pub mod config;
pub mod tree_node;
pub mod validation;
pub mod index;
pub mod hierarchy;
pub mod operation_log;
pub mod storage;
pub mod loader;
pub mod resilience;
pub mod coordinator;
pub mod metrics;

pub use config::{InFlightPolicy, TreeCacheConfig};
pub use coordinator::{ApplyResult, LoadResult, TreeCache};
pub use hierarchy::Hierarchy;
pub use index::Index;
pub use operation_log::{CacheOperation, OperationLog};
pub use resilience::retry::RetryConfig;
pub use storage::memory::{InMemoryBackingStore, StoredNode};
pub use storage::traits::{BackingNode, BackingStore, StorageError};
pub use tree_node::{CacheNode, NodeId, NodeSet, TreeView};
pub use validation::ValidationError;
