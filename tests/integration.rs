// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Integration Tests for Tree Cache
//!
//! Drives the public [`TreeCache`] API against the in-memory backing store
//! seeded with the default tree:
//!
//! ```text
//! root ─┬─ A1 ─┬─ A2_1 ── A3 ── A4 ── A5
//!       │      └─ A2_2
//!       └─ B1 ── B2 ── B3
//! ```
//!
//! # Test Organization
//! - `happy_*` - Local edits, hydration, merge and replay
//! - `failure_*` - Backend errors, timeouts, busy rejection, partial replay
//! - `coverage_*` - Projections, views and metrics

use std::time::Duration;

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use tokio::time::sleep;

use tree_cache::{
    BackingStore, CacheOperation, InFlightPolicy, InMemoryBackingStore, TreeCache,
    TreeCacheConfig,
};

// =============================================================================
// Helpers
// =============================================================================

fn cache() -> TreeCache {
    TreeCache::new(TreeCacheConfig::default())
}

fn root_ids(cache: &TreeCache) -> Vec<String> {
    cache.get_cache_structure().iter().map(|n| n.id.clone()).collect()
}

// =============================================================================
// Happy Path Tests - Local Edits
// =============================================================================

#[test]
fn happy_create_two_roots_then_delete_one() {
    let cache = cache();
    let a = cache.create_element(None, "A").unwrap();
    let b = cache.create_element(None, "B").unwrap();

    assert!(cache.delete_element(&a.id));

    assert_eq!(root_ids(&cache), vec![b.id.clone()]);
    assert!(cache.get_element(&a.id).is_none());
    let ops = cache.get_operations();
    assert_eq!(ops.len(), 3);
    assert!(matches!(&ops[2], CacheOperation::Delete { id } if *id == a.id));
}

#[tokio::test]
async fn happy_sibling_deletion_leaves_other_branch() {
    let store = InMemoryBackingStore::new();
    let cache = cache();

    cache.load_element(&store, "A1").await;
    assert!(cache.delete_element("A2_2"));

    let a1 = cache.get_element("A1").unwrap();
    assert_eq!(a1.children, vec!["A2_1".to_string()]);
    for id in ["A2_1", "A3", "A4", "A5"] {
        assert!(cache.get_element(id).is_some(), "{id} should stay live");
    }
}

// =============================================================================
// Happy Path Tests - Hydration
// =============================================================================

#[tokio::test]
async fn happy_load_child_then_parent_merges_into_one_chain() {
    let store = InMemoryBackingStore::new();
    let cache = cache();

    let first = cache.load_element(&store, "A3").await;
    assert!(first.success);
    assert_eq!(first.descendants_count, 2);

    let second = cache.load_element(&store, "A1").await;
    assert!(second.success);

    assert_eq!(root_ids(&cache), vec!["A1".to_string()]);
    assert!(!cache.is_root("A3"));
    assert_eq!(cache.get_element("A2_1").unwrap().children, vec!["A3".to_string()]);
    let loaded: Vec<_> = second.loaded_nodes.iter().map(|n| n.id.as_str()).collect();
    assert!(loaded.contains(&"A3"));
    assert!(loaded.contains(&"A5"));
}

#[tokio::test]
async fn happy_load_is_idempotent() {
    let store = InMemoryBackingStore::new();
    let cache = cache();

    let first = cache.load_element(&store, "A1").await;
    let fetches = store.fetch_count();
    let second = cache.load_element(&store, "A1").await;

    assert_eq!(store.fetch_count(), fetches);
    assert_eq!(first.descendants_count, second.descendants_count);
    assert_eq!(root_ids(&cache), vec!["A1".to_string()]);
}

#[tokio::test]
async fn happy_load_descendant_of_cached_chain_is_served_locally() {
    let store = InMemoryBackingStore::new();
    let cache = cache();

    cache.load_element(&store, "A1").await;
    let fetches = store.fetch_count();

    let result = cache.load_element(&store, "A3").await;
    assert!(result.success);
    assert_eq!(result.descendants_count, 2);
    assert_eq!(store.fetch_count(), fetches);
    assert!(result.message.contains("already in cache"));
}

#[tokio::test]
async fn happy_load_parent_preserves_local_edits() {
    let store = InMemoryBackingStore::new();
    let cache = cache();

    cache.load_element(&store, "A3").await;
    assert!(cache.update_element("A4", "edited"));
    assert!(cache.delete_element("A5"));

    cache.load_element(&store, "A1").await;

    assert_eq!(cache.get_element("A4").unwrap().value, "edited");
    assert!(cache.get_element("A5").is_none());
}

#[tokio::test]
async fn happy_deleted_chain_root_stays_deleted_after_ancestor_load() {
    let store = InMemoryBackingStore::new();
    let cache = cache();

    cache.load_element(&store, "A3").await;
    assert!(cache.delete_element("A3"));

    let result = cache.load_element(&store, "A1").await;
    assert!(result.success);

    for id in ["A3", "A4", "A5"] {
        assert!(cache.get_element(id).is_none(), "{id} came back live");
        assert!(result.loaded_nodes.iter().all(|n| n.id != id));
    }
    assert_eq!(root_ids(&cache), vec!["A1".to_string()]);
    assert_eq!(cache.get_operations(), vec![CacheOperation::Delete { id: "A3".into() }]);
}

#[tokio::test]
async fn happy_deleted_subtree_survives_unrelated_replace() {
    let store = InMemoryBackingStore::new();
    let cache = cache();

    cache.load_element(&store, "A1").await;
    assert!(cache.delete_element("A3"));

    // Unrelated chain replaces A1's, but the deletion is kept.
    cache.load_element(&store, "B1").await;
    assert_eq!(root_ids(&cache), vec!["B1".to_string()]);

    let fetches = store.fetch_count();
    let again = cache.load_element(&store, "A4").await;
    assert!(!again.success);
    assert_eq!(again.message, "element is deleted in cache");
    assert_eq!(store.fetch_count(), fetches);

    cache.load_element(&store, "A1").await;
    assert!(cache.get_element("A2_1").is_some());
    assert!(cache.get_element("A3").is_none());
    assert!(cache.get_element("A5").is_none());
}

#[tokio::test]
async fn happy_replaced_chain_then_parent_load() {
    let store = InMemoryBackingStore::new();
    let cache = cache();

    cache.load_element(&store, "B2").await;
    cache.load_element(&store, "A2_1").await; // replaces B2
    cache.load_element(&store, "A1").await;

    assert_eq!(root_ids(&cache), vec!["A1".to_string()]);
    assert!(cache.get_element("B2").is_none());
}

#[tokio::test]
async fn happy_unrelated_load_replaces_cached_chains() {
    let store = InMemoryBackingStore::new();
    let cache = cache();

    cache.load_element(&store, "A3").await;
    cache.load_element(&store, "B1").await;

    assert_eq!(root_ids(&cache), vec!["B1".to_string()]);
    assert!(cache.get_element("A3").is_none());
    assert_eq!(cache.len(), 3);
}

#[tokio::test]
async fn happy_covered_load_includes_local_children() {
    let store = InMemoryBackingStore::new();
    let cache = cache();

    cache.load_element(&store, "B1").await;
    let local = cache.create_element(Some("B3"), "local").unwrap();

    let result = cache.load_element(&store, "B2").await;
    assert!(result.success);
    assert!(result.loaded_nodes.iter().any(|n| n.id == local.id));
}

// =============================================================================
// Happy Path Tests - Replay
// =============================================================================

#[tokio::test]
async fn happy_apply_with_empty_log() {
    let store = InMemoryBackingStore::new();
    let result = cache().apply_operations(&store).await;

    assert!(result.success);
    assert_eq!(result.applied_count, 0);
    assert_eq!(result.message, "no changes to apply");
}

#[tokio::test]
async fn happy_apply_writes_through_and_clears_log() {
    let store = InMemoryBackingStore::new();
    let cache = cache();

    cache.load_element(&store, "A1").await;
    let node = cache.create_element(Some("A2_2"), "fresh").unwrap();
    cache.update_element("A1", "renamed");

    let result = cache.apply_operations(&store).await;
    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.applied_count, 2);
    assert!(cache.get_operations().is_empty());

    let stored = store.get(&node.id).unwrap();
    assert_eq!(stored.parent_id.as_deref(), Some("A2_2"));
    assert_eq!(stored.value, "fresh");
    assert_eq!(store.get("A1").unwrap().value, "renamed");
}

#[tokio::test]
async fn happy_apply_delete_cascades_in_store() {
    let store = InMemoryBackingStore::new();
    let cache = cache();

    cache.load_element(&store, "A1").await;
    cache.delete_element("A2_1");

    let result = cache.apply_operations(&store).await;
    assert!(result.success);
    assert_eq!(result.deleted_ids, vec!["A2_1", "A3", "A4", "A5"]);
    for id in ["A2_1", "A3", "A4", "A5"] {
        assert!(store.get(id).unwrap().is_deleted);
        assert!(cache.get_element(id).is_none());
    }
    assert!(store.fetch_one_with_children("A3").await.unwrap().is_none());
}

#[tokio::test]
async fn happy_create_then_delete_before_apply() {
    let store = InMemoryBackingStore::new();
    let cache = cache();

    let node = cache.create_element(None, "short-lived").unwrap();
    cache.delete_element(&node.id);

    let result = cache.apply_operations(&store).await;
    assert!(result.success);
    assert!(store.get(&node.id).unwrap().is_deleted);
}

// =============================================================================
// Failure Scenario Tests
// =============================================================================

#[tokio::test]
async fn failure_load_missing_element() {
    let store = InMemoryBackingStore::new();
    let cache = cache();

    let result = cache.load_element(&store, "nope").await;
    assert!(!result.success);
    assert_eq!(result.message, "element not found in backing store");
    assert!(cache.is_empty());
}

#[tokio::test]
async fn failure_load_deleted_element_in_cache() {
    let store = InMemoryBackingStore::new();
    let cache = cache();

    cache.load_element(&store, "B1").await;
    cache.delete_element("B3");
    let fetches = store.fetch_count();

    let result = cache.load_element(&store, "B3").await;
    assert!(!result.success);
    assert_eq!(result.message, "element is deleted in cache");
    assert_eq!(store.fetch_count(), fetches);
}

#[tokio::test]
async fn failure_backend_error_leaves_cache_untouched() {
    let store = InMemoryBackingStore::new();
    let cache = cache();

    cache.load_element(&store, "B1").await;
    store.fail_on("A1");

    let result = cache.load_element(&store, "A1").await;
    assert!(!result.success);
    assert!(result.message.contains("injected failure"));
    assert_eq!(root_ids(&cache), vec!["B1".to_string()]);
}

#[tokio::test]
async fn failure_fetch_timeout() {
    let store = InMemoryBackingStore::new().with_latency(Duration::from_millis(200));
    let cache = TreeCache::new(TreeCacheConfig {
        backend_timeout_ms: 20,
        ..Default::default()
    });

    let result = cache.load_element(&store, "A1").await;
    assert!(!result.success);
    assert!(result.message.contains("timed out"), "{}", result.message);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn failure_partial_apply_keeps_log_then_recovers() {
    let store = InMemoryBackingStore::new();
    let cache = cache();

    cache.load_element(&store, "B1").await;
    let node = cache.create_element(Some("B1"), "kept").unwrap();
    cache.update_element("B2", "changed");
    store.fail_on("B2");

    let result = cache.apply_operations(&store).await;
    assert!(!result.success);
    assert_eq!(result.applied_count, 1);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("B2"));
    assert_eq!(cache.pending_operations(), 2);

    // Full log replays again; the create that already landed is a no-op.
    store.heal("B2");
    let retry = cache.apply_operations(&store).await;
    assert!(retry.success, "{:?}", retry.errors);
    assert_eq!(retry.applied_count, 2);
    assert!(cache.get_operations().is_empty());
    assert!(store.get(&node.id).is_some());
    assert_eq!(store.get("B2").unwrap().value, "changed");
}

#[tokio::test]
async fn failure_reject_policy_turns_away_concurrent_load() {
    let store = InMemoryBackingStore::new().with_latency(Duration::from_millis(100));
    let cache = TreeCache::new(TreeCacheConfig {
        in_flight_policy: InFlightPolicy::Reject,
        ..Default::default()
    });

    let (first, second) = tokio::join!(cache.load_element(&store, "A1"), async {
        sleep(Duration::from_millis(20)).await;
        cache.load_element(&store, "B1").await
    });

    assert!(first.success);
    assert!(!second.success);
    assert!(second.message.contains("in flight"));
    assert_eq!(root_ids(&cache), vec!["A1".to_string()]);
}

#[tokio::test]
async fn failure_queue_policy_serializes_concurrent_loads() {
    let store = InMemoryBackingStore::new().with_latency(Duration::from_millis(30));
    let cache = cache();

    let (first, second) = tokio::join!(cache.load_element(&store, "A3"), async {
        sleep(Duration::from_millis(5)).await;
        cache.load_element(&store, "A1").await
    });

    assert!(first.success);
    assert!(second.success);
    assert_eq!(root_ids(&cache), vec!["A1".to_string()]);
}

#[tokio::test]
async fn failure_mutation_during_apply_is_not_lost() {
    let store = InMemoryBackingStore::new().with_latency(Duration::from_millis(50));
    let cache = cache();

    let first = cache.create_element(None, "first").unwrap();
    let (result, second) = tokio::join!(cache.apply_operations(&store), async {
        sleep(Duration::from_millis(10)).await;
        cache.create_element(None, "second").unwrap()
    });

    assert!(result.success);
    assert_eq!(result.applied_count, 1);
    assert!(store.get(&first.id).is_some());
    let pending = cache.get_operations();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id(), second.id);
}

#[tokio::test]
async fn failure_clear_during_apply_keeps_new_mutations() {
    let store = InMemoryBackingStore::new().with_latency(Duration::from_millis(50));
    let cache = cache();

    cache.create_element(None, "first").unwrap();
    let (result, second) = tokio::join!(cache.apply_operations(&store), async {
        sleep(Duration::from_millis(10)).await;
        cache.clear();
        cache.create_element(None, "second").unwrap()
    });

    assert!(result.success);
    let pending = cache.get_operations();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id(), second.id);

    let replay = cache.apply_operations(&store).await;
    assert!(replay.success);
    assert!(store.get(&second.id).is_some());
    assert!(cache.get_operations().is_empty());
}

#[tokio::test]
async fn failure_blank_id_is_never_fetched() {
    let store = InMemoryBackingStore::new();
    let cache = cache();

    let result = cache.load_element(&store, "  ").await;
    assert!(!result.success);
    assert_eq!(result.message, "invalid element id");
    assert_eq!(store.fetch_count(), 0);
    assert!(!cache.update_element(" ", "x"));
    assert!(!cache.delete_element("\t"));
}

// =============================================================================
// Coverage Tests - Views and Metrics
// =============================================================================

#[tokio::test]
async fn coverage_tree_view_nests_chain() {
    let store = InMemoryBackingStore::new();
    let cache = cache();
    cache.load_element(&store, "A1").await;

    let view = cache.tree_view();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].id, "A1");
    assert_eq!(view[0].children.len(), 2);
    assert_eq!(view[0].ids().len(), 6);
}

#[test]
fn coverage_metrics_recorded_for_mutations() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        let cache = cache();
        let a = cache.create_element(None, "A").unwrap();
        cache.update_element(&a.id, "B");
    });

    let logged: u64 = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(key, _, _, _)| key.key().name() == "tree_cache_operations_logged_total")
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(n) => n,
            _ => 0,
        })
        .sum();
    assert_eq!(logged, 2);
}
