// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic tree-cache usage example.
//!
//! Demonstrates:
//! 1. Hydrating a deep node, then its ancestor (chains merge)
//! 2. Local create / update / delete with the operation log
//! 3. Replaying the log into the backing store
//! 4. Displaying captured metrics
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use tree_cache::{InMemoryBackingStore, TreeCache, TreeCacheConfig, TreeView};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║             tree-cache: Basic Usage Example                   ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    let store = InMemoryBackingStore::new();
    let cache = TreeCache::new(TreeCacheConfig::default());
    let config = cache.config();
    println!(
        "⚙️  in-flight policy {:?}, backend timeout {}ms, {} attempt(s) per replayed op\n",
        config.in_flight_policy, config.backend_timeout_ms, config.apply_max_retries
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Hydrate A3, then its grandparent A1
    // ─────────────────────────────────────────────────────────────────────────
    let result = cache.load_element(&store, "A3").await;
    println!("📥 load A3: {} ({} descendants)", result.message, result.descendants_count);
    let result = cache.load_element(&store, "A1").await;
    println!("📥 load A1: {} ({} descendants)", result.message, result.descendants_count);
    print_tree(&cache.tree_view());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Local edits
    // ─────────────────────────────────────────────────────────────────────────
    let node = cache.create_element(Some("A2_2"), "drafted locally")?;
    cache.update_element("A4", "edited A4");
    cache.delete_element("A5");

    println!("\n✏️  Pending operations:");
    for op in cache.get_operations() {
        println!("   • {op}");
    }
    print_tree(&cache.tree_view());

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Replay into the backing store
    // ─────────────────────────────────────────────────────────────────────────
    let applied = cache.apply_operations(&store).await;
    println!(
        "\n📤 apply: {} (applied={}, deleted in store={:?})",
        applied.message, applied.applied_count, applied.deleted_ids
    );
    if let Some(stored) = store.get(&node.id) {
        println!("   store now holds {} under {:?}", stored.id, stored.parent_id);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Metrics:");
    dump_metrics(&snapshotter);

    Ok(())
}

fn print_tree(roots: &[TreeView]) {
    let mut stack: Vec<(&TreeView, usize)> = roots.iter().rev().map(|r| (r, 0)).collect();
    while let Some((node, depth)) = stack.pop() {
        println!("   {}└─ {} = {:?}", "   ".repeat(depth), node.id, node.value);
        stack.extend(node.children.iter().rev().map(|c| (c, depth + 1)));
    }
}

/// Dump all captured metrics grouped by kind
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut counters = vec![];
    let mut gauges = vec![];
    let mut histograms = vec![];

    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };
        let name = format!("{}{}", key.name(), label_str);

        match value {
            DebugValue::Counter(v) => counters.push((name, v)),
            DebugValue::Gauge(v) => gauges.push((name, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                histograms.push((name, count, sum));
            }
        }
    }

    counters.sort_by(|a, b| a.0.cmp(&b.0));
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, value) in &counters {
        println!("   counter   {} = {}", name, value);
    }
    for (name, value) in &gauges {
        println!("   gauge     {} = {:.0}", name, value);
    }
    for (name, count, sum) in &histograms {
        println!("   histogram {} count={} sum={:.4}s", name, count, sum);
    }
    if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
        println!("   (no metrics recorded)");
    }
}
