// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the tree cache.
//!
//! # Example
//!
//! ```
//! use tree_cache::{TreeCacheConfig, InFlightPolicy};
//!
//! // Minimal config (uses defaults)
//! let config = TreeCacheConfig::default();
//! assert_eq!(config.in_flight_policy, InFlightPolicy::Queue);
//! assert_eq!(config.backend_timeout_ms, 5_000);
//!
//! // Fail fast instead of queueing behind an in-flight load/apply
//! let config = TreeCacheConfig {
//!     in_flight_policy: InFlightPolicy::Reject,
//!     apply_max_retries: 3,
//!     ..Default::default()
//! };
//! ```

use std::time::Duration;
use serde::Deserialize;

use crate::resilience::retry::RetryConfig;

/// What to do when `load_element`/`apply_operations` is called while
/// another one is in flight on the same cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InFlightPolicy {
    /// Wait for the in-flight call to finish.
    #[default]
    Queue,
    /// Return a busy result immediately without touching the cache.
    Reject,
}

/// Configuration for the tree cache.
///
/// All fields have sensible defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeCacheConfig {
    /// Serialization policy for hydration and replay
    #[serde(default)]
    pub in_flight_policy: InFlightPolicy,

    /// Upper bound for a single backing-store call in milliseconds (0 = unbounded)
    #[serde(default = "default_backend_timeout_ms")]
    pub backend_timeout_ms: u64,

    /// Attempts per operation during replay (1 = no retry)
    #[serde(default = "default_apply_max_retries")]
    pub apply_max_retries: usize,

    /// Replay retry backoff
    #[serde(default = "default_apply_retry_initial_delay_ms")]
    pub apply_retry_initial_delay_ms: u64,
    #[serde(default = "default_apply_retry_max_delay_ms")]
    pub apply_retry_max_delay_ms: u64,
}

fn default_backend_timeout_ms() -> u64 { 5_000 }
fn default_apply_max_retries() -> usize { 1 }
fn default_apply_retry_initial_delay_ms() -> u64 { 50 }
fn default_apply_retry_max_delay_ms() -> u64 { 1_000 }

impl Default for TreeCacheConfig {
    fn default() -> Self {
        Self {
            in_flight_policy: InFlightPolicy::default(),
            backend_timeout_ms: default_backend_timeout_ms(),
            apply_max_retries: default_apply_max_retries(),
            apply_retry_initial_delay_ms: default_apply_retry_initial_delay_ms(),
            apply_retry_max_delay_ms: default_apply_retry_max_delay_ms(),
        }
    }
}

impl TreeCacheConfig {
    /// Backing-store call bound, `None` when disabled.
    #[must_use]
    pub fn backend_timeout(&self) -> Option<Duration> {
        (self.backend_timeout_ms > 0).then(|| Duration::from_millis(self.backend_timeout_ms))
    }

    /// Retry policy applied to each replayed operation.
    #[must_use]
    pub fn apply_retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: Some(self.apply_max_retries.max(1)),
            initial_delay: Duration::from_millis(self.apply_retry_initial_delay_ms),
            max_delay: Duration::from_millis(self.apply_retry_max_delay_ms),
            factor: 2.0,
        }
    }
}
