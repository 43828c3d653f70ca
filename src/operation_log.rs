// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Append-only log of local mutations awaiting replay.
//!
//! Entries keep caller order and are never merged, deduplicated or reordered:
//! a create, update and delete of the same id are all replayed, in that order.

use serde::{Deserialize, Serialize};

use crate::tree_node::NodeId;

/// A mutation issued against the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheOperation {
    Create {
        #[serde(rename = "elementId")]
        id: NodeId,
        #[serde(rename = "parentId")]
        parent_id: Option<NodeId>,
        value: String,
    },
    Update {
        #[serde(rename = "elementId")]
        id: NodeId,
        value: String,
    },
    Delete {
        #[serde(rename = "elementId")]
        id: NodeId,
    },
}

impl CacheOperation {
    /// Id of the node this operation targets.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Create { id, .. } | Self::Update { id, .. } | Self::Delete { id } => id,
        }
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

impl std::fmt::Display for CacheOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

#[derive(Debug, Default, Clone)]
pub struct OperationLog {
    entries: Vec<CacheOperation>,
    /// Bumped by `clear`; a replay snapshot from an older generation no
    /// longer describes the head of the log.
    generation: u64,
}

impl OperationLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, op: CacheOperation) {
        crate::metrics::record_operation_logged(op.kind());
        self.entries.push(op);
    }

    /// Read-only view in recording order.
    #[must_use]
    pub fn list(&self) -> &[CacheOperation] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.generation += 1;
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Drop the first `count` entries of a replay snapshot taken at
    /// `generation`, keeping anything recorded after it.
    ///
    /// Returns `false` and drops nothing if the log was cleared since.
    pub fn drain_applied(&mut self, generation: u64, count: usize) -> bool {
        if generation != self.generation {
            return false;
        }
        let count = count.min(self.entries.len());
        self.entries.drain(..count);
        true
    }
}
