// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Stateless guards for identifiers and values.

use thiserror::Error;

use crate::tree_node::{CacheNode, NodeSet};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("element value must not be empty")]
    EmptyValue,
    #[error("element id must not be empty")]
    EmptyId,
    #[error("parent id must be a non-empty id or absent")]
    EmptyParentId,
    #[error("parent '{0}' is not in the cache")]
    UnknownParent(String),
    #[error("parent '{0}' is deleted")]
    DeletedParent(String),
}

#[inline]
pub fn is_valid_id(id: &str) -> bool {
    !id.trim().is_empty()
}

#[inline]
pub fn is_valid_value(value: &str) -> bool {
    !value.trim().is_empty()
}

#[inline]
pub fn is_valid_parent_id(parent_id: Option<&str>) -> bool {
    parent_id.map_or(true, |p| !p.trim().is_empty())
}

/// Present in the node set and not flagged deleted.
#[inline]
pub fn live_node<'a>(nodes: &'a NodeSet, id: &str) -> Option<&'a CacheNode> {
    nodes.get(id).filter(|n| n.is_live())
}

/// Validate a local create and return the trimmed value to store.
///
/// The parent, when given, must be a live cached node: a child of an
/// uncached parent would be unreachable from any root.
pub fn validate_create(
    nodes: &NodeSet,
    parent_id: Option<&str>,
    value: &str,
) -> Result<String, ValidationError> {
    if !is_valid_value(value) {
        return Err(ValidationError::EmptyValue);
    }
    if !is_valid_parent_id(parent_id) {
        return Err(ValidationError::EmptyParentId);
    }
    if let Some(parent_id) = parent_id {
        match nodes.get(parent_id) {
            None => return Err(ValidationError::UnknownParent(parent_id.to_string())),
            Some(parent) if parent.is_deleted => {
                return Err(ValidationError::DeletedParent(parent_id.to_string()))
            }
            Some(_) => {}
        }
    }
    Ok(value.trim().to_string())
}

/// Validate an update request and return the trimmed value.
pub fn validate_update(id: &str, value: &str) -> Result<String, ValidationError> {
    if !is_valid_id(id) {
        return Err(ValidationError::EmptyId);
    }
    if !is_valid_value(value) {
        return Err(ValidationError::EmptyValue);
    }
    Ok(value.trim().to_string())
}

pub fn validate_delete(id: &str) -> Result<(), ValidationError> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(ValidationError::EmptyId)
    }
}
