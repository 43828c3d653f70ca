// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backing-store contract and the bundled in-memory implementation.

pub mod traits;
pub mod memory;
