// SPDX-License-Identifier: AGPL-3.0-or-later

//! Engine-wide configuration defaults (SPEC_FULL §2.3). Unlike the
//! teacher's file-backed `AppConfig`, the core has no CLI surface, so this
//! is constructed programmatically — but keeps the same "typed struct
//! with documented defaults" shape.

use crate::transform::TieBreak;

/// Tunables for the batched transport (§4.6) and the OT engine's default
/// tie-break convention (§4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Time window after the first buffered op before an automatic flush.
    pub flush_interval_ms: u64,
    /// Hard upper bound on the number of buffered ops before a
    /// synchronous flush.
    pub max_batch_size: usize,
    /// Tie-break convention used when two concurrent ops target the exact
    /// same position and no explicit tie-break is supplied.
    pub default_tie_break: TieBreak,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 300,
            max_batch_size: 50,
            default_tie_break: TieBreak::Left,
        }
    }
}
