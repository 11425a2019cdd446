//! Merge grouping policies.
//!
//! A grouping policy decides, when a document is added, which merge buckets
//! it closes. The decision is recorded on the document as `close_level`:
//! a document closing level `L` is the anchor of a level-`L` bucket, and the
//! bucket holds every document back to (excluding) the previous anchor of
//! level `L` or above.

use std::fmt;

/// Assigns `close_level` to newly added documents.
pub trait MergeGrouping: Send + Sync + fmt::Debug {
    /// Highest level the policy ever assigns.
    fn max_level(&self) -> u32;

    /// Accounts a new document of `size` bytes and returns the highest level
    /// it closes, 0 for none.
    ///
    /// `pending` holds, per level starting at 1, the bytes added since that
    /// level's last boundary. It is persisted by the caller.
    fn close_level(&self, pending: &mut Vec<u64>, size: u64, size_limit: u64) -> u32;
}

/// Byte budget of a level-`level` bucket.
///
/// The top level gets the whole `size_limit`; each level below gets
/// `multiplier` times less.
pub fn level_budget(level: u32, max_level: u32, multiplier: u64, size_limit: u64) -> u64 {
    let exponent = max_level.saturating_sub(level);
    multiplier.checked_pow(exponent).map_or(0, |divisor| size_limit / divisor)
}

/// Size-tiered grouping: a bucket closes once another document of the same
/// size would push it over its level budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeTiered {
    /// Highest merge level.
    pub max_level: u32,
    /// Budget ratio between adjacent levels.
    pub level_size_multiplier: u64,
}

impl SizeTiered {
    /// Creates a policy.
    pub fn new(max_level: u32, level_size_multiplier: u64) -> Self {
        Self { max_level, level_size_multiplier }
    }
}

impl MergeGrouping for SizeTiered {
    fn max_level(&self) -> u32 {
        self.max_level
    }

    fn close_level(&self, pending: &mut Vec<u64>, size: u64, size_limit: u64) -> u32 {
        pending.resize(self.max_level as usize, 0);

        let mut closing = 0;
        for level in 1..=self.max_level {
            let slot = &mut pending[level as usize - 1];
            *slot = slot.saturating_add(size);
            let budget = level_budget(level, self.max_level, self.level_size_multiplier, size_limit);
            if slot.saturating_add(size) > budget {
                closing = level;
            }
        }

        // Closing a level closes every level below it.
        for slot in pending.iter_mut().take(closing as usize) {
            *slot = 0;
        }
        closing
    }
}

/// Marks levels up to `level` as closed in the pending counters.
pub fn reset_pending(pending: &mut [u64], level: u32) {
    for slot in pending.iter_mut().take(level as usize) {
        *slot = 0;
    }
}
