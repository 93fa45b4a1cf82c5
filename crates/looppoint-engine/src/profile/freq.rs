//! Basic-block frequency table
//!
//! Maps a basic block's starting address to a monotonically increasing
//! execution count. The caller decides what constitutes a block boundary;
//! this table only records address -> count.

use rustc_hash::FxHashMap;

/// Execution-frequency table keyed by basic-block starting address.
#[derive(Debug, Default)]
pub struct BlockFreqTable {
    counts: FxHashMap<u64, u64>,
}

impl BlockFreqTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the count for `block_start`, inserting with count 1 if absent.
    pub fn record(&mut self, block_start: u64) {
        *self.counts.entry(block_start).or_insert(0) += 1;
    }

    /// Current count for `block_start` (0 if never recorded).
    pub fn get(&self, block_start: u64) -> u64 {
        self.counts.get(&block_start).copied().unwrap_or(0)
    }

    /// Copy of the whole table; further `record` calls are unaffected.
    pub fn snapshot(&self) -> FxHashMap<u64, u64> {
        self.counts.clone()
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Number of distinct blocks recorded.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// True if no block has been recorded.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Reset to empty.
    pub fn clear(&mut self) {
        self.counts.clear();
    }
}
