//! Recent loop-marker window
//!
//! Loop-boundary signatures are reconstructed from the most recent marker
//! observations; full history is never needed, so the buffer is a fixed
//! five-entry FIFO and memory stays bounded regardless of run length.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Number of marker pairs retained per probe.
pub const RECENT_MARKER_CAPACITY: usize = 5;

/// A loop-point marker: the marker PC paired with the global committed
/// instruction count at the moment it was observed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerPair {
    /// Program counter of the marker instruction
    pub pc: u64,
    /// Global instruction count when the marker committed (the marker
    /// instruction is included in its own count)
    pub global_count: u64,
}

/// Fixed-capacity FIFO of the [`RECENT_MARKER_CAPACITY`] most recent markers.
///
/// Snapshots are ordered oldest to newest.
#[derive(Debug, Default)]
pub struct RecentMarkerBuffer {
    window: VecDeque<MarkerPair>,
}

impl RecentMarkerBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        RecentMarkerBuffer {
            window: VecDeque::with_capacity(RECENT_MARKER_CAPACITY),
        }
    }

    /// Append a marker, evicting the oldest entry once at capacity.
    pub fn push(&mut self, pc: u64, global_count: u64) {
        if self.window.len() == RECENT_MARKER_CAPACITY {
            self.window.pop_front();
        }
        self.window.push_back(MarkerPair { pc, global_count });
    }

    /// The retained markers, oldest to newest.
    pub fn snapshot(&self) -> Vec<MarkerPair> {
        self.window.iter().copied().collect()
    }

    /// The most recently pushed marker, if any.
    pub fn latest(&self) -> Option<MarkerPair> {
        self.window.back().copied()
    }

    /// Number of retained markers (never exceeds the capacity).
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// True if nothing has been pushed since creation or the last clear.
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Drop all retained markers.
    pub fn clear(&mut self) {
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_below_capacity_keeps_order() {
        let mut buffer = RecentMarkerBuffer::new();
        buffer.push(100, 1);
        buffer.push(200, 2);
        buffer.push(300, 3);

        let snap = buffer.snapshot();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap[0].pc, 100);
        assert_eq!(snap[2].pc, 300);
        assert_eq!(buffer.latest().unwrap().pc, 300);
    }

    #[test]
    fn test_oldest_evicted_first_at_capacity() {
        let mut buffer = RecentMarkerBuffer::new();
        for i in 0..7u64 {
            buffer.push(i * 10, i);
        }

        let snap = buffer.snapshot();
        assert_eq!(snap.len(), RECENT_MARKER_CAPACITY);
        // Entries 0 and 1 evicted; 2..=6 retained in push order
        let pcs: Vec<u64> = snap.iter().map(|pair| pair.pc).collect();
        assert_eq!(pcs, vec![20, 30, 40, 50, 60]);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut buffer = RecentMarkerBuffer::new();
        for i in 0..1000u64 {
            buffer.push(i, i);
            assert!(buffer.len() <= RECENT_MARKER_CAPACITY);
        }
    }

    #[test]
    fn test_clear_empties_window() {
        let mut buffer = RecentMarkerBuffer::new();
        buffer.push(1, 1);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.latest(), None);
    }
}
