//! Per-thread profile accumulators
//!
//! The aggregate state each observation point maintains while listening:
//! - [`BlockFreqTable`]: basic-block execution frequencies
//! - [`RecentMarkerBuffer`]: rolling window of the most recent loop markers

pub mod freq;
pub mod markers;

pub use freq::BlockFreqTable;
pub use markers::{MarkerPair, RecentMarkerBuffer, RECENT_MARKER_CAPACITY};
