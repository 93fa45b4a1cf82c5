//! Instruction-address classification
//!
//! An [`AddrRange`] is a half-open interval `[start, end)` over instruction
//! addresses. A [`RangeFilter`] bundles the three range sets a probe classifies
//! against: the basic-block valid range, the marker valid range, and the
//! exclude set.
//!
//! `RangeFilter` is an immutable value. Probes keep the current filter behind
//! an `Arc` and replace the whole object on reconfiguration, so a classifier
//! that grabbed the `Arc` at the start of an instruction observes either the
//! old or the new configuration entirely, never a half-applied update.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Half-open interval `[start, end)` over instruction addresses.
///
/// The `(0, 0)` sentinel ([`AddrRange::UNBOUNDED`]) disables bounding and
/// matches every address. The sentinel is interpreted uniformly: placed in an
/// exclude set it excludes everything.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddrRange {
    start: u64,
    end: u64,
}

impl AddrRange {
    /// The `(0, 0)` sentinel: matches every address.
    pub const UNBOUNDED: AddrRange = AddrRange { start: 0, end: 0 };

    /// Create a range, rejecting `end < start`.
    pub fn new(start: u64, end: u64) -> Result<Self, ConfigError> {
        if end < start {
            return Err(ConfigError::MalformedRange { start, end });
        }
        Ok(AddrRange { start, end })
    }

    /// Inclusive lower bound.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Exclusive upper bound.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// True for the `(0, 0)` sentinel.
    pub fn is_unbounded(&self) -> bool {
        self.start == 0 && self.end == 0
    }

    /// True iff this range is the unbounded sentinel or `start <= addr < end`.
    pub fn contains(&self, addr: u64) -> bool {
        self.is_unbounded() || (self.start <= addr && addr < self.end)
    }

    /// Re-validate a range that may have bypassed [`AddrRange::new`]
    /// (e.g. one built by deserializing untrusted config).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.end < self.start {
            return Err(ConfigError::MalformedRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }
}

impl Default for AddrRange {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

/// The complete address-classification configuration of one probe.
///
/// Overlapping exclude ranges are permitted; exclusion is idempotent. An empty
/// exclude set excludes nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RangeFilter {
    bb_range: AddrRange,
    marker_range: AddrRange,
    exclude: Vec<AddrRange>,
}

impl RangeFilter {
    /// Bundle the three range sets into one immutable filter value.
    pub fn new(bb_range: AddrRange, marker_range: AddrRange, exclude: Vec<AddrRange>) -> Self {
        RangeFilter {
            bb_range,
            marker_range,
            exclude,
        }
    }

    /// The basic-block valid range.
    pub fn bb_range(&self) -> AddrRange {
        self.bb_range
    }

    /// The loop-marker valid range.
    pub fn marker_range(&self) -> AddrRange {
        self.marker_range
    }

    /// The current exclude set.
    pub fn exclude_ranges(&self) -> &[AddrRange] {
        &self.exclude
    }

    /// True iff `addr` falls within any range in the exclude set.
    pub fn is_excluded(&self, addr: u64) -> bool {
        self.exclude.iter().any(|range| range.contains(addr))
    }

    /// Copy of this filter with a replaced basic-block valid range.
    pub(crate) fn with_bb_range(&self, bb_range: AddrRange) -> Self {
        RangeFilter {
            bb_range,
            ..self.clone()
        }
    }

    /// Copy of this filter with a replaced marker valid range.
    pub(crate) fn with_marker_range(&self, marker_range: AddrRange) -> Self {
        RangeFilter {
            marker_range,
            ..self.clone()
        }
    }

    /// Copy of this filter with one more exclude range appended.
    pub(crate) fn with_exclude_range(&self, range: AddrRange) -> Self {
        let mut next = self.clone();
        next.exclude.push(range);
        next
    }
}
