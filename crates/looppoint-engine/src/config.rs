//! Construction-time configuration
//!
//! Options consumed once when a probe or coordinator is built. Everything
//! here is also reachable through runtime mutators on the built components;
//! these structs only pick the initial state.

use serde::{Deserialize, Serialize};

use crate::probe::ProbeId;
use crate::range::AddrRange;

/// Options for creating a [`CommitProbe`](crate::probe::CommitProbe).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Identity under which the probe registers with the coordinator
    /// (typically the hardware thread/context id)
    pub id: ProbeId,

    /// Valid address range for basic-block frequency tracking
    pub bb_valid_range: AddrRange,

    /// Valid address range for loop-marker tracking
    pub marker_valid_range: AddrRange,

    /// Initial exclude set
    pub exclude_ranges: Vec<AddrRange>,

    /// Whether the probe observes committed instructions from the start
    pub start_listening: bool,

    /// Whether kernel-instruction filtering is active from the start
    pub start_kernel_filter: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            id: ProbeId::new(0),
            bb_valid_range: AddrRange::UNBOUNDED,
            marker_valid_range: AddrRange::UNBOUNDED,
            exclude_ranges: Vec::new(),
            start_listening: true,
            start_kernel_filter: true,
        }
    }
}

/// Options for creating a [`RegionCoordinator`](crate::region::RegionCoordinator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Instructions per region; a boundary event fires at each multiple
    pub region_length: u64,

    /// Whether boundary events are raised from the start
    pub raise_exit_events: bool,
}

impl Default for RegionConfig {
    fn default() -> Self {
        RegionConfig {
            region_length: 100_000_000,
            raise_exit_events: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_config_defaults() {
        let config = ProbeConfig::default();
        assert!(config.bb_valid_range.is_unbounded());
        assert!(config.marker_valid_range.is_unbounded());
        assert!(config.exclude_ranges.is_empty());
        assert!(config.start_listening);
        assert!(config.start_kernel_filter);
    }

    #[test]
    fn test_region_config_defaults() {
        let config = RegionConfig::default();
        assert_eq!(config.region_length, 100_000_000);
        assert!(config.raise_exit_events);
    }
}
