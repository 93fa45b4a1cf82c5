//! Observation point: the per-thread commit probe
//!
//! One [`CommitProbe`] attaches to each hardware thread context. The host
//! simulator calls [`CommitProbe::observe`] once per committed instruction;
//! the probe classifies the address, accumulates the per-thread frequency and
//! marker state, and forwards region progress to the shared
//! [`RegionCoordinator`](crate::region::RegionCoordinator).
//!
//! ## Tick policy
//!
//! Region progress models wall-clock-like progress, not analysis-relevant
//! instruction count:
//! - excluded addresses never tick the coordinator (exclusion is the one
//!   filter that gates region progress);
//! - everything else ticks, regardless of the listening state and of kernel
//!   filtering.
//!
//! Listening gates all per-thread accumulation (frequencies, markers, the
//! privilege counters). Toggles take effect from the next observed
//! instruction on; already-processed instructions are never reclassified.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::ProbeConfig;
use crate::error::ConfigError;
use crate::profile::{BlockFreqTable, MarkerPair, RecentMarkerBuffer};
use crate::range::{AddrRange, RangeFilter};
use crate::region::RegionCoordinator;

/// Identity of a probe within the coordinator's registry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProbeId(u64);

impl ProbeId {
    /// Wrap a raw identity (typically the hardware thread/context id).
    pub fn new(raw: u64) -> Self {
        ProbeId(raw)
    }

    /// The raw identity value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Privilege level of a committed instruction, as reported by the pipeline.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrivilegeLevel {
    /// User-mode execution
    User,
    /// Kernel/supervisor-mode execution
    Kernel,
}

/// Per-thread observation point over the committed-instruction stream.
///
/// All state is interior-mutable so a probe can be shared as `Arc` between
/// the host pipeline (calling [`observe`](Self::observe)) and the
/// orchestration layer (calling queries and toggles). Delivery is serialized
/// by the host's event queue; no method blocks.
pub struct CommitProbe {
    id: ProbeId,
    coordinator: Arc<RegionCoordinator>,

    /// Current classification config; replaced wholesale on mutation
    filter: RwLock<Arc<RangeFilter>>,

    listening: AtomicBool,
    filtering_kernel: AtomicBool,

    bb_freq: Mutex<BlockFreqTable>,
    markers: Mutex<RecentMarkerBuffer>,

    filtered_kernel_insts: AtomicU64,
    filtered_user_insts: AtomicU64,
}

impl CommitProbe {
    /// Build a probe and register it with `coordinator` under `config.id`.
    ///
    /// Fails if any configured range is malformed or the id is already
    /// registered to a live probe.
    pub fn new(
        config: ProbeConfig,
        coordinator: Arc<RegionCoordinator>,
    ) -> Result<Arc<Self>, ConfigError> {
        config.bb_valid_range.validate()?;
        config.marker_valid_range.validate()?;
        for range in &config.exclude_ranges {
            range.validate()?;
        }

        let filter = RangeFilter::new(
            config.bb_valid_range,
            config.marker_valid_range,
            config.exclude_ranges,
        );
        let probe = Arc::new(CommitProbe {
            id: config.id,
            coordinator,
            filter: RwLock::new(Arc::new(filter)),
            listening: AtomicBool::new(config.start_listening),
            filtering_kernel: AtomicBool::new(config.start_kernel_filter),
            bb_freq: Mutex::new(BlockFreqTable::new()),
            markers: Mutex::new(RecentMarkerBuffer::new()),
            filtered_kernel_insts: AtomicU64::new(0),
            filtered_user_insts: AtomicU64::new(0),
        });
        probe
            .coordinator
            .register_probe(probe.id, Arc::downgrade(&probe))?;
        debug!(
            "probe {}: registered (listening={}, kernel_filter={})",
            probe.id,
            config.start_listening,
            config.start_kernel_filter
        );
        Ok(probe)
    }

    /// Identity under which this probe is registered.
    pub fn id(&self) -> ProbeId {
        self.id
    }

    /// Process one committed instruction.
    pub fn observe(&self, pc: u64, privilege: PrivilegeLevel) {
        let filter = self.filter.read().clone();
        let listening = self.listening.load(Ordering::Relaxed);
        let kernel_filtered = privilege == PrivilegeLevel::Kernel
            && self.filtering_kernel.load(Ordering::Relaxed);

        if listening {
            if kernel_filtered {
                self.filtered_kernel_insts.fetch_add(1, Ordering::Relaxed);
            } else {
                self.filtered_user_insts.fetch_add(1, Ordering::Relaxed);
            }
        }

        // Exclusion wins over everything, including region progress.
        if filter.is_excluded(pc) {
            return;
        }

        self.coordinator.tick(pc);

        if !listening || kernel_filtered {
            return;
        }

        if filter.bb_range().contains(pc) {
            self.bb_freq.lock().record(pc);
        }

        if filter.marker_range().contains(pc) {
            let global_count = self.coordinator.global_inst_count();
            self.markers.lock().push(pc, global_count);
            self.coordinator.record_marker(pc);
        }
    }

    // ------------------------------------------------------------------
    // Listening / kernel-filter state machines
    // ------------------------------------------------------------------

    /// Start observing committed instructions.
    pub fn start_listening(&self) {
        self.listening.store(true, Ordering::Relaxed);
        debug!("probe {}: listening started", self.id);
    }

    /// Stop observing committed instructions. Accumulated state is kept.
    pub fn stop_listening(&self) {
        self.listening.store(false, Ordering::Relaxed);
        debug!("probe {}: listening stopped", self.id);
    }

    /// True while the probe accumulates per-instruction state.
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed)
    }

    /// Start filtering kernel instructions out of frequency/marker tracking.
    pub fn start_kernel_filter(&self) {
        self.filtering_kernel.store(true, Ordering::Relaxed);
        debug!("probe {}: kernel filter started", self.id);
    }

    /// Stop filtering kernel instructions.
    pub fn stop_kernel_filter(&self) {
        self.filtering_kernel.store(false, Ordering::Relaxed);
        debug!("probe {}: kernel filter stopped", self.id);
    }

    /// True while kernel instructions are excluded from analysis tracking.
    pub fn is_filtering_kernel(&self) -> bool {
        self.filtering_kernel.load(Ordering::Relaxed)
    }

    // ------------------------------------------------------------------
    // Range reconfiguration (atomic whole-filter swap)
    // ------------------------------------------------------------------

    /// Replace the basic-block valid range.
    pub fn set_bb_valid_range(&self, range: AddrRange) {
        let mut guard = self.filter.write();
        *guard = Arc::new(guard.with_bb_range(range));
        debug!(
            "probe {}: bb valid range now [{:#x}, {:#x})",
            self.id,
            range.start(),
            range.end()
        );
    }

    /// Replace the marker valid range.
    pub fn set_marker_valid_range(&self, range: AddrRange) {
        let mut guard = self.filter.write();
        *guard = Arc::new(guard.with_marker_range(range));
        debug!(
            "probe {}: marker valid range now [{:#x}, {:#x})",
            self.id,
            range.start(),
            range.end()
        );
    }

    /// Append a range to the exclude set.
    pub fn add_exclude_range(&self, range: AddrRange) {
        let mut guard = self.filter.write();
        *guard = Arc::new(guard.with_exclude_range(range));
        debug!(
            "probe {}: exclude range [{:#x}, {:#x}) added ({} total)",
            self.id,
            range.start(),
            range.end(),
            guard.exclude_ranges().len()
        );
    }

    /// Snapshot of the current classification config.
    pub fn filter(&self) -> Arc<RangeFilter> {
        self.filter.read().clone()
    }

    // ------------------------------------------------------------------
    // Queries and clears
    // ------------------------------------------------------------------

    /// Snapshot of the basic-block frequency table.
    pub fn bb_freq(&self) -> FxHashMap<u64, u64> {
        self.bb_freq.lock().snapshot()
    }

    /// Reset the basic-block frequency table to empty.
    pub fn clear_bb_freq(&self) {
        self.bb_freq.lock().clear();
    }

    /// Snapshot of the recent loop markers, oldest to newest.
    pub fn recent_markers(&self) -> Vec<MarkerPair> {
        self.markers.lock().snapshot()
    }

    /// Drop all retained loop markers.
    pub fn clear_recent_markers(&self) {
        self.markers.lock().clear();
    }

    /// Kernel instructions filtered while listening.
    pub fn filtered_kernel_inst_count(&self) -> u64 {
        self.filtered_kernel_insts.load(Ordering::Relaxed)
    }

    /// Non-kernel-filtered instructions observed while listening.
    pub fn filtered_user_inst_count(&self) -> u64 {
        self.filtered_user_insts.load(Ordering::Relaxed)
    }

    /// Reset the kernel filtered-instruction counter.
    pub fn clear_filtered_kernel_inst_count(&self) {
        self.filtered_kernel_insts.store(0, Ordering::Relaxed);
    }

    /// Reset the user filtered-instruction counter.
    pub fn clear_filtered_user_inst_count(&self) {
        self.filtered_user_insts.store(0, Ordering::Relaxed);
    }
}

impl fmt::Debug for CommitProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitProbe")
            .field("id", &self.id)
            .field("listening", &self.is_listening())
            .field("filtering_kernel", &self.is_filtering_kernel())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegionConfig;

    fn coordinator() -> Arc<RegionCoordinator> {
        RegionCoordinator::new(RegionConfig {
            region_length: 1_000_000,
            raise_exit_events: false,
        })
        .unwrap()
    }

    fn probe_with(config: ProbeConfig) -> Arc<CommitProbe> {
        CommitProbe::new(config, coordinator()).unwrap()
    }

    #[test]
    fn test_initial_state_from_config() {
        let probe = probe_with(ProbeConfig {
            start_listening: false,
            start_kernel_filter: false,
            ..ProbeConfig::default()
        });
        assert!(!probe.is_listening());
        assert!(!probe.is_filtering_kernel());
    }

    #[test]
    fn test_bb_frequency_accumulation() {
        let probe = probe_with(ProbeConfig {
            start_kernel_filter: false,
            ..ProbeConfig::default()
        });
        for pc in [10u64, 10, 20, 30, 10] {
            probe.observe(pc, PrivilegeLevel::User);
        }
        let freq = probe.bb_freq();
        assert_eq!(freq.get(&10), Some(&3));
        assert_eq!(freq.get(&20), Some(&1));
        assert_eq!(freq.get(&30), Some(&1));
    }

    #[test]
    fn test_bb_range_limits_recording() {
        let probe = probe_with(ProbeConfig {
            bb_valid_range: AddrRange::new(0x100, 0x200).unwrap(),
            start_kernel_filter: false,
            ..ProbeConfig::default()
        });
        probe.observe(0x150, PrivilegeLevel::User);
        probe.observe(0x250, PrivilegeLevel::User);
        let freq = probe.bb_freq();
        assert_eq!(freq.len(), 1);
        assert_eq!(freq.get(&0x150), Some(&1));
    }

    #[test]
    fn test_kernel_filter_gates_analysis_not_progress() {
        let coordinator = coordinator();
        let probe = CommitProbe::new(ProbeConfig::default(), coordinator.clone()).unwrap();

        probe.observe(0x10, PrivilegeLevel::Kernel);
        probe.observe(0x20, PrivilegeLevel::User);

        assert!(probe.bb_freq().get(&0x10).is_none());
        assert_eq!(probe.bb_freq().get(&0x20), Some(&1));
        assert_eq!(probe.filtered_kernel_inst_count(), 1);
        assert_eq!(probe.filtered_user_inst_count(), 1);
        // Both instructions advanced the region counter
        assert_eq!(coordinator.global_inst_count(), 2);
    }

    #[test]
    fn test_kernel_counts_as_user_when_filter_off() {
        let probe = probe_with(ProbeConfig {
            start_kernel_filter: false,
            ..ProbeConfig::default()
        });
        probe.observe(0x10, PrivilegeLevel::Kernel);
        assert_eq!(probe.filtered_kernel_inst_count(), 0);
        assert_eq!(probe.filtered_user_inst_count(), 1);
        assert_eq!(probe.bb_freq().get(&0x10), Some(&1));
    }

    #[test]
    fn test_excluded_address_is_fully_ignored() {
        let coordinator = coordinator();
        let probe = CommitProbe::new(
            ProbeConfig {
                exclude_ranges: vec![AddrRange::new(0x100, 0x200).unwrap()],
                start_kernel_filter: false,
                ..ProbeConfig::default()
            },
            coordinator.clone(),
        )
        .unwrap();

        probe.observe(0x150, PrivilegeLevel::User);
        assert!(probe.bb_freq().is_empty());
        assert!(probe.recent_markers().is_empty());
        // No region progress for excluded addresses
        assert_eq!(coordinator.global_inst_count(), 0);
        // Privilege bookkeeping still happened
        assert_eq!(probe.filtered_user_inst_count(), 1);
    }

    #[test]
    fn test_stop_listening_freezes_accumulation() {
        let coordinator = coordinator();
        let probe = CommitProbe::new(
            ProbeConfig {
                start_kernel_filter: false,
                ..ProbeConfig::default()
            },
            coordinator.clone(),
        )
        .unwrap();

        probe.observe(0x10, PrivilegeLevel::User);
        probe.stop_listening();
        probe.observe(0x10, PrivilegeLevel::User);
        probe.observe(0x20, PrivilegeLevel::Kernel);

        assert_eq!(probe.bb_freq().get(&0x10), Some(&1));
        assert_eq!(probe.filtered_user_inst_count(), 1);
        assert_eq!(probe.filtered_kernel_inst_count(), 0);
        // Region progress continues while stopped
        assert_eq!(coordinator.global_inst_count(), 3);

        probe.start_listening();
        probe.observe(0x10, PrivilegeLevel::User);
        assert_eq!(probe.bb_freq().get(&0x10), Some(&2));
    }

    #[test]
    fn test_marker_window_scenario() {
        // Marker range [100, 200); 250 is outside it
        let probe = probe_with(ProbeConfig {
            marker_valid_range: AddrRange::new(100, 200).unwrap(),
            start_kernel_filter: false,
            ..ProbeConfig::default()
        });
        for pc in [150u64, 160, 250, 170, 180, 190] {
            probe.observe(pc, PrivilegeLevel::User);
        }
        let pcs: Vec<u64> = probe.recent_markers().iter().map(|pair| pair.pc).collect();
        assert_eq!(pcs, vec![150, 160, 170, 180, 190]);
    }

    #[test]
    fn test_marker_records_global_count_after_tick() {
        let probe = probe_with(ProbeConfig {
            start_kernel_filter: false,
            ..ProbeConfig::default()
        });
        probe.observe(0x10, PrivilegeLevel::User);
        probe.observe(0x20, PrivilegeLevel::User);
        let markers = probe.recent_markers();
        assert_eq!(markers[0].global_count, 1);
        assert_eq!(markers[1].global_count, 2);
    }

    #[test]
    fn test_range_mutation_mid_stream() {
        let probe = probe_with(ProbeConfig {
            start_kernel_filter: false,
            ..ProbeConfig::default()
        });
        probe.observe(0x10, PrivilegeLevel::User);
        probe.set_bb_valid_range(AddrRange::new(0x100, 0x200).unwrap());
        probe.observe(0x10, PrivilegeLevel::User);
        probe.observe(0x150, PrivilegeLevel::User);

        let freq = probe.bb_freq();
        assert_eq!(freq.get(&0x10), Some(&1));
        assert_eq!(freq.get(&0x150), Some(&1));
    }

    #[test]
    fn test_clears_are_independent() {
        let probe = probe_with(ProbeConfig {
            start_kernel_filter: false,
            ..ProbeConfig::default()
        });
        probe.observe(0x10, PrivilegeLevel::User);
        probe.clear_bb_freq();
        assert!(probe.bb_freq().is_empty());
        // Markers and counters untouched by the frequency clear
        assert_eq!(probe.recent_markers().len(), 1);
        assert_eq!(probe.filtered_user_inst_count(), 1);

        probe.clear_filtered_user_inst_count();
        assert_eq!(probe.filtered_user_inst_count(), 0);
        assert_eq!(probe.recent_markers().len(), 1);

        probe.clear_recent_markers();
        assert!(probe.recent_markers().is_empty());
    }

    #[test]
    fn test_malformed_config_range_rejected() {
        let result = CommitProbe::new(
            ProbeConfig {
                exclude_ranges: vec![AddrRange::UNBOUNDED, {
                    // Deserialized configs can carry ranges that bypassed
                    // AddrRange::new; simulate one via serde.
                    serde_json::from_str::<AddrRange>(r#"{"start": 16, "end": 8}"#).unwrap()
                }],
                ..ProbeConfig::default()
            },
            coordinator(),
        );
        assert!(matches!(
            result,
            Err(ConfigError::MalformedRange { start: 16, end: 8 })
        ));
    }
}
