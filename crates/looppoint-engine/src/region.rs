//! Region coordinator: global instruction tally and boundary signaling
//!
//! One [`RegionCoordinator`] is shared by every probe in the simulation. It
//! owns the global committed-instruction counter, the globally most recent
//! PC, and the per-PC marker counts, and it raises a [`RegionBoundary`] event
//! each time the counter reaches a multiple of the configured region length.
//!
//! The host simulator serializes all `tick` calls through its event queue;
//! the coordinator relies on that contract rather than enforcing mutual
//! exclusion on the counting path. Counters use `Relaxed` atomics so queries
//! from the orchestration layer stay lock-free.
//!
//! ## Boundary policy
//!
//! Exactly one event fires per integer multiple of the region length while
//! raising is enabled. The next-multiple tracker advances on every crossing,
//! so multiples crossed while raising is disabled are skipped, never
//! retro-fired. [`clear_global_inst_count`](RegionCoordinator::clear_global_inst_count)
//! resets both the counter and the tracker, so a boundary is not immediately
//! re-signaled on the next tick.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crossbeam::channel::{self, Receiver, Sender};
use log::debug;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::RegionConfig;
use crate::error::ConfigError;
use crate::probe::{CommitProbe, ProbeId};
use crate::profile::MarkerPair;

/// One-shot signal emitted when the global instruction counter crosses a
/// region-length multiple.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionBoundary {
    /// Ordinal of the multiple that was crossed (1-based)
    pub region_index: u64,
    /// Global instruction count at the crossing
    pub global_inst_count: u64,
    /// PC of the instruction that crossed the boundary
    pub pc: u64,
}

/// Shared aggregator for all observation points.
pub struct RegionCoordinator {
    region_length: u64,

    global_inst_count: AtomicU64,
    /// Counter value at which the next boundary fires
    next_boundary: AtomicU64,
    most_recent_pc: AtomicU64,
    raise_exit_events: AtomicBool,

    /// How often each marker PC has been observed, across all probes
    marker_counts: Mutex<FxHashMap<u64, u64>>,

    /// Non-owning registry of the probes feeding this coordinator
    probes: Mutex<FxHashMap<ProbeId, Weak<CommitProbe>>>,

    boundary_tx: Sender<RegionBoundary>,
    boundary_rx: Receiver<RegionBoundary>,
}

impl RegionCoordinator {
    /// Build a coordinator. A region length of zero is fatal: no valid
    /// boundary semantics exist for it.
    pub fn new(config: RegionConfig) -> Result<Arc<Self>, ConfigError> {
        if config.region_length == 0 {
            return Err(ConfigError::InvalidRegionLength);
        }
        let (boundary_tx, boundary_rx) = channel::unbounded();
        debug!("region coordinator: region length {}", config.region_length);
        Ok(Arc::new(RegionCoordinator {
            region_length: config.region_length,
            global_inst_count: AtomicU64::new(0),
            next_boundary: AtomicU64::new(config.region_length),
            most_recent_pc: AtomicU64::new(0),
            raise_exit_events: AtomicBool::new(config.raise_exit_events),
            marker_counts: Mutex::new(FxHashMap::default()),
            probes: Mutex::new(FxHashMap::default()),
            boundary_tx,
            boundary_rx,
        }))
    }

    /// Instructions per region.
    pub fn region_length(&self) -> u64 {
        self.region_length
    }

    /// Record one committed instruction at `pc`.
    ///
    /// Called by probes for every non-excluded instruction they observe.
    /// Advances the global counter by exactly 1, so each region-length
    /// multiple is reached exactly once.
    pub fn tick(&self, pc: u64) {
        let count = self.global_inst_count.fetch_add(1, Ordering::Relaxed) + 1;
        self.most_recent_pc.store(pc, Ordering::Relaxed);

        if count == self.next_boundary.load(Ordering::Relaxed) {
            // Advance even while disabled: skipped multiples are never
            // retro-fired after re-enabling.
            self.next_boundary
                .store(count + self.region_length, Ordering::Relaxed);
            if self.raise_exit_events.load(Ordering::Relaxed) {
                let boundary = RegionBoundary {
                    region_index: count / self.region_length,
                    global_inst_count: count,
                    pc,
                };
                debug!(
                    "region boundary {} at count {} (pc {:#x})",
                    boundary.region_index, count, pc
                );
                // The controller may have dropped its receiver; counting
                // continues either way.
                let _ = self.boundary_tx.send(boundary);
            }
        }
    }

    /// Receiver for boundary events. May be called any number of times;
    /// all receivers drain the same stream.
    pub fn boundary_events(&self) -> Receiver<RegionBoundary> {
        self.boundary_rx.clone()
    }

    /// Raise a boundary event at each future region-length multiple.
    pub fn enable_exit_events(&self) {
        self.raise_exit_events.store(true, Ordering::Relaxed);
        debug!("region coordinator: exit events enabled");
    }

    /// Stop raising boundary events; counting is unaffected.
    pub fn disable_exit_events(&self) {
        self.raise_exit_events.store(false, Ordering::Relaxed);
        debug!("region coordinator: exit events disabled");
    }

    /// True while boundary crossings raise events.
    pub fn is_raising_exit_events(&self) -> bool {
        self.raise_exit_events.load(Ordering::Relaxed)
    }

    /// Total committed instructions ticked since construction or the last
    /// [`clear_global_inst_count`](Self::clear_global_inst_count).
    pub fn global_inst_count(&self) -> u64 {
        self.global_inst_count.load(Ordering::Relaxed)
    }

    /// Reset the global counter to zero and re-arm the boundary tracker at
    /// one full region length.
    pub fn clear_global_inst_count(&self) {
        self.global_inst_count.store(0, Ordering::Relaxed);
        self.next_boundary
            .store(self.region_length, Ordering::Relaxed);
        debug!("region coordinator: global instruction counter cleared");
    }

    /// PC of the most recently ticked instruction, across all probes.
    pub fn global_most_recent_pc(&self) -> u64 {
        self.most_recent_pc.load(Ordering::Relaxed)
    }

    // ------------------------------------------------------------------
    // Marker aggregation
    // ------------------------------------------------------------------

    /// Count one observation of marker `pc`. Called by probes when a marker
    /// lands in their marker valid range.
    pub(crate) fn record_marker(&self, pc: u64) {
        *self.marker_counts.lock().entry(pc).or_insert(0) += 1;
    }

    /// Snapshot of the per-PC marker observation counts.
    pub fn marker_counts(&self) -> FxHashMap<u64, u64> {
        self.marker_counts.lock().clone()
    }

    /// Observation count for one marker PC, if it has ever been seen.
    pub fn marker_count(&self, pc: u64) -> Option<u64> {
        self.marker_counts.lock().get(&pc).copied()
    }

    // ------------------------------------------------------------------
    // Probe registry
    // ------------------------------------------------------------------

    /// Register a probe under `id`. The coordinator never owns its probes;
    /// a dead entry under the same id is silently replaced.
    pub(crate) fn register_probe(
        &self,
        id: ProbeId,
        probe: Weak<CommitProbe>,
    ) -> Result<(), ConfigError> {
        let mut probes = self.probes.lock();
        if let Some(existing) = probes.get(&id) {
            if existing.upgrade().is_some() {
                return Err(ConfigError::DuplicateProbeId(id));
            }
        }
        probes.insert(id, probe);
        Ok(())
    }

    /// Remove a probe from the registry. Unknown ids are a no-op.
    pub fn unregister_probe(&self, id: ProbeId) {
        self.probes.lock().remove(&id);
    }

    /// Identities of the currently live registered probes.
    pub fn probe_ids(&self) -> Vec<ProbeId> {
        let mut probes = self.probes.lock();
        probes.retain(|_, weak| weak.upgrade().is_some());
        probes.keys().copied().collect()
    }

    /// Recent-marker snapshot of the probe registered under `id`.
    ///
    /// `None` for unknown ids and for probes that have been dropped; dead
    /// entries are pruned on the way.
    pub fn probe_markers(&self, id: ProbeId) -> Option<Vec<MarkerPair>> {
        self.with_probe(id, |probe| probe.recent_markers())
    }

    /// Basic-block frequency snapshot of the probe registered under `id`.
    pub fn probe_bb_freq(&self, id: ProbeId) -> Option<FxHashMap<u64, u64>> {
        self.with_probe(id, |probe| probe.bb_freq())
    }

    fn with_probe<T>(&self, id: ProbeId, f: impl FnOnce(&CommitProbe) -> T) -> Option<T> {
        let mut probes = self.probes.lock();
        match probes.get(&id).and_then(Weak::upgrade) {
            Some(probe) => Some(f(&probe)),
            None => {
                probes.remove(&id);
                None
            }
        }
    }
}

impl std::fmt::Debug for RegionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionCoordinator")
            .field("region_length", &self.region_length)
            .field("global_inst_count", &self.global_inst_count())
            .field("raising_exit_events", &self.is_raising_exit_events())
            .finish_non_exhaustive()
    }
}
