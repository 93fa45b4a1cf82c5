//! LoopPoint Phase-Analysis Engine
//!
//! This crate observes a stream of committed instructions from a simulated
//! CPU core and partitions execution into fixed-length instruction regions:
//! - **Probe** ([`CommitProbe`]): one per hardware thread context; classifies
//!   each committed instruction by address range and accumulates basic-block
//!   frequencies and recent loop markers (`probe`, `profile`, `range` modules)
//! - **Coordinator** ([`RegionCoordinator`]): shared across all probes;
//!   tallies global instruction progress and raises a [`RegionBoundary`]
//!   event at each region-length multiple (`region` module)
//!
//! The engine only signals boundaries; what to do at one (checkpointing,
//! fidelity switching) is the consumer's business. Likewise it supplies raw
//! frequency and marker snapshots; similarity analysis over them happens
//! offline.
//!
//! # Example
//!
//! ```rust,ignore
//! use looppoint_engine::{
//!     CommitProbe, PrivilegeLevel, ProbeConfig, RegionConfig, RegionCoordinator,
//! };
//!
//! let coordinator = RegionCoordinator::new(RegionConfig {
//!     region_length: 1_000_000,
//!     raise_exit_events: true,
//! })?;
//! let probe = CommitProbe::new(ProbeConfig::default(), coordinator.clone())?;
//! let boundaries = coordinator.boundary_events();
//!
//! // Per committed instruction, from the host simulator's event queue:
//! probe.observe(0x401000, PrivilegeLevel::User);
//!
//! for boundary in boundaries.try_iter() {
//!     println!("region {} at {}", boundary.region_index, boundary.global_inst_count);
//! }
//! ```
//!
//! # Concurrency model
//!
//! Single-threaded and event-driven: the host delivers commit notifications
//! one at a time from its own event queue, and the counting path relies on
//! that serialization. State is still interior-mutable behind `Arc` so the
//! orchestration layer can hold the same handles as the pipeline; queries
//! and toggles are safe at any point between instructions.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod probe;
pub mod profile;
pub mod range;
pub mod region;

pub use config::{ProbeConfig, RegionConfig};
pub use error::ConfigError;
pub use probe::{CommitProbe, PrivilegeLevel, ProbeId};
pub use profile::{BlockFreqTable, MarkerPair, RecentMarkerBuffer, RECENT_MARKER_CAPACITY};
pub use range::{AddrRange, RangeFilter};
pub use region::{RegionBoundary, RegionCoordinator};
