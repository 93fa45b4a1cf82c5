//! Configuration error taxonomy
//!
//! All errors in this engine surface at construction or registration time and
//! are fatal for the component being built. The per-instruction path has no
//! error conditions: every operation on it is total.

use crate::probe::ProbeId;

/// Errors raised while constructing or wiring engine components.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Region length of zero has no valid boundary semantics
    #[error("region length must be positive")]
    InvalidRegionLength,

    /// Address range whose end precedes its start
    #[error("malformed address range: end {end:#x} precedes start {start:#x}")]
    MalformedRange {
        /// Inclusive lower bound of the rejected range
        start: u64,
        /// Exclusive upper bound of the rejected range
        end: u64,
    },

    /// A probe is already registered under this identity
    #[error("probe id {0} is already registered with the coordinator")]
    DuplicateProbeId(ProbeId),
}
