//! Shared primitive types used across the entire simulation.

/// A simulation tick. Every peer advances the same tick sequence.
pub type SimTime = u64;

/// A player slot in the session (1-based, as agreed by all peers).
pub type PlayerNumber = u8;

/// The session seed agreed by all peers before tick 0.
pub type Seed = u32;

/// The canonical run identifier.
pub type RunId = String;

/// A ware kind carried by workers and stocked in homes.
pub type WareName = String;
