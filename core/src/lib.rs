//! lockstep-core: a deterministic simulation core for lockstep multiplayer.
//!
//! Every peer of a session runs its own SimEngine from the same seed and
//! the same command stream; the engine guarantees bit-identical state
//! and periodically proves it with a checksum.

pub mod actor;
pub mod building;
pub mod checksum;
pub mod clock;
pub mod cmdqueue;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod interpreter;
pub mod map;
pub mod object;
pub mod pathfield;
pub mod program;
pub mod region;
pub mod rng;
pub mod router;
pub mod scenario;
pub mod snapshot;
pub mod store;
pub mod types;
pub mod vision;
pub mod world;
