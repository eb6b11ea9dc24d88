use crate::{checksum::Checksum, types::SimTime};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Savegame encoding error: {0}")]
    Encoding(#[from] serde_cbor::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid tick: expected at least {expected}, got {actual}")]
    TickMismatch { expected: SimTime, actual: SimTime },

    #[error("Clock is paused at tick {tick}")]
    ClockPaused { tick: SimTime },

    #[error("Invalid map geometry: {0}")]
    InvalidMap(String),

    #[error("Pathfield pool exhausted: all {capacity} containers are held by in-flight searches")]
    PathfieldPoolExhausted { capacity: usize },

    #[error("Determinism violation at tick {tick}: local {local}, remote {remote}")]
    DeterminismViolation {
        tick:   SimTime,
        local:  Checksum,
        remote: Checksum,
    },

    #[error("Malformed program '{program}' at step {step}: {reason}")]
    MalformedProgram {
        program: String,
        step:    usize,
        reason:  String,
    },

    #[error("Malformed savegame: {0}")]
    MalformedState(String),

    #[error("Unsupported savegame version {found} (expected {expected})")]
    UnsupportedVersion { found: u16, expected: u16 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SimResult<T> = Result<T, SimError>;
