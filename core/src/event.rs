//! The event log: everything observable that happened in a tick.
//!
//! RULE: Events are output only. Nothing in the simulation reads them
//! back, so tooling may filter or drop them without affecting state.

use crate::{
    actor::TaskKind,
    checksum::Checksum,
    map::Coords,
    object::ObjectId,
    types::{PlayerNumber, RunId, Seed, SimTime, WareName},
};
use serde::{Deserialize, Serialize};

/// Every event emitted during simulation.
/// Variants are only ever appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    // ── Engine events ──────────────────────────────
    TickStarted {
        tick: SimTime,
    },
    TickCompleted {
        tick: SimTime,
    },
    RunInitialized {
        run_id: RunId,
        seed:   Seed,
    },
    ChecksumComputed {
        tick:   SimTime,
        digest: Checksum,
    },

    // ── Player command events ──────────────────────
    CommandRejected {
        tick:   SimTime,
        reason: String,
    },
    HomeBuilt {
        tick:     SimTime,
        building: ObjectId,
        player:   PlayerNumber,
        at:       Coords,
    },
    ActorSpawned {
        tick:   SimTime,
        actor:  ObjectId,
        player: PlayerNumber,
        kind:   String,
    },
    ActorDestroyed {
        tick:  SimTime,
        actor: ObjectId,
    },
    TerrainChanged {
        tick:    SimTime,
        at:      Coords,
        blocked: bool,
    },

    // ── Task events ────────────────────────────────
    WareCreated {
        tick:  SimTime,
        actor: ObjectId,
        ware:  WareName,
    },
    WareDelivered {
        tick:     SimTime,
        actor:    ObjectId,
        building: ObjectId,
        ware:     WareName,
    },
    WareHandedOver {
        tick: SimTime,
        from: ObjectId,
        to:   ObjectId,
        ware: WareName,
    },
    TaskFailed {
        tick:   SimTime,
        actor:  ObjectId,
        task:   TaskKind,
        reason: String,
    },
    ProgramAbandoned {
        tick:    SimTime,
        actor:   ObjectId,
        program: String,
    },
}

impl SimEvent {
    /// Stable name for the event_type column in event_log.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::TickStarted { .. }      => "tick_started",
            Self::TickCompleted { .. }    => "tick_completed",
            Self::RunInitialized { .. }   => "run_initialized",
            Self::ChecksumComputed { .. } => "checksum_computed",
            Self::CommandRejected { .. }  => "command_rejected",
            Self::HomeBuilt { .. }        => "home_built",
            Self::ActorSpawned { .. }     => "actor_spawned",
            Self::ActorDestroyed { .. }   => "actor_destroyed",
            Self::TerrainChanged { .. }   => "terrain_changed",
            Self::WareCreated { .. }      => "ware_created",
            Self::WareDelivered { .. }    => "ware_delivered",
            Self::WareHandedOver { .. }   => "ware_handed_over",
            Self::TaskFailed { .. }       => "task_failed",
            Self::ProgramAbandoned { .. } => "program_abandoned",
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:         Option<i64>,
    pub run_id:     RunId,
    pub tick:       SimTime,
    pub event_type: String,
    pub payload:    String, // JSON-serialized SimEvent
}
