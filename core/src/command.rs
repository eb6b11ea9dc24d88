use crate::{
    map::Coords,
    object::ObjectId,
    types::{PlayerNumber, SimTime},
};
use serde::{Deserialize, Serialize};

/// Commands delivered by the network layer, identically and in the same
/// order on every peer. Variants are only ever appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum PlayerCommand {
    BuildHome {
        player: PlayerNumber,
        at:     Coords,
    },
    /// Spawn a worker at the player's home standing on `home`.
    SpawnWorker {
        player:  PlayerNumber,
        home:    Coords,
        kind:    String,
        /// Repeated by the worker's idle task.
        program: Option<String>,
    },
    /// Run a program once, interrupting whatever the actor was doing.
    StartProgram {
        actor:   ObjectId,
        program: String,
    },
    DestroyActor {
        actor: ObjectId,
    },
    /// Destroy the player's worker of `kind` with the lowest id.
    ReleaseWorker {
        player: PlayerNumber,
        kind:   String,
    },
    SetBlocked {
        at:      Coords,
        blocked: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandPayload {
    /// Wake the target actor. Stale serials are ignored.
    Act { serial: u32 },
    Player(PlayerCommand),
}

/// A scheduled command. Ordered by `(due_time, sequence)`; the sequence
/// is the queue's insertion counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub due_time: SimTime,
    pub sequence: u64,
    pub target:   Option<ObjectId>,
    pub payload:  CommandPayload,
}

impl Command {
    pub fn key(&self) -> (SimTime, u64) {
        (self.due_time, self.sequence)
    }
}
