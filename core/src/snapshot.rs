//! Savegame serialization: the full simulation state to and from CBOR.
//!
//! A savegame is written to an attached store every `snapshot_interval`
//! ticks and on demand. It captures everything needed to resume the
//! session at that tick on any peer without replaying from tick 0.
//!
//! RULES:
//!   - The version field is decoded and checked before anything else.
//!   - A savegame is validated completely before any of it is used.
//!     Malformed state is rejected at load, never discovered mid-tick.

use crate::{
    actor::{Actor, TaskKind},
    building::Building,
    checksum::Checksum,
    cmdqueue::QueueState,
    error::{SimError, SimResult},
    map::Map,
    object::Arena,
    program::ProgramLibrary,
    types::{PlayerNumber, RunId, Seed, SimTime},
    vision::Vision,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bumped whenever the layout below changes.
pub const SAVEGAME_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveGame {
    pub version:   u16,
    pub run_id:    RunId,
    pub seed:      Seed,
    pub tick:      SimTime,
    pub rng:       [u32; 2],
    pub map:       Map,
    pub queue:     QueueState,
    pub actors:    Arena<Actor>,
    pub buildings: Arena<Building>,
    pub visions:   BTreeMap<PlayerNumber, Vision>,
    pub checksums: Vec<(SimTime, Checksum)>,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u16,
}

impl SaveGame {
    pub fn encode(&self) -> SimResult<Vec<u8>> {
        Ok(serde_cbor::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> SimResult<Self> {
        let probe: VersionProbe = serde_cbor::from_slice(bytes)?;
        if probe.version != SAVEGAME_VERSION {
            return Err(SimError::UnsupportedVersion {
                found:    probe.version,
                expected: SAVEGAME_VERSION,
            });
        }
        Ok(serde_cbor::from_slice(bytes)?)
    }

    /// Check every invariant the running simulation relies on.
    pub fn validate(&self, programs: &ProgramLibrary) -> SimResult<()> {
        if self.rng == [0, 0] {
            return Err(malformed("rng state is all zero"));
        }
        self.map.validate()?;
        self.actors
            .validate()
            .map_err(|reason| malformed(format!("actor arena: {reason}")))?;
        self.buildings
            .validate()
            .map_err(|reason| malformed(format!("building arena: {reason}")))?;
        if self.actors.has_checked_out() || self.buildings.has_checked_out() {
            return Err(malformed("object saved in the middle of its act"));
        }

        for (id, actor) in self.actors.iter() {
            if actor.id != id {
                return Err(malformed(format!("actor {} stored under {id}", actor.id)));
            }
            if actor.stack.first().map(|frame| frame.task) != Some(TaskKind::Idle) {
                return Err(malformed(format!("actor {id} has no idle task at the bottom")));
            }
            if actor.stack[1..].iter().any(|frame| frame.task == TaskKind::Idle) {
                return Err(malformed(format!("actor {id} has a nested idle task")));
            }
            for name in [&actor.default_program, &actor.pending_program].into_iter().flatten() {
                if !programs.contains(name) {
                    return Err(malformed(format!("actor {id} refers to unknown program {name}")));
                }
            }
            for frame in &actor.stack {
                if frame.task != TaskKind::Program {
                    continue;
                }
                let name = frame.program.as_deref().unwrap_or_default();
                let Some(program) = programs.get(name) else {
                    return Err(malformed(format!("actor {id} runs unknown program '{name}'")));
                };
                if frame.pc > program.len() {
                    return Err(malformed(format!(
                        "actor {id} is at step {} of {name}, which has {}",
                        frame.pc,
                        program.len()
                    )));
                }
            }
        }

        for (id, building) in self.buildings.iter() {
            if building.id != id {
                return Err(malformed(format!("building {} stored under {id}", building.id)));
            }
        }

        let cells = self.map.cell_count();
        if let Some((player, _)) = self.visions.iter().find(|(_, v)| v.cell_count() != cells) {
            return Err(malformed(format!("vision of player {player} does not match the map")));
        }

        if let Some(command) = self.queue.pending.iter().find(|c| c.sequence >= self.queue.next_sequence) {
            return Err(malformed(format!(
                "queued command {} is not below the next sequence {}",
                command.sequence, self.queue.next_sequence
            )));
        }
        Ok(())
    }
}

fn malformed(reason: impl Into<String>) -> SimError {
    SimError::MalformedState(reason.into())
}
