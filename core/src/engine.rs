//! The simulation engine: one lockstep session.
//!
//! EXECUTION ORDER within a tick (fixed, never reordered):
//!   1. Advance the clock (only as far as the network has granted).
//!   2. Pop due commands one at a time in (due_time, sequence) order and
//!      dispatch them. Commands scheduled while dispatching that are due
//!      now run in this same tick.
//!   3. Every `checksum_interval` ticks, stream the state into the checksum.
//!   4. Persist the tick's events (and every `snapshot_interval` ticks a
//!      savegame) if a store is attached.
//!
//! RULES:
//!   - The engine owns every piece of session state. Two engines in one
//!     process share nothing.
//!   - All randomness flows through the session's single SimRng.
//!   - The store is output only; attaching one never changes a checksum.

use crate::{
    actor::Actor,
    building::Building,
    checksum::{Checksum, StreamingChecksum},
    clock::SimClock,
    cmdqueue::CommandQueue,
    command::{Command, CommandPayload, PlayerCommand},
    config::SimConfig,
    error::{SimError, SimResult},
    event::{EventLogEntry, SimEvent},
    interpreter,
    map::{Coords, Map},
    object::{Arena, ObjectId},
    region::Area,
    rng::SimRng,
    snapshot::{SaveGame, SAVEGAME_VERSION},
    store::SimStore,
    types::{PlayerNumber, RunId, Seed, SimTime},
    vision::Vision,
    world::World,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct SimEngine {
    pub run_id: RunId,
    pub clock:  SimClock,
    world:      World,
    actors:     Arena<Actor>,
    seed:       Seed,
    config:     SimConfig,
    checksum:   StreamingChecksum,
    checksums:  Vec<(SimTime, Checksum)>,
    store:      Option<SimStore>,
}

/// The state every peer must agree on, borrowed for hashing.
#[derive(Serialize)]
struct SyncState<'a> {
    time:      SimTime,
    rng:       &'a SimRng,
    map:       &'a Map,
    queue:     Vec<Command>,
    actors:    &'a Arena<Actor>,
    buildings: &'a Arena<Building>,
    visions:   &'a BTreeMap<PlayerNumber, Vision>,
}

impl SimEngine {
    pub fn new(run_id: RunId, seed: Seed, config: &SimConfig) -> SimResult<Self> {
        check_intervals(config)?;
        let map = config.map.build()?;
        let programs = Arc::new(config.program_library()?);
        Ok(Self {
            clock:     SimClock::new(run_id.clone()),
            world:     World::new(map, SimRng::new(seed), programs),
            actors:    Arena::new(),
            seed,
            config:    config.clone(),
            checksum:  StreamingChecksum::new(),
            checksums: Vec::new(),
            store:     None,
            run_id,
        })
    }

    /// Attach a migrated store. Every event, checksum and periodic
    /// savegame from now on is persisted to it.
    pub fn with_store(mut self, store: SimStore) -> SimResult<Self> {
        store.insert_run(&self.run_id, self.seed, env!("CARGO_PKG_VERSION"))?;
        self.store = Some(store);
        Ok(self)
    }

    // ── Network interface ──────────────────────────────────────

    /// Queue a player command. Every peer must enqueue the same commands
    /// in the same order. Returns the command's sequence number.
    pub fn enqueue(&mut self, due_time: SimTime, command: PlayerCommand) -> u64 {
        if due_time <= self.clock.current_tick {
            log::warn!(
                "tick={} command due at {due_time} arrived late, runs next tick",
                self.clock.current_tick
            );
        }
        self.world
            .queue
            .schedule(due_time, None, CommandPayload::Player(command))
    }

    /// Allow the simulation to run up to `tick`.
    pub fn grant(&mut self, tick: SimTime) {
        self.clock.grant(tick);
    }

    // ── Ticking ────────────────────────────────────────────────

    /// Advance one tick. This is the core simulation step.
    pub fn tick(&mut self) -> SimResult<Vec<SimEvent>> {
        if self.clock.paused {
            return Err(SimError::ClockPaused {
                tick: self.clock.current_tick,
            });
        }
        if !self.clock.can_advance() {
            return Err(SimError::TickMismatch {
                expected: self.clock.current_tick + 1,
                actual:   self.clock.granted_until,
            });
        }

        let now = self.clock.advance();
        self.world.time = now;
        self.world.emit(SimEvent::TickStarted { tick: now });

        while let Some(command) = self.world.queue.pop_next_due(now) {
            self.dispatch(command)?;
        }

        if now % self.config.checksum_interval == 0 {
            let digest = self.state_checksum()?;
            log::debug!("tick={now} checksum {digest}");
            self.checksums.push((now, digest));
            self.world.emit(SimEvent::ChecksumComputed { tick: now, digest });
            if let Some(store) = &self.store {
                store.record_checksum(&self.run_id, now, &digest)?;
            }
        }

        self.world.emit(SimEvent::TickCompleted { tick: now });
        let events = std::mem::take(&mut self.world.events);
        self.persist_events(now, &events)?;

        if self.store.is_some() && now % self.config.snapshot_interval == 0 {
            self.take_snapshot(now)?;
        }

        Ok(events)
    }

    /// Run n ticks in a loop. Used for testing and fast-forward; grants
    /// the time itself instead of waiting for the network.
    pub fn run_ticks(&mut self, n: u64) -> SimResult<()> {
        // Emit RunInitialized at tick 0 so seed differences are observable.
        if self.clock.current_tick == 0 {
            let init = SimEvent::RunInitialized {
                run_id: self.run_id.clone(),
                seed:   self.seed,
            };
            self.persist_events(0, &[init])?;
        }
        self.clock.grant(self.clock.current_tick + n);
        self.clock.resume();
        for _ in 0..n {
            self.tick()?;
        }
        self.clock.pause();
        Ok(())
    }

    fn dispatch(&mut self, command: Command) -> SimResult<()> {
        match command.payload {
            CommandPayload::Act { serial } => match command.target {
                Some(id) => self.run_act(id, serial),
                None => Ok(()),
            },
            CommandPayload::Player(player_command) => {
                self.apply_player_command(player_command);
                Ok(())
            }
        }
    }

    fn run_act(&mut self, id: ObjectId, serial: u32) -> SimResult<()> {
        match self.actors.get(id) {
            Some(actor) if actor.act_serial == serial => {}
            Some(_) => {
                log::trace!("tick={} dropping stale act {serial} of {id}", self.world.time);
                return Ok(());
            }
            None => {
                log::trace!("tick={} dropping act for vanished actor {id}", self.world.time);
                return Ok(());
            }
        }
        let Some(mut actor) = self.actors.checkout(id) else {
            return Ok(());
        };
        let result = interpreter::act(&mut actor, &mut self.world, &mut self.actors);
        self.actors.restore(id, actor);
        result
    }

    // ── Player commands ────────────────────────────────────────

    fn apply_player_command(&mut self, command: PlayerCommand) {
        let now = self.world.time;
        match command {
            PlayerCommand::BuildHome { player, at } => {
                if self.world.map.is_blocked(at) {
                    return self.reject(format!("cannot build at blocked cell {at:?}"));
                }
                if self.building_at(at).is_some() {
                    return self.reject(format!("cell {at:?} is already built on"));
                }
                let building = self
                    .world
                    .buildings
                    .insert_with(|id| Building::new(id, player, at));
                self.world
                    .see_area(player, Area::new(at, self.config.home_vision_radius));
                self.world.emit(SimEvent::HomeBuilt {
                    tick: now,
                    building,
                    player,
                    at,
                });
            }

            PlayerCommand::SpawnWorker { player, home, kind, program } => {
                let Some(home_id) = self.building_at(home).filter(|&id| {
                    self.world.buildings.get(id).is_some_and(|b| b.owner == player)
                }) else {
                    return self.reject(format!("player {player} has no home at {home:?}"));
                };
                if let Some(name) = program.as_deref().filter(|n| !self.world.programs.contains(n)) {
                    return self.reject(format!("unknown program {name}"));
                }
                let radius = self.config.worker_vision_radius;
                let id = self.actors.insert_with(|id| {
                    let mut actor = Actor::new(id, player, &kind, home);
                    actor.home = Some(home_id);
                    actor.vision_radius = radius;
                    actor.default_program = program;
                    actor
                });
                self.world.see_area(player, Area::new(home, radius));
                if let Some(actor) = self.actors.get_mut(id) {
                    interpreter::wake(actor, &mut self.world);
                }
                self.world.emit(SimEvent::ActorSpawned {
                    tick:   now,
                    actor:  id,
                    player,
                    kind,
                });
            }

            PlayerCommand::StartProgram { actor, program } => {
                if !self.world.programs.contains(&program) {
                    return self.reject(format!("unknown program {program}"));
                }
                let Some(target) = self.actors.get_mut(actor) else {
                    return self.reject(format!("no actor {actor}"));
                };
                target.reset_tasks();
                target.pending_program = Some(program);
                interpreter::wake(target, &mut self.world);
            }

            PlayerCommand::DestroyActor { actor } => {
                if !self.destroy_actor(actor) {
                    self.reject(format!("no actor {actor}"));
                }
            }

            PlayerCommand::ReleaseWorker { player, kind } => {
                let chosen = self
                    .actors
                    .iter()
                    .filter(|(_, a)| a.owner == player && a.kind == kind)
                    .map(|(id, _)| id)
                    .min();
                match chosen {
                    Some(id) => {
                        self.destroy_actor(id);
                    }
                    None => self.reject(format!("player {player} has no {kind} to release")),
                }
            }

            PlayerCommand::SetBlocked { at, blocked } => {
                self.world.map.set_blocked(at, blocked);
                self.world.emit(SimEvent::TerrainChanged {
                    tick: now,
                    at,
                    blocked,
                });
            }
        }
    }

    fn destroy_actor(&mut self, id: ObjectId) -> bool {
        let Some(actor) = self.actors.remove(id) else {
            return false;
        };
        let cancelled = self.world.queue.cancel_target(id);
        log::debug!(
            "tick={} destroyed {id}, cancelled {cancelled} pending acts",
            self.world.time
        );
        self.world
            .unsee_area(actor.owner, Area::new(actor.position, actor.vision_radius));
        self.world.emit(SimEvent::ActorDestroyed {
            tick:  self.world.time,
            actor: id,
        });
        true
    }

    fn building_at(&self, at: Coords) -> Option<ObjectId> {
        self.world
            .buildings
            .iter()
            .find(|(_, b)| b.position == at)
            .map(|(id, _)| id)
    }

    fn reject(&mut self, reason: String) {
        log::warn!("tick={} rejected command: {reason}", self.world.time);
        self.world.emit(SimEvent::CommandRejected {
            tick: self.world.time,
            reason,
        });
    }

    // ── Checksums ──────────────────────────────────────────────

    /// Digest of the complete synchronized state at the current tick.
    pub fn state_checksum(&mut self) -> SimResult<Checksum> {
        let state = SyncState {
            time:      self.world.time,
            rng:       &self.world.rng,
            map:       &self.world.map,
            queue:     self.world.queue.pending(),
            actors:    &self.actors,
            buildings: &self.world.buildings,
            visions:   &self.world.visions,
        };
        self.checksum.reset();
        serde_cbor::to_writer(&mut self.checksum, &state)?;
        Ok(self.checksum.finish())
    }

    /// Every periodic checksum so far, oldest first.
    pub fn checksums(&self) -> &[(SimTime, Checksum)] {
        &self.checksums
    }

    pub fn latest_checksum(&self) -> Option<(SimTime, Checksum)> {
        self.checksums.last().copied()
    }

    // ── Savegames ──────────────────────────────────────────────

    pub fn save(&self) -> SimResult<Vec<u8>> {
        let savegame = SaveGame {
            version:   SAVEGAME_VERSION,
            run_id:    self.run_id.clone(),
            seed:      self.seed,
            tick:      self.clock.current_tick,
            rng:       self.world.rng.save_state(),
            map:       self.world.map.clone(),
            queue:     self.world.queue.save_state(),
            actors:    self.actors.clone(),
            buildings: self.world.buildings.clone(),
            visions:   self.world.visions.clone(),
            checksums: self.checksums.clone(),
        };
        savegame.encode()
    }

    /// Rebuild a session from a savegame. `config` must be the one the
    /// session was started with; its map is replaced by the saved one.
    pub fn load(bytes: &[u8], config: &SimConfig) -> SimResult<Self> {
        check_intervals(config)?;
        let savegame = SaveGame::decode(bytes)?;
        let programs = config.program_library()?;
        savegame.validate(&programs)?;

        let mut rng = SimRng::new(savegame.seed);
        rng.load_state(savegame.rng)?;

        let mut world = World::new(savegame.map, rng, Arc::new(programs));
        world.time = savegame.tick;
        world.queue = CommandQueue::restore(savegame.queue);
        world.buildings = savegame.buildings;
        world.visions = savegame.visions;

        let mut clock = SimClock::new(savegame.run_id.clone());
        clock.current_tick = savegame.tick;
        clock.granted_until = savegame.tick;

        log::debug!(
            "loaded savegame of run {} at tick {}",
            savegame.run_id,
            savegame.tick
        );
        Ok(Self {
            run_id: savegame.run_id,
            clock,
            world,
            actors: savegame.actors,
            seed: savegame.seed,
            config: config.clone(),
            checksum: StreamingChecksum::new(),
            checksums: savegame.checksums,
            store: None,
        })
    }

    /// Resume a persisted run from its latest savegame at or before `tick`.
    /// Whatever the store recorded for the run after that savegame is
    /// dropped, since the resumed engine records those ticks again.
    pub fn resume_from_store(
        store: SimStore,
        run_id: &str,
        tick: SimTime,
        config: &SimConfig,
    ) -> SimResult<Option<Self>> {
        let Some((saved_at, bytes)) = store.latest_snapshot_before(run_id, tick)? else {
            return Ok(None);
        };
        log::debug!("resuming run {run_id} from tick {saved_at}");
        let engine = Self::load(&bytes, config)?;
        store.truncate_run_after(run_id, saved_at)?;
        Ok(Some(engine.with_store(store)?))
    }

    fn take_snapshot(&self, tick: SimTime) -> SimResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let bytes = self.save()?;
        store.save_snapshot(&self.run_id, tick, &bytes)?;
        log::debug!("Snapshot saved at tick {tick} ({} bytes)", bytes.len());
        Ok(())
    }

    fn persist_events(&self, tick: SimTime, events: &[SimEvent]) -> SimResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        for event in events {
            let entry = EventLogEntry {
                id:         None,
                run_id:     self.run_id.clone(),
                tick,
                event_type: event.type_name().to_string(),
                payload:    serde_json::to_string(event)?,
            };
            store.append_event(&entry)?;
        }
        Ok(())
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn time(&self) -> SimTime {
        self.world.time
    }

    pub fn seed(&self) -> Seed {
        self.seed
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn map(&self) -> &Map {
        &self.world.map
    }

    pub fn actors(&self) -> &Arena<Actor> {
        &self.actors
    }

    pub fn actor(&self, id: ObjectId) -> Option<&Actor> {
        self.actors.get(id)
    }

    pub fn buildings(&self) -> &Arena<Building> {
        &self.world.buildings
    }

    pub fn vision(&self, player: PlayerNumber) -> Option<&Vision> {
        self.world.vision(player)
    }

    pub fn store(&self) -> Option<&SimStore> {
        self.store.as_ref()
    }

    /// Vision counters rebuilt from scratch: every home and every actor
    /// seeing its full area. Matches the incrementally maintained vision
    /// whenever the simulation is consistent.
    pub fn recompute_vision(&self) -> BTreeMap<PlayerNumber, Vision> {
        let map = &self.world.map;
        let mut visions: BTreeMap<PlayerNumber, Vision> = BTreeMap::new();
        let homes = self
            .world
            .buildings
            .iter()
            .map(|(_, b)| (b.owner, Area::new(b.position, self.config.home_vision_radius)));
        let workers = self
            .actors
            .iter()
            .map(|(_, a)| (a.owner, Area::new(a.position, a.vision_radius)));
        for (player, area) in homes.chain(workers) {
            visions
                .entry(player)
                .or_insert_with(|| Vision::new(map.cell_count()))
                .see_area(map, area);
        }
        visions
    }
}

fn check_intervals(config: &SimConfig) -> SimResult<()> {
    if config.checksum_interval == 0 || config.snapshot_interval == 0 {
        return Err(anyhow::anyhow!("checksum and snapshot intervals must be positive").into());
    }
    Ok(())
}
